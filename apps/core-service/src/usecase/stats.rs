//! # 配信統計の読み取り
//!
//! UI のポーリングが参照する読み取り専用パス。
//!
//! ## 設計方針
//!
//! - **タスク状況は純粋導出**: `status` と `sent_at` と現在時刻だけから計算し、
//!   読み取りが書き込みを引き起こすことはない
//! - **集計は読み取り時に SQL で導出**: カウンターの事前集計テーブルを持たない

use std::sync::Arc;

use mailflow_domain::{
    clock::Clock,
    engagement::{TimelineEntry, build_timeline},
    newsletter::{AnalyticsPhase, Newsletter, NewsletterId, NewsletterStatus},
    recipient_send::RecipientSendId,
    tenant::TenantId,
};
use mailflow_infra::repository::{
    AggregateStats,
    EngagementEventRepository,
    NewsletterRepository,
    RecipientSendPage,
    RecipientSendRepository,
};
use serde::Serialize;

use super::helpers::FindResultExt;
use crate::error::CoreError;

/// タスクの進行フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskPhase {
    /// 未着手
    Pending,
    /// 進行中
    Running,
    /// 完了
    Completed,
}

/// ニュースレターの三段階タスク状況
///
/// `validation`（レビュー）→ `delivery`（送信）→ `analytics`（集計ウィンドウ）。
/// 永続化されず、問い合わせのたびに導出される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub validation: TaskPhase,
    pub delivery:   TaskPhase,
    pub analytics:  TaskPhase,
}

impl TaskStatus {
    /// ニュースレターの状態からタスク状況を導出する
    fn derive(newsletter: &Newsletter, now: chrono::DateTime<chrono::Utc>) -> Self {
        let status = newsletter.status();

        let validation = match status {
            NewsletterStatus::Draft => TaskPhase::Pending,
            NewsletterStatus::PendingReview => TaskPhase::Running,
            _ => TaskPhase::Completed,
        };

        let delivery = match status {
            NewsletterStatus::Sending => TaskPhase::Running,
            NewsletterStatus::Sent => TaskPhase::Completed,
            _ => TaskPhase::Pending,
        };

        let analytics = match newsletter.analytics_phase(now) {
            None => TaskPhase::Pending,
            Some(AnalyticsPhase::Running) => TaskPhase::Running,
            Some(AnalyticsPhase::Completed) => TaskPhase::Completed,
        };

        Self {
            validation,
            delivery,
            analytics,
        }
    }
}

/// 配信統計ユースケース
pub struct StatsUseCaseImpl {
    newsletter_repo: Arc<dyn NewsletterRepository>,
    recipient_send_repo: Arc<dyn RecipientSendRepository>,
    event_repo: Arc<dyn EngagementEventRepository>,
    clock: Arc<dyn Clock>,
}

impl StatsUseCaseImpl {
    pub fn new(
        newsletter_repo: Arc<dyn NewsletterRepository>,
        recipient_send_repo: Arc<dyn RecipientSendRepository>,
        event_repo: Arc<dyn EngagementEventRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            newsletter_repo,
            recipient_send_repo,
            event_repo,
            clock,
        }
    }

    /// 三段階タスク状況を取得する
    pub async fn get_task_status(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
    ) -> Result<TaskStatus, CoreError> {
        let newsletter = self
            .newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        Ok(TaskStatus::derive(&newsletter, self.clock.now()))
    }

    /// ニュースレター全体の集約統計を取得する
    pub async fn get_aggregate_stats(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
    ) -> Result<AggregateStats, CoreError> {
        // テナント越しの覗き見を防ぐため所有確認を先に行う
        self.newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        Ok(self.recipient_send_repo.aggregate_stats(id).await?)
    }

    /// 受信者ごとの配信記録をカーソルページングで取得する
    pub async fn get_detailed_stats(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<RecipientSendPage, CoreError> {
        self.newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        Ok(self
            .recipient_send_repo
            .list_by_newsletter(id, cursor, limit)
            .await?)
    }

    /// 受信者のイベントタイムラインを取得する
    ///
    /// 昇順のイベントログの先頭に、ニュースレターの `sent_at` から導出した
    /// 合成 `sent` エントリを置く。
    pub async fn get_recipient_timeline(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
        recipient_send_id: &RecipientSendId,
    ) -> Result<Vec<TimelineEntry>, CoreError> {
        let newsletter = self
            .newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        let send = self
            .recipient_send_repo
            .find_by_id(recipient_send_id)
            .await
            .or_not_found("配信記録")?;
        if send.newsletter_id() != id {
            return Err(CoreError::NotFound("配信記録が見つかりません".to_string()));
        }

        let events = self
            .event_repo
            .list_by_recipient_send(recipient_send_id)
            .await?;

        Ok(build_timeline(newsletter.sent_at(), events))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use mailflow_domain::{
        clock::FixedClock,
        engagement::{EngagementEvent, EngagementEventId, EngagementEventType, TimelineEventType},
        newsletter::{NewNewsletter, Targeting},
        recipient_send::RecipientSend,
        user::UserId,
        value_objects::{EmailAddress, NewsletterTitle, Subject},
    };
    use mailflow_infra::mock::{
        MockEngagementEventRepository,
        MockNewsletterRepository,
        MockRecipientSendRepository,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    struct Fixture {
        newsletter_repo: MockNewsletterRepository,
        recipient_send_repo: MockRecipientSendRepository,
        event_repo: MockEngagementEventRepository,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                newsletter_repo: MockNewsletterRepository::new(),
                recipient_send_repo: MockRecipientSendRepository::new(),
                event_repo: MockEngagementEventRepository::new(),
                tenant_id: TenantId::new(),
                now: Utc::now(),
            }
        }

        fn usecase_at(&self, now: DateTime<Utc>) -> StatsUseCaseImpl {
            StatsUseCaseImpl::new(
                Arc::new(self.newsletter_repo.clone()),
                Arc::new(self.recipient_send_repo.clone()),
                Arc::new(self.event_repo.clone()),
                Arc::new(FixedClock::new(now)),
            )
        }

        fn draft(&self) -> Newsletter {
            let newsletter = Newsletter::new(NewNewsletter {
                id:         NewsletterId::new(),
                tenant_id:  self.tenant_id.clone(),
                title:      NewsletterTitle::new("8月号").unwrap(),
                subject:    Subject::new("今月のお知らせ").unwrap(),
                content:    "<p>本文</p>".to_string(),
                targeting:  Targeting::All,
                created_by: UserId::new(),
                now:        self.now,
            });
            self.newsletter_repo.add(newsletter.clone());
            newsletter
        }

        fn sent(&self, sent_at: DateTime<Utc>) -> Newsletter {
            let newsletter = self
                .draft()
                .marked_ready(self.now)
                .unwrap()
                .sending_started(self.now)
                .unwrap()
                .completed(sent_at)
                .unwrap();
            self.newsletter_repo.add(newsletter.clone());
            newsletter
        }
    }

    #[tokio::test]
    async fn test_下書きのタスク状況はすべてpending() {
        let fixture = Fixture::new();
        let draft = fixture.draft();
        let sut = fixture.usecase_at(fixture.now);

        let status = sut
            .get_task_status(draft.id(), &fixture.tenant_id)
            .await
            .unwrap();

        assert_eq!(
            status,
            TaskStatus {
                validation: TaskPhase::Pending,
                delivery:   TaskPhase::Pending,
                analytics:  TaskPhase::Pending,
            }
        );
    }

    #[tokio::test]
    async fn test_送信完了から24時間以内はanalyticsがrunning() {
        let fixture = Fixture::new();
        let sent = fixture.sent(fixture.now);
        let sut = fixture.usecase_at(fixture.now + Duration::hours(23) + Duration::minutes(59));

        let status = sut
            .get_task_status(sent.id(), &fixture.tenant_id)
            .await
            .unwrap();

        assert_eq!(status.validation, TaskPhase::Completed);
        assert_eq!(status.delivery, TaskPhase::Completed);
        assert_eq!(status.analytics, TaskPhase::Running);
    }

    #[tokio::test]
    async fn test_24時間経過後は追加の書き込みなしでanalyticsがcompletedになる() {
        let fixture = Fixture::new();
        let sent = fixture.sent(fixture.now);

        // 同じ保存状態に対して時刻だけを進めて問い合わせる
        let before = fixture
            .usecase_at(fixture.now + Duration::hours(23))
            .get_task_status(sent.id(), &fixture.tenant_id)
            .await
            .unwrap();
        let after = fixture
            .usecase_at(fixture.now + Duration::hours(25))
            .get_task_status(sent.id(), &fixture.tenant_id)
            .await
            .unwrap();

        assert_eq!(before.analytics, TaskPhase::Running);
        assert_eq!(after.analytics, TaskPhase::Completed);
    }

    #[tokio::test]
    async fn test_集約統計がカウンターを反映する() {
        let fixture = Fixture::new();
        let sent = fixture.sent(fixture.now);

        let opened = RecipientSend::queued(
            RecipientSendId::new(),
            sent.id().clone(),
            EmailAddress::new("a@example.com").unwrap(),
            fixture.now,
        )
        .marked_sent(Some("m-1".to_string()), fixture.now)
        .unwrap()
        .opened(fixture.now)
        .0
        .opened(fixture.now)
        .0;
        let plain = RecipientSend::queued(
            RecipientSendId::new(),
            sent.id().clone(),
            EmailAddress::new("b@example.com").unwrap(),
            fixture.now,
        )
        .marked_sent(Some("m-2".to_string()), fixture.now)
        .unwrap();
        fixture.recipient_send_repo.add(opened);
        fixture.recipient_send_repo.add(plain);

        let stats = fixture
            .usecase_at(fixture.now)
            .get_aggregate_stats(sent.id(), &fixture.tenant_id)
            .await
            .unwrap();

        assert_eq!(stats.recipient_count, 2);
        assert_eq!(stats.unique_opens, 1);
        assert_eq!(stats.total_opens, 2);
    }

    #[tokio::test]
    async fn test_タイムラインは合成sentエントリから始まる() {
        let fixture = Fixture::new();
        let sent_at = fixture.now;
        let sent = fixture.sent(sent_at);

        let send = RecipientSend::queued(
            RecipientSendId::new(),
            sent.id().clone(),
            EmailAddress::new("a@example.com").unwrap(),
            fixture.now,
        )
        .marked_sent(Some("m-1".to_string()), fixture.now)
        .unwrap();
        let send_id = send.id().clone();
        fixture.recipient_send_repo.add(send);
        fixture.event_repo.add(EngagementEvent::new(
            EngagementEventId::new(),
            send_id.clone(),
            EngagementEventType::Opened,
            sent_at + Duration::minutes(10),
            json!({}),
        ));

        let timeline = fixture
            .usecase_at(fixture.now)
            .get_recipient_timeline(sent.id(), &fixture.tenant_id, &send_id)
            .await
            .unwrap();

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].event_type, TimelineEventType::Sent);
        assert_eq!(timeline[0].occurred_at, sent_at);
        assert_eq!(timeline[1].event_type, TimelineEventType::Opened);
    }

    #[tokio::test]
    async fn test_別のニュースレターの配信記録はnot_found() {
        let fixture = Fixture::new();
        let sent = fixture.sent(fixture.now);
        let other = fixture.sent(fixture.now);

        let stray = RecipientSend::queued(
            RecipientSendId::new(),
            other.id().clone(),
            EmailAddress::new("a@example.com").unwrap(),
            fixture.now,
        );
        let stray_id = stray.id().clone();
        fixture.recipient_send_repo.add(stray);

        let result = fixture
            .usecase_at(fixture.now)
            .get_recipient_timeline(sent.id(), &fixture.tenant_id, &stray_id)
            .await;

        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}

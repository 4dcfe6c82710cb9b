//! # 送信オーケストレーション
//!
//! 送信開始の二重実行防止と、ファンアウト結果に基づく終端遷移。
//!
//! ## 設計方針
//!
//! - **ステータス CAS が唯一のトランザクション境界**: `ready_to_send | scheduled → sending`
//!   の遷移をリポジトリの CAS で行い、並行呼び出しの勝者を一人に絞る
//! - **CAS 外れは冪等な no-op**: 送信中・送信済みに対する再送信要求は
//!   現在の状態をそのまま返す
//! - **全滅はロールバック**: 1 通も送れなかった場合は `ready_to_send` に戻す

use mailflow_domain::{
    DomainError,
    newsletter::{Newsletter, NewsletterId, NewsletterStatus},
    tenant::TenantId,
};
use mailflow_shared::{event_log::event, log_business_event};

use super::NewsletterUseCaseImpl;
use crate::{error::CoreError, usecase::helpers::FindResultExt};

/// 送信操作の結果
///
/// `failed` は部分失敗の件数で、HTTP エラーにはならずレスポンス本文で返る。
/// 冪等な no-op の場合は全カウントが 0 で、`newsletter` が現在の状態を示す。
#[derive(Debug, Clone)]
pub struct SendReport {
    pub newsletter: Newsletter,
    pub successful: usize,
    pub failed:     usize,
    pub candidates: usize,
}

impl NewsletterUseCaseImpl {
    /// ニュースレターを送信する
    ///
    /// `ready_to_send` または `scheduled` からのみ開始できる。送信中・送信済みへの
    /// 再実行は現在の状態を返す no-op。1 通も送れなかった場合は
    /// `ready_to_send` に巻き戻して `TotalSendFailure` を返す。
    pub async fn send(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
    ) -> Result<SendReport, CoreError> {
        let newsletter = self
            .newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        let now = self.clock.now();
        let current_status = newsletter.status();
        let sending = match newsletter.sending_started(now) {
            Ok(sending) => sending,
            Err(DomainError::InvalidTransition { .. })
                if matches!(
                    current_status,
                    NewsletterStatus::Sending | NewsletterStatus::Sent
                ) =>
            {
                return self.noop_report(id, tenant_id).await;
            }
            Err(e) => return Err(e.into()),
        };

        // 並行する send 呼び出しの勝者をここで一人に絞る
        let won = self
            .newsletter_repo
            .transition_status(
                &sending,
                &[NewsletterStatus::ReadyToSend, NewsletterStatus::Scheduled],
            )
            .await?;
        if !won {
            return self.noop_report(id, tenant_id).await;
        }

        log_business_event!(
            event.category = event::category::DELIVERY,
            event.action = event::action::SEND_STARTED,
            event.tenant_id = %tenant_id,
            event.entity_id = %sending.id(),
            event.entity_type = event::entity_type::NEWSLETTER,
            event.result = event::result::SUCCESS,
            "送信を開始しました"
        );

        let report = self.fanout.run(&sending).await?;

        if report.successful == 0 {
            let aborted = sending.sending_aborted(now)?;
            self.newsletter_repo
                .transition_status(&aborted, &[NewsletterStatus::Sending])
                .await?;

            log_business_event!(
                event.category = event::category::DELIVERY,
                event.action = event::action::SEND_FAILED,
                event.tenant_id = %tenant_id,
                event.entity_id = %aborted.id(),
                event.entity_type = event::entity_type::NEWSLETTER,
                event.result = event::result::FAILURE,
                candidates = report.candidates,
                "1 通も送信できなかったため ready_to_send に戻しました"
            );

            return Err(CoreError::TotalSendFailure(if report.candidates == 0 {
                "配信対象が 0 件です".to_string()
            } else {
                format!("{} 件すべての送信に失敗しました", report.candidates)
            }));
        }

        let sent = sending.completed(now)?;
        self.newsletter_repo
            .transition_status(&sent, &[NewsletterStatus::Sending])
            .await?;

        log_business_event!(
            event.category = event::category::DELIVERY,
            event.action = event::action::SEND_COMPLETED,
            event.tenant_id = %tenant_id,
            event.entity_id = %sent.id(),
            event.entity_type = event::entity_type::NEWSLETTER,
            event.result = event::result::SUCCESS,
            successful = report.successful,
            failed = report.failed,
            candidates = report.candidates,
            "送信が完了しました"
        );

        Ok(SendReport {
            newsletter: sent,
            successful: report.successful,
            failed:     report.failed,
            candidates: report.candidates,
        })
    }

    /// 予約時刻を過ぎたニュースレターをすべて送信する
    ///
    /// スケジューラの tokio インターバルタスクから呼ばれる。
    /// 個々の失敗はログに残して続行し、送信を試みた件数を返す。
    pub async fn dispatch_due_schedules(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<usize, CoreError> {
        let due = self.newsletter_repo.list_due_scheduled(now).await?;
        let count = due.len();

        for newsletter in due {
            let id = newsletter.id().clone();
            let tenant_id = newsletter.tenant_id().clone();
            if let Err(e) = self.send(&id, &tenant_id).await {
                tracing::error!(
                    error = %e,
                    newsletter_id = %id,
                    "予約送信に失敗"
                );
            }
        }

        Ok(count)
    }

    /// 送信中・送信済みに対する再送信要求への冪等な応答
    async fn noop_report(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
    ) -> Result<SendReport, CoreError> {
        let current = self
            .newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        Ok(SendReport {
            newsletter: current,
            successful: 0,
            failed:     0,
            candidates: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use mailflow_domain::{
        newsletter::Targeting,
        recipient_send::RecipientSendStatus,
        user::UserId,
        value_objects::EmailAddress,
    };
    use pretty_assertions::assert_eq;

    use super::{super::test_support::Fixture, *};
    use crate::usecase::CreateNewsletterInput;

    async fn create_ready(fixture: &Fixture, tenant_id: &TenantId) -> Newsletter {
        let sut = fixture.usecase();
        let draft = sut
            .create_newsletter(CreateNewsletterInput {
                tenant_id:  tenant_id.clone(),
                created_by: UserId::new(),
                title:      "8月号".to_string(),
                subject:    "今月のお知らせ".to_string(),
                content:    "<p>本文</p>".to_string(),
                targeting:  Targeting::All,
            })
            .await
            .unwrap();

        // レビュー無効テナントの直接送信可能化はドメイン遷移で行う
        let ready = fixture
            .newsletter_repo
            .get(draft.id())
            .unwrap()
            .marked_ready(fixture.now)
            .unwrap();
        fixture.newsletter_repo.add(ready.clone());
        ready
    }

    fn audience(fixture: &Fixture, addresses: &[&str]) {
        for raw in addresses {
            fixture.audience.add(EmailAddress::new(*raw).unwrap());
        }
    }

    #[tokio::test]
    async fn test_送信成功でsentになりsent_atが記録される() {
        let fixture = Fixture::new();
        let tenant_id = TenantId::new();
        let ready = create_ready(&fixture, &tenant_id).await;
        audience(&fixture, &["a@example.com", "b@example.com"]);
        let sut = fixture.usecase();

        let report = sut.send(ready.id(), &tenant_id).await.unwrap();

        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.newsletter.status(), NewsletterStatus::Sent);
        assert_eq!(report.newsletter.sent_at(), Some(fixture.now));

        let stored = fixture.newsletter_repo.get(ready.id()).unwrap();
        assert_eq!(stored.status(), NewsletterStatus::Sent);
    }

    #[tokio::test]
    async fn test_部分失敗でも送信は完了する() {
        let fixture = Fixture::new();
        let tenant_id = TenantId::new();
        let ready = create_ready(&fixture, &tenant_id).await;
        audience(&fixture, &["a@example.com", "b@example.com"]);
        fixture
            .gateway
            .fail_for(EmailAddress::new("b@example.com").unwrap());
        let sut = fixture.usecase();

        let report = sut.send(ready.id(), &tenant_id).await.unwrap();

        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.newsletter.status(), NewsletterStatus::Sent);
    }

    #[tokio::test]
    async fn test_全滅時はready_to_sendに巻き戻される() {
        let fixture = Fixture::new();
        let tenant_id = TenantId::new();
        let ready = create_ready(&fixture, &tenant_id).await;
        audience(&fixture, &["a@example.com", "b@example.com"]);
        fixture.gateway.fail_all();
        let sut = fixture.usecase();

        let result = sut.send(ready.id(), &tenant_id).await;

        assert!(matches!(result, Err(CoreError::TotalSendFailure(_))));
        let stored = fixture.newsletter_repo.get(ready.id()).unwrap();
        assert_eq!(stored.status(), NewsletterStatus::ReadyToSend);
        assert!(
            fixture
                .recipient_send_repo
                .all()
                .iter()
                .all(|s| s.status() == RecipientSendStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_配信対象が空の場合もtotal_send_failure() {
        let fixture = Fixture::new();
        let tenant_id = TenantId::new();
        let ready = create_ready(&fixture, &tenant_id).await;
        let sut = fixture.usecase();

        let result = sut.send(ready.id(), &tenant_id).await;

        assert!(matches!(result, Err(CoreError::TotalSendFailure(_))));
        assert_eq!(
            fixture.newsletter_repo.get(ready.id()).unwrap().status(),
            NewsletterStatus::ReadyToSend
        );
    }

    #[tokio::test]
    async fn test_並行する送信要求でも二重送信されない() {
        let fixture = Fixture::new();
        let tenant_id = TenantId::new();
        let ready = create_ready(&fixture, &tenant_id).await;
        audience(&fixture, &["a@example.com", "b@example.com"]);
        let sut = fixture.usecase();

        let (first, second) = tokio::join!(
            sut.send(ready.id(), &tenant_id),
            sut.send(ready.id(), &tenant_id),
        );

        let first = first.unwrap();
        let second = second.unwrap();
        // 勝者は一人だけで、もう一方は no-op
        assert_eq!(first.successful + second.successful, 2);
        assert!(first.candidates == 0 || second.candidates == 0);
        // 各受信者への送信はちょうど 1 回
        assert_eq!(fixture.gateway.transmitted().len(), 2);
    }

    #[tokio::test]
    async fn test_送信済みへの再送信は冪等なno_op() {
        let fixture = Fixture::new();
        let tenant_id = TenantId::new();
        let ready = create_ready(&fixture, &tenant_id).await;
        audience(&fixture, &["a@example.com"]);
        let sut = fixture.usecase();

        sut.send(ready.id(), &tenant_id).await.unwrap();
        let second = sut.send(ready.id(), &tenant_id).await.unwrap();

        assert_eq!(second.candidates, 0);
        assert_eq!(second.newsletter.status(), NewsletterStatus::Sent);
        assert_eq!(fixture.gateway.transmitted().len(), 1);
    }

    #[tokio::test]
    async fn test_下書きからの送信は不正遷移() {
        let fixture = Fixture::new();
        let tenant_id = TenantId::new();
        let sut = fixture.usecase();
        let draft = sut
            .create_newsletter(CreateNewsletterInput {
                tenant_id:  tenant_id.clone(),
                created_by: UserId::new(),
                title:      "8月号".to_string(),
                subject:    "件名".to_string(),
                content:    "x".to_string(),
                targeting:  Targeting::All,
            })
            .await
            .unwrap();

        let result = sut.send(draft.id(), &tenant_id).await;

        assert!(matches!(
            result,
            Err(CoreError::Domain(DomainError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_予約時刻を過ぎたニュースレターが送信される() {
        let fixture = Fixture::new();
        let tenant_id = TenantId::new();
        let ready = create_ready(&fixture, &tenant_id).await;
        audience(&fixture, &["a@example.com"]);
        let sut = fixture.usecase();

        let scheduled_at = fixture.now + chrono::Duration::minutes(5);
        sut.schedule_newsletter(ready.id(), &tenant_id, scheduled_at)
            .await
            .unwrap();

        let dispatched = sut
            .dispatch_due_schedules(scheduled_at + chrono::Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(dispatched, 1);
        assert_eq!(
            fixture.newsletter_repo.get(ready.id()).unwrap().status(),
            NewsletterStatus::Sent
        );
    }

    #[tokio::test]
    async fn test_予約時刻前のニュースレターは送信されない() {
        let fixture = Fixture::new();
        let tenant_id = TenantId::new();
        let ready = create_ready(&fixture, &tenant_id).await;
        let sut = fixture.usecase();

        let scheduled_at = fixture.now + chrono::Duration::hours(1);
        sut.schedule_newsletter(ready.id(), &tenant_id, scheduled_at)
            .await
            .unwrap();

        let dispatched = sut.dispatch_due_schedules(fixture.now).await.unwrap();

        assert_eq!(dispatched, 0);
        assert_eq!(
            fixture.newsletter_repo.get(ready.id()).unwrap().status(),
            NewsletterStatus::Scheduled
        );
    }
}

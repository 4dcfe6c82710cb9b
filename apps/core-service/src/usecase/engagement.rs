//! # エンゲージメント取り込み
//!
//! 配信プロバイダの Webhook イベントを受信者配信記録に反映する。
//!
//! ## 設計方針
//!
//! - **冪等**: 同一イベント（配信記録 × 種別 × 発生時刻）の再送は `Duplicate`
//! - **未知のメッセージ ID は成功扱い**: ログに残して `UnknownMessage` を返し、
//!   プロバイダには 2xx を返させる（再送ループを防ぐ）
//! - **ストレージ障害はエラー**: 5xx でプロバイダに再送させる

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mailflow_domain::{
    engagement::{EngagementEvent, EngagementEventId, EngagementEventType},
    recipient_send::{EngagementApplied, RecipientSend},
};
use mailflow_infra::repository::{EngagementEventRepository, RecipientSendRepository};
use mailflow_shared::{event_log::event, log_business_event};

use crate::error::CoreError;

/// プロバイダから届いた Webhook イベント
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    /// プロバイダ側メッセージ ID（送信時の receipt と対応）
    pub provider_message_id: String,
    pub event_type:          EngagementEventType,
    pub occurred_at:         DateTime<Utc>,
    /// プロバイダ固有の付随データ（そのままイベントログに保存）
    pub metadata:            serde_json::Value,
}

/// 取り込みの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 配信記録に反映した
    Applied,
    /// 既に記録済みのイベント（no-op）
    Duplicate,
    /// メッセージ ID に対応する配信記録がない
    UnknownMessage,
}

/// エンゲージメント取り込みユースケース
pub struct EngagementUseCaseImpl {
    recipient_send_repo: Arc<dyn RecipientSendRepository>,
    event_repo: Arc<dyn EngagementEventRepository>,
}

impl EngagementUseCaseImpl {
    pub fn new(
        recipient_send_repo: Arc<dyn RecipientSendRepository>,
        event_repo: Arc<dyn EngagementEventRepository>,
    ) -> Self {
        Self {
            recipient_send_repo,
            event_repo,
        }
    }

    /// Webhook イベントを取り込む
    ///
    /// ニュースレターがローカルで `sent` になる前にイベントが先着しても、
    /// 配信記録さえあれば問題なく反映される。
    pub async fn ingest(&self, provider_event: ProviderEvent) -> Result<IngestOutcome, CoreError> {
        let Some(send) = self
            .recipient_send_repo
            .find_by_provider_message_id(&provider_event.provider_message_id)
            .await?
        else {
            tracing::warn!(
                provider_message_id = %provider_event.provider_message_id,
                event_type = %provider_event.event_type,
                "未知のメッセージ ID のイベントを受信"
            );
            return Ok(IngestOutcome::UnknownMessage);
        };

        let already_recorded = self
            .event_repo
            .exists(
                send.id(),
                provider_event.event_type,
                provider_event.occurred_at,
            )
            .await?;
        if already_recorded {
            log_business_event!(
                event.category = event::category::ENGAGEMENT,
                event.action = event::action::EVENT_DUPLICATE,
                event.entity_id = %send.id(),
                event.entity_type = event::entity_type::RECIPIENT_SEND,
                event.result = event::result::SUCCESS,
                engagement.event_type = %provider_event.event_type,
                "重複イベントをスキップ"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        // イベントログへの追記を先に行う。ユニークインデックスが
        // 並行再送の敗者を弾くので、カウンタの二重反映は起こらない。
        let log_entry = EngagementEvent::new(
            EngagementEventId::new(),
            send.id().clone(),
            provider_event.event_type,
            provider_event.occurred_at,
            provider_event.metadata,
        );
        if let Err(e) = self.event_repo.append(&log_entry).await {
            if e.as_conflict().is_some() {
                log_business_event!(
                    event.category = event::category::ENGAGEMENT,
                    event.action = event::action::EVENT_DUPLICATE,
                    event.entity_id = %send.id(),
                    event.entity_type = event::entity_type::RECIPIENT_SEND,
                    event.result = event::result::SUCCESS,
                    engagement.event_type = %provider_event.event_type,
                    "並行再送の重複イベントをスキップ"
                );
                return Ok(IngestOutcome::Duplicate);
            }
            return Err(CoreError::Database(e));
        }

        let (updated, applied) = apply_event(
            send,
            provider_event.event_type,
            provider_event.occurred_at,
        );
        self.recipient_send_repo.save(&updated).await?;

        log_business_event!(
            event.category = event::category::ENGAGEMENT,
            event.action = event::action::EVENT_INGESTED,
            event.entity_id = %updated.id(),
            event.entity_type = event::entity_type::RECIPIENT_SEND,
            event.result = event::result::SUCCESS,
            engagement.event_type = %provider_event.event_type,
            engagement.counted = matches!(applied, EngagementApplied::Counted { .. }),
            "エンゲージメントイベントを取り込みました"
        );

        Ok(IngestOutcome::Applied)
    }
}

/// イベント種別に応じた配信記録の更新を適用する
fn apply_event(
    send: RecipientSend,
    event_type: EngagementEventType,
    occurred_at: DateTime<Utc>,
) -> (RecipientSend, EngagementApplied) {
    match event_type {
        EngagementEventType::Delivered => send.delivered(occurred_at),
        EngagementEventType::Opened => send.opened(occurred_at),
        EngagementEventType::Clicked => send.clicked(occurred_at),
        EngagementEventType::Bounced => send.bounced(occurred_at),
        EngagementEventType::Complained => send.complained(occurred_at),
        EngagementEventType::Suppressed => send.suppressed(occurred_at),
    }
}

#[cfg(test)]
mod tests {
    use mailflow_domain::{
        newsletter::NewsletterId,
        recipient_send::{RecipientSendId, RecipientSendStatus},
        value_objects::EmailAddress,
    };
    use mailflow_infra::mock::{MockEngagementEventRepository, MockRecipientSendRepository};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    struct Fixture {
        recipient_send_repo: MockRecipientSendRepository,
        event_repo: MockEngagementEventRepository,
        send_id: RecipientSendId,
        now: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            let recipient_send_repo = MockRecipientSendRepository::new();
            let now = chrono::Utc::now();
            let send = RecipientSend::queued(
                RecipientSendId::new(),
                NewsletterId::new(),
                EmailAddress::new("a@example.com").unwrap(),
                now,
            )
            .marked_sent(Some("provider-msg-1".to_string()), now)
            .unwrap();
            let send_id = send.id().clone();
            recipient_send_repo.add(send);

            Self {
                recipient_send_repo,
                event_repo: MockEngagementEventRepository::new(),
                send_id,
                now,
            }
        }

        fn usecase(&self) -> EngagementUseCaseImpl {
            EngagementUseCaseImpl::new(
                Arc::new(self.recipient_send_repo.clone()),
                Arc::new(self.event_repo.clone()),
            )
        }

        fn stored(&self) -> RecipientSend {
            self.recipient_send_repo
                .all()
                .into_iter()
                .find(|s| *s.id() == self.send_id)
                .unwrap()
        }
    }

    fn provider_event(
        event_type: EngagementEventType,
        occurred_at: DateTime<Utc>,
    ) -> ProviderEvent {
        ProviderEvent {
            provider_message_id: "provider-msg-1".to_string(),
            event_type,
            occurred_at,
            metadata: json!({"user_agent": "test"}),
        }
    }

    #[tokio::test]
    async fn test_開封イベントでカウンターが増える() {
        let fixture = Fixture::new();
        let sut = fixture.usecase();

        let outcome = sut
            .ingest(provider_event(EngagementEventType::Opened, fixture.now))
            .await
            .unwrap();

        assert_eq!(outcome, IngestOutcome::Applied);
        assert_eq!(fixture.stored().opens(), 1);
        assert_eq!(fixture.event_repo.all().len(), 1);
    }

    #[tokio::test]
    async fn test_同一イベントの再送はduplicateでカウンターは変わらない() {
        let fixture = Fixture::new();
        let sut = fixture.usecase();
        let event = provider_event(EngagementEventType::Opened, fixture.now);

        sut.ingest(event.clone()).await.unwrap();
        let outcome = sut.ingest(event).await.unwrap();

        assert_eq!(outcome, IngestOutcome::Duplicate);
        assert_eq!(fixture.stored().opens(), 1);
        assert_eq!(fixture.event_repo.all().len(), 1);
    }

    #[tokio::test]
    async fn test_並行再送で追記が競合してもduplicateになる() {
        let fixture = Fixture::new();
        let sut = fixture.usecase();
        let event = provider_event(EngagementEventType::Opened, fixture.now);

        sut.ingest(event.clone()).await.unwrap();

        // 重複プローブをすり抜けた再送はユニークインデックスで弾かれ、
        // エラーではなく Duplicate として冪等に処理される
        fixture.event_repo.blind_duplicate_probe();
        let outcome = sut.ingest(event).await.unwrap();

        assert_eq!(outcome, IngestOutcome::Duplicate);
        assert_eq!(fixture.stored().opens(), 1);
        assert_eq!(fixture.event_repo.all().len(), 1);
    }

    #[tokio::test]
    async fn test_発生時刻が異なる開封は別イベントとして数えられる() {
        let fixture = Fixture::new();
        let sut = fixture.usecase();

        sut.ingest(provider_event(EngagementEventType::Opened, fixture.now))
            .await
            .unwrap();
        sut.ingest(provider_event(
            EngagementEventType::Opened,
            fixture.now + chrono::Duration::minutes(5),
        ))
        .await
        .unwrap();

        assert_eq!(fixture.stored().opens(), 2);
        assert_eq!(fixture.event_repo.all().len(), 2);
    }

    #[tokio::test]
    async fn test_未知のメッセージidはunknown_message() {
        let fixture = Fixture::new();
        let sut = fixture.usecase();

        let outcome = sut
            .ingest(ProviderEvent {
                provider_message_id: "no-such-message".to_string(),
                event_type: EngagementEventType::Delivered,
                occurred_at: fixture.now,
                metadata: json!({}),
            })
            .await
            .unwrap();

        assert_eq!(outcome, IngestOutcome::UnknownMessage);
        assert!(fixture.event_repo.all().is_empty());
    }

    #[tokio::test]
    async fn test_バウンス後の開封はログのみでカウンターは増えない() {
        let fixture = Fixture::new();
        let sut = fixture.usecase();

        sut.ingest(provider_event(EngagementEventType::Bounced, fixture.now))
            .await
            .unwrap();
        sut.ingest(provider_event(
            EngagementEventType::Opened,
            fixture.now + chrono::Duration::minutes(1),
        ))
        .await
        .unwrap();

        let stored = fixture.stored();
        assert_eq!(stored.status(), RecipientSendStatus::Bounced);
        assert_eq!(stored.opens(), 0);
        // 監査用のイベントログには両方残る
        assert_eq!(fixture.event_repo.all().len(), 2);
    }

    #[tokio::test]
    async fn test_ストレージ障害はエラーとして伝播する() {
        let fixture = Fixture::new();
        fixture.recipient_send_repo.fail_saves();
        let sut = fixture.usecase();

        let result = sut
            .ingest(provider_event(EngagementEventType::Opened, fixture.now))
            .await;

        assert!(matches!(result, Err(CoreError::Database(_))));
    }
}

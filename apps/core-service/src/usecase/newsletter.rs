//! # ニュースレターユースケース
//!
//! ニュースレターのライフサイクル全体を調停するユースケース層。
//!
//! ## 設計方針
//!
//! - **状態遷移はドメインに委譲**: ユースケースは取得 → ドメインメソッド → 永続化の調停のみ
//! - **楽観的ロック**: 通常の更新は `update_with_version_check`、送信開始のみステータス CAS
//! - **通知は fire-and-forget**: 通知の失敗が操作を失敗させることはない

mod review;
mod send;

use std::sync::Arc;

use mailflow_domain::{
    clock::Clock,
    newsletter::{DraftContent, NewNewsletter, Newsletter, NewsletterId, Targeting},
    tenant::TenantId,
    user::UserId,
    value_objects::{NewsletterTitle, Subject, Version},
};
use mailflow_infra::repository::{
    ApprovalCodeRepository,
    NewsletterRepository,
    TenantRepository,
    UserRepository,
};
use mailflow_shared::{event_log::event, log_business_event};

pub use send::SendReport;

use super::{FanoutCoordinator, NotificationService, helpers::FindResultExt};
use crate::error::CoreError;

/// ニュースレター作成の入力
pub struct CreateNewsletterInput {
    pub tenant_id:  TenantId,
    pub created_by: UserId,
    pub title:      String,
    pub subject:    String,
    pub content:    String,
    pub targeting:  Targeting,
}

/// ニュースレター編集の入力
///
/// `version` はクライアントが取得時に受け取った値。楽観的ロックに使う。
pub struct EditNewsletterInput {
    pub tenant_id: TenantId,
    pub id:        NewsletterId,
    pub version:   u32,
    pub title:     String,
    pub subject:   String,
    pub content:   String,
    pub targeting: Targeting,
}

/// レビュー裁定の入力
pub struct ReviewInput {
    /// 操作するユーザー（指名レビュアーであること）
    pub acting_user: UserId,
    /// 承認コード（承認時のみ検証される）
    pub code:        String,
    /// コメント（却下時は必須）
    pub notes:       Option<String>,
}

/// ニュースレターユースケース
pub struct NewsletterUseCaseImpl {
    newsletter_repo: Arc<dyn NewsletterRepository>,
    approval_code_repo: Arc<dyn ApprovalCodeRepository>,
    tenant_repo: Arc<dyn TenantRepository>,
    user_repo: Arc<dyn UserRepository>,
    fanout: Arc<FanoutCoordinator>,
    notification_service: Arc<NotificationService>,
    clock: Arc<dyn Clock>,
}

impl NewsletterUseCaseImpl {
    pub fn new(
        newsletter_repo: Arc<dyn NewsletterRepository>,
        approval_code_repo: Arc<dyn ApprovalCodeRepository>,
        tenant_repo: Arc<dyn TenantRepository>,
        user_repo: Arc<dyn UserRepository>,
        fanout: Arc<FanoutCoordinator>,
        notification_service: Arc<NotificationService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            newsletter_repo,
            approval_code_repo,
            tenant_repo,
            user_repo,
            fanout,
            notification_service,
            clock,
        }
    }

    /// ニュースレターを下書きとして作成する
    pub async fn create_newsletter(
        &self,
        input: CreateNewsletterInput,
    ) -> Result<Newsletter, CoreError> {
        let newsletter = Newsletter::new(NewNewsletter {
            id:         NewsletterId::new(),
            tenant_id:  input.tenant_id.clone(),
            title:      NewsletterTitle::new(input.title)?,
            subject:    Subject::new(input.subject)?,
            content:    input.content,
            targeting:  input.targeting,
            created_by: input.created_by,
            now:        self.clock.now(),
        });

        self.newsletter_repo.insert(&newsletter).await?;

        log_business_event!(
            event.category = event::category::NEWSLETTER,
            event.action = event::action::NEWSLETTER_CREATED,
            event.tenant_id = %input.tenant_id,
            event.entity_id = %newsletter.id(),
            event.entity_type = event::entity_type::NEWSLETTER,
            event.result = event::result::SUCCESS,
            "ニュースレターを作成しました"
        );

        Ok(newsletter)
    }

    /// 下書きの内容を編集する
    ///
    /// 下書き以外（送信済みを含む）は編集できない。送信済みへの編集は
    /// `ImmutableContent` として拒否される。
    pub async fn edit_newsletter(&self, input: EditNewsletterInput) -> Result<Newsletter, CoreError> {
        let newsletter = self
            .newsletter_repo
            .find_by_id(&input.id, &input.tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        let expected_version = Version::new(input.version)?;
        let updated = newsletter.edited(
            DraftContent {
                title:     NewsletterTitle::new(input.title)?,
                subject:   Subject::new(input.subject)?,
                content:   input.content,
                targeting: input.targeting,
            },
            self.clock.now(),
        )?;

        self.newsletter_repo
            .update_with_version_check(&updated, expected_version)
            .await
            .map_err(super::helpers::map_version_conflict)?;

        Ok(updated)
    }

    /// ニュースレターを取得する
    pub async fn get_newsletter(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
    ) -> Result<Newsletter, CoreError> {
        self.newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")
    }

    /// テナント内のニュースレター一覧を取得する（作成日時降順）
    pub async fn list_newsletters(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Newsletter>, CoreError> {
        Ok(self.newsletter_repo.find_by_tenant(tenant_id).await?)
    }

    /// 送信を予約する
    ///
    /// 下書きまたは送信可能状態からのみ予約できる。予約済みの時刻変更は
    /// 再度この操作を呼ぶ（Scheduled からの再予約は不正遷移）。
    pub async fn schedule_newsletter(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
        scheduled_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Newsletter, CoreError> {
        let now = self.clock.now();
        if scheduled_at <= now {
            return Err(CoreError::BadRequest(
                "予約時刻は未来である必要があります".to_string(),
            ));
        }

        let newsletter = self
            .newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        let expected_version = newsletter.version();
        let scheduled = newsletter.scheduled(scheduled_at, now)?;

        self.newsletter_repo
            .update_with_version_check(&scheduled, expected_version)
            .await
            .map_err(super::helpers::map_version_conflict)?;

        log_business_event!(
            event.category = event::category::NEWSLETTER,
            event.action = event::action::NEWSLETTER_SCHEDULED,
            event.tenant_id = %tenant_id,
            event.entity_id = %scheduled.id(),
            event.entity_type = event::entity_type::NEWSLETTER,
            event.result = event::result::SUCCESS,
            scheduled_at = %scheduled_at,
            "送信を予約しました"
        );

        Ok(scheduled)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use mailflow_domain::clock::FixedClock;
    use mailflow_infra::mock::{
        MockApprovalCodeRepository,
        MockAudienceResolver,
        MockNewsletterRepository,
        MockNotificationSender,
        MockRecipientSendRepository,
        MockSuppressionList,
        MockTenantRepository,
        MockTransmissionGateway,
        MockUserRepository,
    };

    use super::*;
    use crate::{config::DeliveryConfig, usecase::TemplateRenderer};

    /// テスト用のモック束
    ///
    /// 既定では全受信者への送信が成功する。個々のテストは構築後に
    /// モックへ failure / audience を注入する。
    pub(crate) struct Fixture {
        pub newsletter_repo: MockNewsletterRepository,
        pub approval_code_repo: MockApprovalCodeRepository,
        pub recipient_send_repo: MockRecipientSendRepository,
        pub tenant_repo: MockTenantRepository,
        pub user_repo: MockUserRepository,
        pub audience: MockAudienceResolver,
        pub suppression: MockSuppressionList,
        pub gateway: MockTransmissionGateway,
        pub sender: MockNotificationSender,
        pub now: chrono::DateTime<chrono::Utc>,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            Self {
                newsletter_repo: MockNewsletterRepository::new(),
                approval_code_repo: MockApprovalCodeRepository::new(),
                recipient_send_repo: MockRecipientSendRepository::new(),
                tenant_repo: MockTenantRepository::new(),
                user_repo: MockUserRepository::new(),
                audience: MockAudienceResolver::new(),
                suppression: MockSuppressionList::new(),
                gateway: MockTransmissionGateway::new(),
                sender: MockNotificationSender::new(),
                now: chrono::Utc::now(),
            }
        }

        pub(crate) fn usecase(&self) -> NewsletterUseCaseImpl {
            let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(self.now));
            let fanout = Arc::new(FanoutCoordinator::new(
                Arc::new(self.audience.clone()),
                Arc::new(self.suppression.clone()),
                Arc::new(self.recipient_send_repo.clone()),
                Arc::new(self.gateway.clone()),
                Arc::clone(&clock),
                DeliveryConfig {
                    max_concurrency:    4,
                    batch_timeout:      Duration::from_secs(60),
                    scheduler_interval: Duration::from_secs(30),
                },
            ));
            let notification_service = Arc::new(NotificationService::new(
                Arc::new(self.sender.clone()),
                TemplateRenderer::new().unwrap(),
                "http://localhost:5173".to_string(),
            ));

            NewsletterUseCaseImpl::new(
                Arc::new(self.newsletter_repo.clone()),
                Arc::new(self.approval_code_repo.clone()),
                Arc::new(self.tenant_repo.clone()),
                Arc::new(self.user_repo.clone()),
                fanout,
                notification_service,
                clock,
            )
        }
    }
}

//! # 通知サービス
//!
//! テンプレートレンダリング → メール送信を統合するサービス。
//!
//! ## 設計方針
//!
//! - **fire-and-forget**: `notify()` は送信失敗してもエラーを返さない
//! - **構造化ログ**: 成功・失敗どちらも `log_business_event!` で記録
//! - **依存性注入**: `NotificationSender` は trait で抽象化

use std::sync::Arc;

use mailflow_domain::{
    newsletter::NewsletterId,
    notification::NewsletterNotification,
    tenant::TenantId,
};
use mailflow_infra::notification::NotificationSender;
use mailflow_shared::{event_log::event, log_business_event};

use super::TemplateRenderer;

/// 通知サービス
///
/// レビューワークフローに伴うメール通知の全体フローを統合する。
/// `notify()` は fire-and-forget で、送信失敗してもエラーを返さない。
pub struct NotificationService {
    sender: Arc<dyn NotificationSender>,
    template_renderer: TemplateRenderer,
    base_url: String,
}

impl NotificationService {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        template_renderer: TemplateRenderer,
        base_url: String,
    ) -> Self {
        Self {
            sender,
            template_renderer,
            base_url,
        }
    }

    /// 通知を送信する（fire-and-forget）
    ///
    /// テンプレートレンダリング → メール送信を行う。
    /// いずれのステップで失敗してもエラーを返さない（ログ出力のみ）。
    pub async fn notify(
        &self,
        notification: NewsletterNotification,
        tenant_id: &TenantId,
        newsletter_id: &NewsletterId,
    ) {
        let event_type = notification.event_type();
        let event_type_str: &str = event_type.into();
        let recipient_email = notification.recipient_email().to_string();

        let email = match self
            .template_renderer
            .render(&notification, &self.base_url, newsletter_id)
        {
            Ok(email) => email,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    event_type = event_type_str,
                    "通知テンプレートのレンダリングに失敗"
                );
                return;
            }
        };

        match self.sender.send_email(&email).await {
            Ok(()) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_SENT,
                    event.tenant_id = %tenant_id,
                    event.entity_id = %newsletter_id,
                    event.entity_type = event::entity_type::NEWSLETTER,
                    event.result = event::result::SUCCESS,
                    notification.event_type = event_type_str,
                    notification.recipient = %recipient_email,
                    "通知メール送信成功"
                );
            }
            Err(e) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_FAILED,
                    event.tenant_id = %tenant_id,
                    event.entity_id = %newsletter_id,
                    event.entity_type = event::entity_type::NEWSLETTER,
                    event.result = event::result::FAILURE,
                    notification.event_type = event_type_str,
                    notification.recipient = %recipient_email,
                    error = %e,
                    "通知メール送信失敗"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mailflow_domain::user::UserId;
    use mailflow_infra::mock::MockNotificationSender;
    use pretty_assertions::assert_eq;

    use super::*;

    fn make_service(sender: MockNotificationSender) -> NotificationService {
        NotificationService::new(
            Arc::new(sender),
            TemplateRenderer::new().unwrap(),
            "http://localhost:5173".to_string(),
        )
    }

    fn review_request() -> NewsletterNotification {
        NewsletterNotification::ReviewRequest {
            newsletter_title: "8月号".to_string(),
            author_name:      "田中太郎".to_string(),
            approval_code:    "12345".to_string(),
            reviewer_email:   "reviewer@example.com".to_string(),
            reviewer_user_id: UserId::new(),
        }
    }

    #[tokio::test]
    async fn test_通知メールが送信される() {
        let sender = MockNotificationSender::new();
        let service = make_service(sender.clone());

        service
            .notify(review_request(), &TenantId::new(), &NewsletterId::new())
            .await;

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "reviewer@example.com");
        assert!(sent[0].subject.contains("レビュー依頼"));
    }

    #[tokio::test]
    async fn test_送信失敗でもパニックやエラーにならない() {
        let sender = MockNotificationSender::new();
        sender.fail_next();
        let service = make_service(sender.clone());

        service
            .notify(review_request(), &TenantId::new(), &NewsletterId::new())
            .await;

        assert_eq!(sender.sent().len(), 0);
    }
}

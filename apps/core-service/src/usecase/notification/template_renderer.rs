//! # テンプレートレンダラー
//!
//! tera テンプレートエンジンで通知メールを HTML/plaintext 両形式で生成する。
//!
//! ## 設計方針
//!
//! - **`include_str!` によるコンパイル時埋め込み**: テンプレートはバイナリに埋め込まれる
//! - **件名パターン**: `[MailFlow] {イベント種別}: {title}`
//! - **ニュースレター詳細リンク**: `{base_url}/newsletters/{id}` をテンプレートに渡す

use mailflow_domain::{
    newsletter::NewsletterId,
    notification::{EmailMessage, NewsletterNotification, NotificationError},
};
use tera::{Context, Tera};

/// テンプレートレンダラー
///
/// tera テンプレートエンジンをラップし、`NewsletterNotification` から
/// `EmailMessage` を生成する。
pub struct TemplateRenderer {
    engine: Tera,
}

impl TemplateRenderer {
    /// 新しいレンダラーインスタンスを作成
    ///
    /// `include_str!` で埋め込んだテンプレートを tera に登録する。
    pub fn new() -> Result<Self, NotificationError> {
        let mut engine = Tera::default();

        engine
            .add_raw_templates(vec![
                (
                    "review_request.html",
                    include_str!("../../../templates/notifications/review_request.html"),
                ),
                (
                    "review_request.txt",
                    include_str!("../../../templates/notifications/review_request.txt"),
                ),
                (
                    "approved.html",
                    include_str!("../../../templates/notifications/approved.html"),
                ),
                (
                    "approved.txt",
                    include_str!("../../../templates/notifications/approved.txt"),
                ),
                (
                    "rejected.html",
                    include_str!("../../../templates/notifications/rejected.html"),
                ),
                (
                    "rejected.txt",
                    include_str!("../../../templates/notifications/rejected.txt"),
                ),
            ])
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(Self { engine })
    }

    /// 通知イベントからメールメッセージを生成する
    ///
    /// # 引数
    ///
    /// - `notification`: ニュースレター通知イベント
    /// - `base_url`: アプリケーションのベース URL（例: `http://localhost:5173`）
    /// - `newsletter_id`: 詳細画面リンクの構築に使う
    pub fn render(
        &self,
        notification: &NewsletterNotification,
        base_url: &str,
        newsletter_id: &NewsletterId,
    ) -> Result<EmailMessage, NotificationError> {
        let (template_name, subject, context) =
            self.build_template_params(notification, base_url, newsletter_id);

        let html_body = self
            .engine
            .render(&format!("{template_name}.html"), &context)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        let text_body = self
            .engine
            .render(&format!("{template_name}.txt"), &context)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(EmailMessage {
            to: notification.recipient_email().to_string(),
            subject,
            html_body,
            text_body,
        })
    }

    /// テンプレート名、件名、コンテキストを構築する
    fn build_template_params(
        &self,
        notification: &NewsletterNotification,
        base_url: &str,
        newsletter_id: &NewsletterId,
    ) -> (String, String, Context) {
        let newsletter_url = format!("{base_url}/newsletters/{newsletter_id}");

        let mut context = Context::new();
        context.insert("newsletter_url", &newsletter_url);

        let (template_name, subject) = match notification {
            NewsletterNotification::ReviewRequest {
                newsletter_title,
                author_name,
                approval_code,
                ..
            } => {
                context.insert("newsletter_title", newsletter_title);
                context.insert("author_name", author_name);
                context.insert("approval_code", approval_code);
                (
                    "review_request".to_string(),
                    format!("[MailFlow] レビュー依頼: {newsletter_title}"),
                )
            }
            NewsletterNotification::Approved {
                newsletter_title,
                reviewer_name,
                notes,
                ..
            } => {
                context.insert("newsletter_title", newsletter_title);
                context.insert("reviewer_name", reviewer_name);
                context.insert("notes", &notes.as_deref().unwrap_or(""));
                (
                    "approved".to_string(),
                    format!("[MailFlow] 承認完了: {newsletter_title}"),
                )
            }
            NewsletterNotification::Rejected {
                newsletter_title,
                reviewer_name,
                notes,
                ..
            } => {
                context.insert("newsletter_title", newsletter_title);
                context.insert("reviewer_name", reviewer_name);
                context.insert("notes", notes);
                (
                    "rejected".to_string(),
                    format!("[MailFlow] 却下: {newsletter_title}"),
                )
            }
        };

        (template_name, subject, context)
    }
}

//! # レビューワークフロー通知の送信
//!
//! レビュー依頼・承認・却下の通知メールを送信する。
//!
//! ## 設計方針
//!
//! - **トレイト抽象化**: 送信手段（SMTP / Noop）を差し替え可能にする
//! - **本文はユースケース側**: テンプレートのレンダリングは通知サービスが行い、
//!   このトレイトは組み立て済みの [`EmailMessage`] を送るだけ

use async_trait::async_trait;
use mailflow_domain::notification::{EmailMessage, NotificationError};

pub mod noop;
pub mod smtp;

pub use noop::NoopNotificationSender;
pub use smtp::SmtpNotificationSender;

/// 通知メール送信トレイト
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 通知メールを 1 通送信する
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError>;
}

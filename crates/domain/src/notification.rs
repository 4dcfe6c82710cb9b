//! # 通知
//!
//! レビューワークフローに伴うメール通知のドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **enum による通知イベント**: 各バリアントが通知イベントに対応
//! - **fire-and-forget**: 通知送信の失敗はニュースレター操作に影響しない
//! - **テンプレート分離**: 通知イベントとメール生成は分離（レンダリングは core-service）

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use thiserror::Error;

use crate::user::UserId;

/// 通知送信エラー
#[derive(Debug, Error)]
pub enum NotificationError {
    /// メール送信に失敗
    #[error("メール送信に失敗: {0}")]
    SendFailed(String),

    /// テンプレートレンダリングに失敗
    #[error("テンプレートレンダリングに失敗: {0}")]
    TemplateFailed(String),
}

/// 通知イベント種別
///
/// 構造化ログの `event.notification_type` フィールドに格納される値。
/// snake_case でシリアライズされる。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationEventType {
    /// レビュー依頼: レビュー申請時 → レビュアーに承認コードを送信
    ReviewRequest,
    /// 承認完了: レビュアーの承認時 → 作成者に送信
    Approved,
    /// 却下: レビュアーの却下時 → 作成者に理由つきで送信
    Rejected,
}

/// メールメッセージ
///
/// テンプレートレンダリングの出力。NotificationSender に渡される。
#[derive(Debug, Clone)]
pub struct EmailMessage {
    /// 送信先メールアドレス
    pub to:        String,
    /// 件名
    pub subject:   String,
    /// HTML 本文
    pub html_body: String,
    /// プレーンテキスト本文
    pub text_body: String,
}

/// ニュースレター通知イベント
///
/// レビューワークフローの各局面で発火し、テンプレートレンダリングを経て
/// メールとして送信される。
#[derive(Debug, Clone)]
pub enum NewsletterNotification {
    /// レビュー依頼: レビュー申請時 → レビュアーに承認コードを送信
    ReviewRequest {
        newsletter_title: String,
        author_name:      String,
        approval_code:    String,
        reviewer_email:   String,
        reviewer_user_id: UserId,
    },
    /// 承認完了: レビュアーの承認時 → 作成者に送信
    Approved {
        newsletter_title: String,
        reviewer_name:    String,
        notes:            Option<String>,
        author_email:     String,
        author_user_id:   UserId,
    },
    /// 却下: レビュアーの却下時 → 作成者に理由つきで送信
    Rejected {
        newsletter_title: String,
        reviewer_name:    String,
        notes:            String,
        author_email:     String,
        author_user_id:   UserId,
    },
}

impl NewsletterNotification {
    /// 通知イベント種別を返す
    pub fn event_type(&self) -> NotificationEventType {
        match self {
            Self::ReviewRequest { .. } => NotificationEventType::ReviewRequest,
            Self::Approved { .. } => NotificationEventType::Approved,
            Self::Rejected { .. } => NotificationEventType::Rejected,
        }
    }

    /// 送信先メールアドレスを返す
    pub fn recipient_email(&self) -> &str {
        match self {
            Self::ReviewRequest { reviewer_email, .. } => reviewer_email,
            Self::Approved { author_email, .. } => author_email,
            Self::Rejected { author_email, .. } => author_email,
        }
    }

    /// 送信先ユーザー ID を返す
    pub fn recipient_user_id(&self) -> &UserId {
        match self {
            Self::ReviewRequest { reviewer_user_id, .. } => reviewer_user_id,
            Self::Approved { author_user_id, .. } => author_user_id,
            Self::Rejected { author_user_id, .. } => author_user_id,
        }
    }
}

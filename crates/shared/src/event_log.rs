//! # ビジネスイベントログとエラーコンテキストの構造化ヘルパー
//!
//! 運用者が `jq` で効率的に調査できるよう、ログフィールドの命名規約と
//! ヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## エラーコンテキスト
//!
//! 既存の `tracing::error!` に `error.category` + `error.kind` フィールドを直接追加する。
//! 定数は [`error`] モジュールで提供。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`error.kind`）を使用。tracing の
//! `$($field:ident).+` パターンでサポートされ、JSON 出力でフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.tenant_id`: テナント ID
/// - `event.result`: 結果（[`event::result`] の定数を使用）
///
/// ## 推奨フィールド
///
/// - `event.entity_type`: エンティティ種別（[`event::entity_type`] の定数を使用）
/// - `event.entity_id`: エンティティ ID
/// - `event.actor_id`: 操作者 ID
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const NEWSLETTER: &str = "newsletter";
        pub const DELIVERY: &str = "delivery";
        pub const ENGAGEMENT: &str = "engagement";
        pub const NOTIFICATION: &str = "notification";
    }

    /// イベントアクション
    pub mod action {
        // ニュースレター
        pub const NEWSLETTER_CREATED: &str = "newsletter.created";
        pub const NEWSLETTER_SUBMITTED: &str = "newsletter.submitted";
        pub const NEWSLETTER_APPROVED: &str = "newsletter.approved";
        pub const NEWSLETTER_REJECTED: &str = "newsletter.rejected";
        pub const NEWSLETTER_SCHEDULED: &str = "newsletter.scheduled";

        // 配信
        pub const SEND_STARTED: &str = "send.started";
        pub const SEND_COMPLETED: &str = "send.completed";
        pub const SEND_FAILED: &str = "send.failed";

        // エンゲージメント
        pub const EVENT_INGESTED: &str = "engagement.event_ingested";
        pub const EVENT_DUPLICATE: &str = "engagement.event_duplicate";

        // 通知
        pub const NOTIFICATION_SENT: &str = "notification.sent";
        pub const NOTIFICATION_FAILED: &str = "notification.failed";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const NEWSLETTER: &str = "newsletter";
        pub const RECIPIENT_SEND: &str = "recipient_send";
        pub const ENGAGEMENT_EVENT: &str = "engagement_event";
        pub const USER: &str = "user";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB、SMTP）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 外部サービス呼び出し（配信ゲートウェイ）
        pub const EXTERNAL_SERVICE: &str = "external_service";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const INTERNAL: &str = "internal";
        pub const TRANSMISSION: &str = "transmission";
        pub const NOTIFICATION: &str = "notification";
    }
}

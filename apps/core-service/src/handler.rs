//! # HTTP リクエストハンドラ
//!
//! axum のルートに対応するハンドラ関数を定義する。
//!
//! ## 設計方針
//!
//! - 各ハンドラはサブモジュールに配置
//! - 親モジュール（この `handler.rs`）で re-export し、フラットな API を提供
//! - ハンドラは薄く保ち、ビジネスロジックはユースケース層に委譲

pub mod health;
pub mod newsletter;
pub mod stats;
pub mod webhook;

pub use health::health_check;
pub use newsletter::{
    NewsletterState,
    approve_and_send_newsletter,
    approve_newsletter,
    create_newsletter,
    get_newsletter,
    list_newsletters,
    reject_newsletter,
    schedule_newsletter,
    send_newsletter,
    submit_newsletter_for_review,
    update_newsletter,
};
pub use stats::{
    StatsState,
    get_newsletter_stats,
    get_recipient_timeline,
    get_task_status,
    list_recipients,
};
pub use webhook::{WebhookState, ingest_engagement_event};

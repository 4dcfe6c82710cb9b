//! # ユースケース層
//!
//! Core Service のビジネスロジックを実装する。
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリを `Arc<dyn Trait>` で外部から注入
//! - **薄いハンドラ**: ハンドラは薄く保ち、ロジックはユースケースに集約
//! - **状態遷移はドメイン層**: ユースケースは取得 → 遷移 → 保存の調停のみ
//!
//! ## モジュール構成
//!
//! - `newsletter`: ニュースレターのライフサイクル・レビュー・送信
//! - `fanout`: 受信者ファンアウトの並行制御
//! - `engagement`: Webhook イベントの取り込み
//! - `stats`: 配信統計の読み取り
//! - `notification`: レビューワークフローのメール通知

pub(crate) mod helpers;

pub mod engagement;
pub mod fanout;
pub mod newsletter;
pub mod notification;
pub mod stats;

pub use engagement::{EngagementUseCaseImpl, IngestOutcome, ProviderEvent};
pub use fanout::{FanoutCoordinator, FanoutReport};
pub use newsletter::{
    CreateNewsletterInput,
    EditNewsletterInput,
    NewsletterUseCaseImpl,
    ReviewInput,
    SendReport,
};
pub use notification::{NotificationService, TemplateRenderer};
pub use stats::{StatsUseCaseImpl, TaskPhase, TaskStatus};

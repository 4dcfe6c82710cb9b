//! # MailFlow インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 設計方針
//!
//! このクレートはドメイン層で定義されたインターフェース（リポジトリトレイト、
//! 配信ゲートウェイ、通知送信）の具体的な実装を提供する。外部システムの詳細を
//! カプセル化し、ドメイン層をインフラの変更から保護する。
//!
//! ## 責務
//!
//! - **データベース接続**: PostgreSQL への接続プール管理
//! - **リポジトリ実装**: ニュースレター・配信記録・エンゲージメントイベントの永続化
//! - **配信ゲートウェイ**: SMTP 経由のニュースレター配信
//! - **通知送信**: レビュー依頼・承認・却下メールの送信
//!
//! ## 依存関係
//!
//! ```text
//! core-service → infra → domain → shared
//!            ↘       ↘     ↓
//!              shared   shared
//! ```
//!
//! インフラ層は `domain` に依存する。
//! ドメイン層はインフラ層に依存しない（依存性逆転の原則）。
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL データベース接続管理
//! - [`error`] - インフラ層エラー定義
//! - [`repository`] - リポジトリ実装
//! - [`audience`] - 配信対象の解決と抑制リスト
//! - [`transmission`] - ニュースレター配信ゲートウェイ
//! - [`notification`] - レビューワークフロー通知の送信

pub mod audience;
pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod notification;
pub mod repository;
pub mod transmission;

pub use error::InfraError;
pub use notification::NotificationSender;
pub use transmission::{TransmissionGateway, TransmitReceipt};

//! # MailFlow ドメイン層
//!
//! ニュースレター承認・配信のビジネスロジックの中核を担うドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! このクレートは DDD（ドメイン駆動設計）の原則に従い、以下を提供する:
//!
//! - **エンティティ**: 一意の識別子を持つオブジェクト（例: Newsletter,
//!   RecipientSend）
//! - **値オブジェクト**: 識別子を持たない不変オブジェクト（例: TenantId,
//!   Subject）
//! - **ドメインサービス**: エンティティに属さないビジネスロジック
//! - **ドメインエラー**: ビジネスルール違反を表現するエラー型
//!
//! ## 依存関係の方向
//!
//! ```text
//! core-service → infra → domain → shared
//! ```
//!
//! ドメイン層はインフラ層（DB、外部サービス）に一切依存しない。
//! これにより、ビジネスロジックの純粋性が保たれる。
//!
//! ## モジュール構成
//!
//! - [`newsletter`] - ニュースレターの状態機械（ADT ベース）
//! - [`approval_code`] - 承認コード（ワンタイム・定数時間比較）
//! - [`recipient_send`] - 受信者ごとの配信記録とエンゲージメント適用
//! - [`engagement`] - エンゲージメントイベントとタイムライン構築
//! - [`error`] - ドメイン層で発生するエラーの定義
//! - [`tenant`] - マルチテナント機能のための識別子とレビュー設定
//!
//! ## 使用例
//!
//! ```rust
//! use mailflow_domain::{DomainError, tenant::TenantId};
//!
//! // テナント ID の生成
//! let tenant_id = TenantId::new();
//!
//! // ドメインエラーの生成
//! let error = DomainError::NotFound {
//!     entity_type: "Newsletter",
//!     id:          "nl-123".to_string(),
//! };
//! ```

#[macro_use]
mod macros;

pub mod approval_code;
pub mod clock;
pub mod engagement;
pub mod error;
pub mod newsletter;
pub mod notification;
pub mod recipient_send;
pub mod tenant;
pub mod user;
pub mod value_objects;

pub use error::DomainError;

/// PII マスキングで使用する置換文字列
pub const REDACTED: &str = "[REDACTED]";

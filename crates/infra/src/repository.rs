//! # リポジトリ実装
//!
//! ドメイン層で定義されたエンティティの永続化を提供する。
//!
//! ## 設計方針
//!
//! - **依存性逆転**: トレイトを定義し、PostgreSQL 実装をその下に置く
//! - **データベース抽象化**: sqlx を使用し、PostgreSQL 固有の処理をカプセル化
//! - **テスタビリティ**: トレイト経由でモック可能な設計（[`crate::mock`]）
//! - **復元時検証**: DB の行はフラットな `XRecord` を経由して `from_db` で
//!   ドメイン不変条件を検証しながら復元する

pub mod approval_code_repository;
pub mod engagement_event_repository;
pub mod newsletter_repository;
pub mod recipient_send_repository;
pub mod tenant_repository;
pub mod user_repository;

pub use approval_code_repository::{ApprovalCodeRepository, PostgresApprovalCodeRepository};
pub use engagement_event_repository::{
    EngagementEventRepository,
    PostgresEngagementEventRepository,
};
pub use newsletter_repository::{NewsletterRepository, PostgresNewsletterRepository};
pub use recipient_send_repository::{
    AggregateStats,
    PostgresRecipientSendRepository,
    RecipientSendPage,
    RecipientSendRepository,
};
pub use tenant_repository::{PostgresTenantRepository, TenantRepository};
pub use user_repository::{PostgresUserRepository, UserRepository};

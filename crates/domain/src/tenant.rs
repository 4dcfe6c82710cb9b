//! # テナント
//!
//! マルチテナント SaaS アーキテクチャにおけるテナント（顧客企業）のモデルと、
//! テナントごとのレビュー設定を定義する。
//!
//! ## マルチテナントとは
//!
//! 単一のアプリケーションインスタンスで複数の顧客（テナント）にサービスを提供する
//! アーキテクチャ。各テナントのデータは論理的に分離され、他のテナントからは
//! アクセスできない。すべてのビジネスエンティティは `TenantId` を持つ。
//!
//! ## 使用例
//!
//! ```rust
//! use mailflow_domain::tenant::TenantId;
//! use uuid::Uuid;
//!
//! // 新規テナント登録時
//! let tenant_id = TenantId::new();
//!
//! // データベースから取得した UUID から復元
//! let uuid = Uuid::parse_str("01234567-89ab-cdef-0123-456789abcdef").unwrap();
//! let tenant_id = TenantId::from_uuid(uuid);
//! ```

use crate::{DomainError, user::UserId};

define_uuid_id! {
    /// テナント（顧客企業）の一意識別子
    ///
    /// UUID v7 を使用するため、生成順にソート可能。
    /// テナント間のデータ分離はすべてのクエリがこの ID でフィルタすることで保証する。
    pub struct TenantId;
}

/// テナントごとのレビュー設定
///
/// ニュースレターの送信前レビュー（承認ワークフロー）を制御する。
///
/// | enabled | reviewer_id | 挙動 |
/// |---------|-------------|------|
/// | `false` | - | 作成者が直接 ReadyToSend にできる |
/// | `true` | `Some` | レビュー申請必須。指名レビュアーのみ承認・却下可能 |
/// | `true` | `None` | 設定不備。レビュー申請は `ConfigurationError` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSettings {
    pub enabled:     bool,
    pub reviewer_id: Option<UserId>,
}

impl ReviewSettings {
    /// レビュー無効のデフォルト設定
    pub fn disabled() -> Self {
        Self {
            enabled:     false,
            reviewer_id: None,
        }
    }

    /// レビュー申請に使うレビュアーを解決する
    ///
    /// # エラー
    ///
    /// - `ConfigurationError`: レビューが無効、またはレビュアー未設定
    pub fn require_reviewer(&self) -> Result<&UserId, DomainError> {
        if !self.enabled {
            return Err(DomainError::ConfigurationError(
                "このテナントではレビュー機能が無効です".to_string(),
            ));
        }
        self.reviewer_id.as_ref().ok_or_else(|| {
            DomainError::ConfigurationError(
                "レビュアーが設定されていません".to_string(),
            )
        })
    }
}

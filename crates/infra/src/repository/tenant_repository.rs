//! # TenantRepository
//!
//! テナントのレビュー設定の取得を担当するリポジトリ。
//!
//! レビュー設定はテナント行に直接持たせている。テナントが存在しない場合は
//! `Ok(None)` を返し、設定の妥当性判定はドメイン層（`ReviewSettings`）に委ねる。

use async_trait::async_trait;
use mailflow_domain::{
    tenant::{ReviewSettings, TenantId},
    user::UserId,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// テナントリポジトリトレイト
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// テナントのレビュー設定を取得
    async fn find_review_settings(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<ReviewSettings>, InfraError>;
}

/// PostgreSQL 実装の TenantRepository
#[derive(Debug, Clone)]
pub struct PostgresTenantRepository {
    pool: PgPool,
}

impl PostgresTenantRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for PostgresTenantRepository {
    async fn find_review_settings(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<ReviewSettings>, InfraError> {
        let row: Option<(bool, Option<Uuid>)> = sqlx::query_as(
            "SELECT review_enabled, reviewer_id FROM tenants WHERE id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(enabled, reviewer_id)| ReviewSettings {
            enabled,
            reviewer_id: reviewer_id.map(UserId::from_uuid),
        }))
    }
}

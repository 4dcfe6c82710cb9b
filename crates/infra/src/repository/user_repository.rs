//! # UserRepository
//!
//! ユーザー情報の取得を担当するリポジトリ。
//!
//! レビュアーへの通知送信と、操作ユーザーの権限判定に必要な最小限の
//! 情報のみを扱う。ユーザー管理そのものは別システムの責務。

use async_trait::async_trait;
use mailflow_domain::{
    tenant::TenantId,
    user::{User, UserId},
    value_objects::{EmailAddress, UserName},
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// ユーザーリポジトリトレイト
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// ID でユーザーを取得
    async fn find_by_id(
        &self,
        id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<Option<User>, InfraError>;
}

/// PostgreSQL 実装の UserRepository
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id:        Uuid,
    tenant_id: Uuid,
    name:      String,
    email:     String,
}

impl UserRow {
    fn into_domain(self) -> Result<User, InfraError> {
        Ok(User::new(
            UserId::from_uuid(self.id),
            TenantId::from_uuid(self.tenant_id),
            UserName::new(self.name)
                .map_err(|e| InfraError::unexpected(format!("不正なユーザー名: {e}")))?,
            EmailAddress::new(self.email)
                .map_err(|e| InfraError::unexpected(format!("{e}")))?,
        ))
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_id(
        &self,
        id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<Option<User>, InfraError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, tenant_id, name, email \
             FROM users WHERE id = $1 AND tenant_id = $2",
        )
        .bind(id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_domain).transpose()
    }
}

//! # ApprovalCodeRepository
//!
//! 承認コードの永続化を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **1 ニュースレター 1 有効コード**: 新しいコードの保存時に既存の
//!   未消費コードを消費済みにする（`save_invalidating_previous`）
//! - **検証はドメイン側**: リポジトリは有効コードの取得までを担当し、
//!   定数時間比較や有効期限の判定は `ApprovalCode::verify` が行う

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailflow_domain::{
    approval_code::{ApprovalCode, ApprovalCodeId, ApprovalCodeRecord},
    newsletter::NewsletterId,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// 承認コードリポジトリトレイト
#[async_trait]
pub trait ApprovalCodeRepository: Send + Sync {
    /// 新しいコードを保存し、同一ニュースレターの未消費コードを無効化する
    async fn save_invalidating_previous(
        &self,
        code: &ApprovalCode,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError>;

    /// ニュースレターの未消費コードを取得
    async fn find_active_by_newsletter(
        &self,
        newsletter_id: &NewsletterId,
    ) -> Result<Option<ApprovalCode>, InfraError>;

    /// コードを消費済みとして保存
    async fn mark_consumed(&self, code: &ApprovalCode) -> Result<(), InfraError>;

    /// ニュースレターの未消費コードをすべて無効化する
    ///
    /// 却下時に呼び出す。該当コードがなくてもエラーにしない。
    async fn invalidate_for_newsletter(
        &self,
        newsletter_id: &NewsletterId,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError>;
}

/// PostgreSQL 実装の ApprovalCodeRepository
#[derive(Debug, Clone)]
pub struct PostgresApprovalCodeRepository {
    pool: PgPool,
}

impl PostgresApprovalCodeRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ApprovalCodeRow {
    id:            Uuid,
    newsletter_id: Uuid,
    code:          String,
    issued_at:     DateTime<Utc>,
    consumed_at:   Option<DateTime<Utc>>,
}

impl ApprovalCodeRow {
    fn into_domain(self) -> Result<ApprovalCode, InfraError> {
        ApprovalCode::from_db(ApprovalCodeRecord {
            id:            ApprovalCodeId::from_uuid(self.id),
            newsletter_id: NewsletterId::from_uuid(self.newsletter_id),
            code:          self.code,
            issued_at:     self.issued_at,
            consumed_at:   self.consumed_at,
        })
        .map_err(|e| InfraError::unexpected(format!("{e}")))
    }
}

#[async_trait]
impl ApprovalCodeRepository for PostgresApprovalCodeRepository {
    async fn save_invalidating_previous(
        &self,
        code: &ApprovalCode,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        // 無効化と挿入を同一トランザクションで行い、
        // 有効コードが一時的に 2 つ存在する状態を作らない。
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE approval_codes SET consumed_at = $1 \
             WHERE newsletter_id = $2 AND consumed_at IS NULL",
        )
        .bind(now)
        .bind(code.newsletter_id().as_uuid())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO approval_codes (id, newsletter_id, code, issued_at, consumed_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(code.id().as_uuid())
        .bind(code.newsletter_id().as_uuid())
        .bind(code.code())
        .bind(code.issued_at())
        .bind(code.consumed_at())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_active_by_newsletter(
        &self,
        newsletter_id: &NewsletterId,
    ) -> Result<Option<ApprovalCode>, InfraError> {
        let row = sqlx::query_as::<_, ApprovalCodeRow>(
            "SELECT id, newsletter_id, code, issued_at, consumed_at \
             FROM approval_codes \
             WHERE newsletter_id = $1 AND consumed_at IS NULL \
             ORDER BY issued_at DESC \
             LIMIT 1",
        )
        .bind(newsletter_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApprovalCodeRow::into_domain).transpose()
    }

    async fn mark_consumed(&self, code: &ApprovalCode) -> Result<(), InfraError> {
        sqlx::query("UPDATE approval_codes SET consumed_at = $1 WHERE id = $2")
            .bind(code.consumed_at())
            .bind(code.id().as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn invalidate_for_newsletter(
        &self,
        newsletter_id: &NewsletterId,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        sqlx::query(
            "UPDATE approval_codes SET consumed_at = $1 \
             WHERE newsletter_id = $2 AND consumed_at IS NULL",
        )
        .bind(now)
        .bind(newsletter_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

//! # 配信対象の解決
//!
//! ニュースレターの配信対象条件（[`Targeting`]）を実際のメールアドレス一覧に
//! 解決し、抑制リストによるフィルタを提供する。
//!
//! ## 設計方針
//!
//! - **トレイト分離**: 解決と抑制は別の関心事として別トレイトにする
//! - **一括照会**: 抑制リストは受信者ごとではなく一括で照会する
//! - **不正アドレスはスキップ**: 連絡先テーブルに混入した不正アドレスは
//!   警告ログを出して除外し、ファンアウト全体は止めない

use std::collections::HashSet;

use async_trait::async_trait;
use mailflow_domain::{newsletter::Targeting, tenant::TenantId, value_objects::EmailAddress};
use sqlx::PgPool;

use crate::error::InfraError;

/// 配信対象解決トレイト
///
/// テナントの連絡先から、配信対象条件に合致するメールアドレス一覧を返す。
#[async_trait]
pub trait AudienceResolver: Send + Sync {
    /// 配信対象条件をメールアドレス一覧に解決する
    async fn resolve(
        &self,
        tenant_id: &TenantId,
        targeting: &Targeting,
    ) -> Result<Vec<EmailAddress>, InfraError>;
}

/// 抑制リストトレイト
///
/// バウンスや苦情によって配信を止めるべきアドレスの集合を照会する。
#[async_trait]
pub trait SuppressionList: Send + Sync {
    /// 候補のうち抑制対象のアドレスを返す
    async fn suppressed_of(
        &self,
        tenant_id: &TenantId,
        candidates: &[EmailAddress],
    ) -> Result<HashSet<EmailAddress>, InfraError>;
}

/// PostgreSQL 実装の AudienceResolver
///
/// contacts / contact_tags テーブルを照会する。
#[derive(Debug, Clone)]
pub struct PostgresAudienceResolver {
    pool: PgPool,
}

impl PostgresAudienceResolver {
    /// 新しいリゾルバを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn into_addresses(rows: Vec<(String,)>) -> Vec<EmailAddress> {
        rows.into_iter()
            .filter_map(|(raw,)| match EmailAddress::new(raw) {
                Ok(address) => Some(address),
                Err(e) => {
                    tracing::warn!(error = %e, "不正な連絡先アドレスをスキップ");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl AudienceResolver for PostgresAudienceResolver {
    async fn resolve(
        &self,
        tenant_id: &TenantId,
        targeting: &Targeting,
    ) -> Result<Vec<EmailAddress>, InfraError> {
        let rows: Vec<(String,)> = match targeting {
            Targeting::All => {
                sqlx::query_as("SELECT email FROM contacts WHERE tenant_id = $1")
                    .bind(tenant_id.as_uuid())
                    .fetch_all(&self.pool)
                    .await?
            }
            Targeting::Selected { contact_ids } => {
                let ids: Vec<uuid::Uuid> =
                    contact_ids.iter().map(|id| *id.as_uuid()).collect();
                sqlx::query_as(
                    "SELECT email FROM contacts WHERE tenant_id = $1 AND id = ANY($2)",
                )
                .bind(tenant_id.as_uuid())
                .bind(&ids)
                .fetch_all(&self.pool)
                .await?
            }
            Targeting::Tags { tag_ids } => {
                let ids: Vec<uuid::Uuid> = tag_ids.iter().map(|id| *id.as_uuid()).collect();
                sqlx::query_as(
                    "SELECT DISTINCT c.email \
                     FROM contacts c \
                     JOIN contact_tags ct ON ct.contact_id = c.id \
                     WHERE c.tenant_id = $1 AND ct.tag_id = ANY($2)",
                )
                .bind(tenant_id.as_uuid())
                .bind(&ids)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(Self::into_addresses(rows))
    }
}

/// PostgreSQL 実装の SuppressionList
///
/// suppression_entries テーブルを照会する。
#[derive(Debug, Clone)]
pub struct PostgresSuppressionList {
    pool: PgPool,
}

impl PostgresSuppressionList {
    /// 新しい抑制リストを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SuppressionList for PostgresSuppressionList {
    async fn suppressed_of(
        &self,
        tenant_id: &TenantId,
        candidates: &[EmailAddress],
    ) -> Result<HashSet<EmailAddress>, InfraError> {
        if candidates.is_empty() {
            return Ok(HashSet::new());
        }

        let emails: Vec<&str> = candidates.iter().map(EmailAddress::as_str).collect();
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT email FROM suppression_entries \
             WHERE tenant_id = $1 AND email = ANY($2)",
        )
        .bind(tenant_id.as_uuid())
        .bind(&emails)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(raw,)| {
                EmailAddress::new(raw)
                    .map_err(|e| InfraError::unexpected(format!("不正な抑制アドレス: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresAudienceResolver>();
        assert_send_sync::<PostgresSuppressionList>();
        assert_send_sync::<Box<dyn AudienceResolver>>();
        assert_send_sync::<Box<dyn SuppressionList>>();
    }

    #[test]
    fn test_不正な連絡先アドレスはスキップされる() {
        let rows = vec![
            ("alice@example.com".to_string(),),
            ("壊れたアドレス".to_string(),),
            ("bob@example.com".to_string(),),
        ];

        let addresses = PostgresAudienceResolver::into_addresses(rows);
        assert_eq!(addresses.len(), 2);
    }
}

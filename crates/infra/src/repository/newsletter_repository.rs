//! # NewsletterRepository
//!
//! ニュースレターの永続化を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **テナント分離**: すべてのクエリでテナント ID を考慮
//! - **楽観的ロック**: 通常の状態遷移は `update_with_version_check` で保存
//! - **CAS 遷移**: 送信開始の二重実行防止は `transition_status` の
//!   compare-and-swap（`WHERE status = ANY(...)`）で保証する

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailflow_domain::{
    newsletter::{
        Newsletter,
        NewsletterId,
        NewsletterRecord,
        NewsletterStatus,
        ReviewDecision,
        ReviewOutcome,
        Targeting,
    },
    tenant::TenantId,
    user::UserId,
    value_objects::{NewsletterTitle, Subject, Version},
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// ニュースレターリポジトリトレイト
///
/// ニュースレターの永続化操作を定義する。
#[async_trait]
pub trait NewsletterRepository: Send + Sync {
    /// ニュースレターを新規保存
    async fn insert(&self, newsletter: &Newsletter) -> Result<(), InfraError>;

    /// バージョンチェック付きで更新（楽観的ロック）
    ///
    /// DB 上のバージョンが `expected_version` と一致する場合のみ更新する。
    /// 一致しない場合は `InfraError::Conflict` を返す。
    async fn update_with_version_check(
        &self,
        newsletter: &Newsletter,
        expected_version: Version,
    ) -> Result<(), InfraError>;

    /// ステータス CAS 付きで更新
    ///
    /// DB 上のステータスが `expected` のいずれかである場合のみ行全体を更新する。
    /// CAS が外れた場合は `Ok(false)` を返す（エラーにしない）。
    /// 送信開始の二重実行防止に使用する。
    async fn transition_status(
        &self,
        newsletter: &Newsletter,
        expected: &[NewsletterStatus],
    ) -> Result<bool, InfraError>;

    /// ID でニュースレターを取得
    async fn find_by_id(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
    ) -> Result<Option<Newsletter>, InfraError>;

    /// テナント内のニュースレター一覧を取得（作成日時降順）
    async fn find_by_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Newsletter>, InfraError>;

    /// 送信予定時刻を過ぎた予約済みニュースレターを取得
    ///
    /// スケジューラが定期的に呼び出す。テナント横断で検索する。
    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Newsletter>, InfraError>;
}

/// PostgreSQL 実装の NewsletterRepository
#[derive(Debug, Clone)]
pub struct PostgresNewsletterRepository {
    pool: PgPool,
}

impl PostgresNewsletterRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// newsletters テーブルの行
#[derive(sqlx::FromRow)]
struct NewsletterRow {
    id:                 Uuid,
    tenant_id:          Uuid,
    title:              String,
    subject:            String,
    content:            String,
    targeting:          serde_json::Value,
    status:             String,
    version:            i32,
    created_by:         Uuid,
    review_decision:    Option<String>,
    review_reviewer_id: Option<Uuid>,
    review_notes:       Option<String>,
    review_decided_at:  Option<DateTime<Utc>>,
    reviewer_id:        Option<Uuid>,
    submitted_at:       Option<DateTime<Utc>>,
    scheduled_at:       Option<DateTime<Utc>>,
    started_at:         Option<DateTime<Utc>>,
    sent_at:            Option<DateTime<Utc>>,
    created_at:         DateTime<Utc>,
    updated_at:         DateTime<Utc>,
}

impl NewsletterRow {
    /// 行をドメインエンティティに復元する
    ///
    /// DB に不正な値が混入していた場合は `InfraError::Unexpected` を返す。
    fn into_domain(self) -> Result<Newsletter, InfraError> {
        let targeting: Targeting = serde_json::from_value(self.targeting)?;

        let review = match (self.review_decision, self.review_reviewer_id) {
            (Some(decision), Some(reviewer_id)) => Some(ReviewOutcome {
                decision:    decision.parse::<ReviewDecision>().map_err(|_| {
                    InfraError::unexpected(format!("不正なレビュー裁定: {decision}"))
                })?,
                reviewer_id: UserId::from_uuid(reviewer_id),
                notes:       self.review_notes,
                decided_at:  self.review_decided_at.ok_or_else(|| {
                    InfraError::unexpected("レビュー裁定日時が欠落しています".to_string())
                })?,
            }),
            (None, None) => None,
            _ => {
                return Err(InfraError::unexpected(
                    "レビュー結果のカラムが部分的に欠落しています".to_string(),
                ));
            }
        };

        let record = NewsletterRecord {
            id: NewsletterId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            title: NewsletterTitle::new(self.title)
                .map_err(|e| InfraError::unexpected(format!("不正なタイトル: {e}")))?,
            subject: Subject::new(self.subject)
                .map_err(|e| InfraError::unexpected(format!("不正な件名: {e}")))?,
            content: self.content,
            targeting,
            status: self
                .status
                .parse::<NewsletterStatus>()
                .map_err(|e| InfraError::unexpected(format!("{e}")))?,
            version: Version::try_from(self.version)
                .map_err(|e| InfraError::unexpected(format!("{e}")))?,
            created_by: UserId::from_uuid(self.created_by),
            review,
            reviewer_id: self.reviewer_id.map(UserId::from_uuid),
            submitted_at: self.submitted_at,
            scheduled_at: self.scheduled_at,
            started_at: self.started_at,
            sent_at: self.sent_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        Newsletter::from_db(record).map_err(|e| InfraError::unexpected(format!("{e}")))
    }
}

const SELECT_COLUMNS: &str = r#"
    id, tenant_id, title, subject, content, targeting, status, version,
    created_by, review_decision, review_reviewer_id, review_notes,
    review_decided_at, reviewer_id, submitted_at, scheduled_at,
    started_at, sent_at, created_at, updated_at
"#;

/// UPDATE 文で使う共通の SET 句を組み立てるためのバインド
///
/// INSERT/UPDATE のバインド順はすべてこの関数の順序に従う。
fn bind_entity<'q, O>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    newsletter: &'q Newsletter,
    targeting_json: serde_json::Value,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    let review = newsletter.review();
    query
        .bind(newsletter.title().as_str())
        .bind(newsletter.subject().as_str())
        .bind(newsletter.content())
        .bind(targeting_json)
        .bind(<&'static str>::from(newsletter.status()))
        .bind(newsletter.version().as_i32())
        .bind(review.map(|r| <&'static str>::from(r.decision)))
        .bind(review.map(|r| r.reviewer_id.as_uuid()))
        .bind(review.and_then(|r| r.notes.as_deref()))
        .bind(review.map(|r| r.decided_at))
        .bind(newsletter.reviewer_id().map(UserId::as_uuid))
        .bind(newsletter.submitted_at())
        .bind(newsletter.scheduled_at())
        .bind(newsletter.started_at())
        .bind(newsletter.sent_at())
        .bind(newsletter.updated_at())
}

#[async_trait]
impl NewsletterRepository for PostgresNewsletterRepository {
    async fn insert(&self, newsletter: &Newsletter) -> Result<(), InfraError> {
        let targeting_json = serde_json::to_value(newsletter.targeting())?;
        let review = newsletter.review();

        sqlx::query(
            r#"
            INSERT INTO newsletters (
                id, tenant_id, title, subject, content, targeting, status, version,
                created_by, review_decision, review_reviewer_id, review_notes,
                review_decided_at, reviewer_id, submitted_at, scheduled_at,
                started_at, sent_at, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            "#,
        )
        .bind(newsletter.id().as_uuid())
        .bind(newsletter.tenant_id().as_uuid())
        .bind(newsletter.title().as_str())
        .bind(newsletter.subject().as_str())
        .bind(newsletter.content())
        .bind(targeting_json)
        .bind(<&'static str>::from(newsletter.status()))
        .bind(newsletter.version().as_i32())
        .bind(newsletter.created_by().as_uuid())
        .bind(review.map(|r| <&'static str>::from(r.decision)))
        .bind(review.map(|r| r.reviewer_id.as_uuid()))
        .bind(review.and_then(|r| r.notes.as_deref()))
        .bind(review.map(|r| r.decided_at))
        .bind(newsletter.reviewer_id().map(UserId::as_uuid))
        .bind(newsletter.submitted_at())
        .bind(newsletter.scheduled_at())
        .bind(newsletter.started_at())
        .bind(newsletter.sent_at())
        .bind(newsletter.created_at())
        .bind(newsletter.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_with_version_check(
        &self,
        newsletter: &Newsletter,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let targeting_json = serde_json::to_value(newsletter.targeting())?;

        let result = bind_entity(
            sqlx::query_as::<_, (Uuid,)>(
                r#"
                UPDATE newsletters SET
                    title = $1, subject = $2, content = $3, targeting = $4,
                    status = $5, version = $6,
                    review_decision = $7, review_reviewer_id = $8,
                    review_notes = $9, review_decided_at = $10,
                    reviewer_id = $11, submitted_at = $12, scheduled_at = $13,
                    started_at = $14, sent_at = $15, updated_at = $16
                WHERE id = $17 AND tenant_id = $18 AND version = $19
                RETURNING id
                "#,
            ),
            newsletter,
            targeting_json,
        )
        .bind(newsletter.id().as_uuid())
        .bind(newsletter.tenant_id().as_uuid())
        .bind(expected_version.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        if result.is_none() {
            return Err(InfraError::conflict(
                "Newsletter",
                newsletter.id().as_uuid().to_string(),
            ));
        }
        Ok(())
    }

    async fn transition_status(
        &self,
        newsletter: &Newsletter,
        expected: &[NewsletterStatus],
    ) -> Result<bool, InfraError> {
        let targeting_json = serde_json::to_value(newsletter.targeting())?;
        let expected: Vec<&'static str> =
            expected.iter().map(|s| <&'static str>::from(*s)).collect();

        let result = bind_entity(
            sqlx::query_as::<_, (Uuid,)>(
                r#"
                UPDATE newsletters SET
                    title = $1, subject = $2, content = $3, targeting = $4,
                    status = $5, version = $6,
                    review_decision = $7, review_reviewer_id = $8,
                    review_notes = $9, review_decided_at = $10,
                    reviewer_id = $11, submitted_at = $12, scheduled_at = $13,
                    started_at = $14, sent_at = $15, updated_at = $16
                WHERE id = $17 AND tenant_id = $18 AND status = ANY($19)
                RETURNING id
                "#,
            ),
            newsletter,
            targeting_json,
        )
        .bind(newsletter.id().as_uuid())
        .bind(newsletter.tenant_id().as_uuid())
        .bind(&expected)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result.is_some())
    }

    async fn find_by_id(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
    ) -> Result<Option<Newsletter>, InfraError> {
        let row = sqlx::query_as::<_, NewsletterRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM newsletters WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(NewsletterRow::into_domain).transpose()
    }

    async fn find_by_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Newsletter>, InfraError> {
        let rows = sqlx::query_as::<_, NewsletterRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM newsletters WHERE tenant_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NewsletterRow::into_domain).collect()
    }

    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Newsletter>, InfraError> {
        let rows = sqlx::query_as::<_, NewsletterRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM newsletters \
             WHERE status = 'scheduled' AND scheduled_at <= $1 \
             ORDER BY scheduled_at"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NewsletterRow::into_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresNewsletterRepository>();
        assert_send_sync::<Box<dyn NewsletterRepository>>();
    }
}

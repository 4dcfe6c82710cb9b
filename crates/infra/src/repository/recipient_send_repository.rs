//! # RecipientSendRepository
//!
//! 受信者ごとの配信記録の永続化を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **一括挿入**: ファンアウト開始時に `queued` 行をまとめて挿入する
//! - **Webhook 逆引き**: プロバイダのメッセージ ID から配信記録を特定する
//! - **集計は読み取り時**: 配信統計は保存せず、SQL 集約で都度導出する
//! - **カーソルページング**: UUID v7 の時系列順を利用したキーセット方式

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailflow_domain::{
    newsletter::NewsletterId,
    recipient_send::{RecipientSend, RecipientSendId, RecipientSendRecord, RecipientSendStatus},
    value_objects::EmailAddress,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// 配信統計の集約結果
///
/// `recipient_count` は配信に成功した受信者数（Failed 以外）。
/// ユニーク開封は `opens > 0` の行数、総開封は `SUM(opens)`。クリックも同様。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregateStats {
    pub recipient_count: i64,
    pub delivered:       i64,
    pub unique_opens:    i64,
    pub total_opens:     i64,
    pub unique_clicks:   i64,
    pub total_clicks:    i64,
    pub bounced:         i64,
    pub complained:      i64,
    pub suppressed:      i64,
    pub failed:          i64,
}

/// 配信記録のページ
#[derive(Debug)]
pub struct RecipientSendPage {
    pub items:       Vec<RecipientSend>,
    pub next_cursor: Option<String>,
}

/// 受信者配信記録リポジトリトレイト
#[async_trait]
pub trait RecipientSendRepository: Send + Sync {
    /// 配信記録をまとめて挿入する
    async fn insert_batch(&self, sends: &[RecipientSend]) -> Result<(), InfraError>;

    /// 配信記録を保存（更新）
    async fn save(&self, send: &RecipientSend) -> Result<(), InfraError>;

    /// ID で配信記録を取得
    async fn find_by_id(&self, id: &RecipientSendId)
    -> Result<Option<RecipientSend>, InfraError>;

    /// プロバイダのメッセージ ID から配信記録を取得
    ///
    /// Webhook のイベント取り込みで使用する。
    async fn find_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<RecipientSend>, InfraError>;

    /// ニュースレターの配信記録をカーソルページングで取得（ID 昇順）
    async fn list_by_newsletter(
        &self,
        newsletter_id: &NewsletterId,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<RecipientSendPage, InfraError>;

    /// ニュースレターの配信統計を集約する
    async fn aggregate_stats(
        &self,
        newsletter_id: &NewsletterId,
    ) -> Result<AggregateStats, InfraError>;
}

/// PostgreSQL 実装の RecipientSendRepository
#[derive(Debug, Clone)]
pub struct PostgresRecipientSendRepository {
    pool: PgPool,
}

impl PostgresRecipientSendRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RecipientSendRow {
    id:                  Uuid,
    newsletter_id:       Uuid,
    recipient:           String,
    provider_message_id: Option<String>,
    status:              String,
    opens:               i32,
    clicks:              i32,
    last_activity_at:    Option<DateTime<Utc>>,
    created_at:          DateTime<Utc>,
    updated_at:          DateTime<Utc>,
}

impl RecipientSendRow {
    fn into_domain(self) -> Result<RecipientSend, InfraError> {
        let opens = u32::try_from(self.opens)
            .map_err(|_| InfraError::unexpected(format!("不正な開封数: {}", self.opens)))?;
        let clicks = u32::try_from(self.clicks)
            .map_err(|_| InfraError::unexpected(format!("不正なクリック数: {}", self.clicks)))?;

        Ok(RecipientSend::from_db(RecipientSendRecord {
            id: RecipientSendId::from_uuid(self.id),
            newsletter_id: NewsletterId::from_uuid(self.newsletter_id),
            recipient: EmailAddress::new(self.recipient)
                .map_err(|e| InfraError::unexpected(format!("{e}")))?,
            provider_message_id: self.provider_message_id,
            status: self
                .status
                .parse::<RecipientSendStatus>()
                .map_err(|_| InfraError::unexpected(format!("不正な配信状態: {}", self.status)))?,
            opens,
            clicks,
            last_activity_at: self.last_activity_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }))
    }
}

const SELECT_COLUMNS: &str = "id, newsletter_id, recipient, provider_message_id, status, \
                              opens, clicks, last_activity_at, created_at, updated_at";

#[async_trait]
impl RecipientSendRepository for PostgresRecipientSendRepository {
    async fn insert_batch(&self, sends: &[RecipientSend]) -> Result<(), InfraError> {
        if sends.is_empty() {
            return Ok(());
        }

        // UNNEST による一括挿入。1 行ずつの INSERT より往復回数を抑える。
        let ids: Vec<Uuid> = sends.iter().map(|s| *s.id().as_uuid()).collect();
        let newsletter_ids: Vec<Uuid> =
            sends.iter().map(|s| *s.newsletter_id().as_uuid()).collect();
        let recipients: Vec<String> =
            sends.iter().map(|s| s.recipient().as_str().to_string()).collect();
        let statuses: Vec<&'static str> =
            sends.iter().map(|s| <&'static str>::from(s.status())).collect();
        let created_ats: Vec<DateTime<Utc>> = sends.iter().map(RecipientSend::created_at).collect();
        let updated_ats: Vec<DateTime<Utc>> = sends.iter().map(RecipientSend::updated_at).collect();

        sqlx::query(
            r#"
            INSERT INTO recipient_sends (
                id, newsletter_id, recipient, status, opens, clicks,
                created_at, updated_at
            )
            SELECT id, newsletter_id, recipient, status, 0, 0, created_at, updated_at
            FROM UNNEST(
                $1::uuid[], $2::uuid[], $3::text[], $4::text[],
                $5::timestamptz[], $6::timestamptz[]
            ) AS t(id, newsletter_id, recipient, status, created_at, updated_at)
            "#,
        )
        .bind(&ids)
        .bind(&newsletter_ids)
        .bind(&recipients)
        .bind(&statuses)
        .bind(&created_ats)
        .bind(&updated_ats)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, send: &RecipientSend) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            UPDATE recipient_sends SET
                provider_message_id = $1, status = $2, opens = $3, clicks = $4,
                last_activity_at = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(send.provider_message_id())
        .bind(<&'static str>::from(send.status()))
        .bind(i32::try_from(send.opens()).unwrap_or(i32::MAX))
        .bind(i32::try_from(send.clicks()).unwrap_or(i32::MAX))
        .bind(send.last_activity_at())
        .bind(send.updated_at())
        .bind(send.id().as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RecipientSendId,
    ) -> Result<Option<RecipientSend>, InfraError> {
        let row = sqlx::query_as::<_, RecipientSendRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM recipient_sends WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RecipientSendRow::into_domain).transpose()
    }

    async fn find_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<RecipientSend>, InfraError> {
        let row = sqlx::query_as::<_, RecipientSendRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM recipient_sends WHERE provider_message_id = $1"
        ))
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RecipientSendRow::into_domain).transpose()
    }

    async fn list_by_newsletter(
        &self,
        newsletter_id: &NewsletterId,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<RecipientSendPage, InfraError> {
        // カーソルは前ページ最終行の ID。UUID v7 なので ID 順 = 挿入順。
        let after: Option<Uuid> = cursor
            .map(|c| {
                Uuid::parse_str(c)
                    .map_err(|_| InfraError::invalid_input(format!("不正なカーソル: {c}")))
            })
            .transpose()?;

        let rows = sqlx::query_as::<_, RecipientSendRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM recipient_sends \
             WHERE newsletter_id = $1 AND ($2::uuid IS NULL OR id > $2) \
             ORDER BY id \
             LIMIT $3"
        ))
        .bind(newsletter_id.as_uuid())
        .bind(after)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() as i64 > limit;
        let mut items: Vec<RecipientSend> = rows
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(RecipientSendRow::into_domain)
            .collect::<Result<_, _>>()?;
        items.shrink_to_fit();

        let next_cursor = if has_more {
            items.last().map(|s| s.id().as_uuid().to_string())
        } else {
            None
        };

        Ok(RecipientSendPage { items, next_cursor })
    }

    async fn aggregate_stats(
        &self,
        newsletter_id: &NewsletterId,
    ) -> Result<AggregateStats, InfraError> {
        let row: (i64, i64, i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status <> 'failed')      AS recipient_count,
                COUNT(*) FILTER (WHERE status = 'delivered')    AS delivered,
                COUNT(*) FILTER (WHERE opens > 0)               AS unique_opens,
                COALESCE(SUM(opens), 0)::bigint                 AS total_opens,
                COUNT(*) FILTER (WHERE clicks > 0)              AS unique_clicks,
                COALESCE(SUM(clicks), 0)::bigint                AS total_clicks,
                COUNT(*) FILTER (WHERE status = 'bounced')      AS bounced,
                COUNT(*) FILTER (WHERE status = 'complained')   AS complained,
                COUNT(*) FILTER (WHERE status = 'suppressed')   AS suppressed,
                COUNT(*) FILTER (WHERE status = 'failed')       AS failed
            FROM recipient_sends
            WHERE newsletter_id = $1
            "#,
        )
        .bind(newsletter_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(AggregateStats {
            recipient_count: row.0,
            delivered:       row.1,
            unique_opens:    row.2,
            total_opens:     row.3,
            unique_clicks:   row.4,
            total_clicks:    row.5,
            bounced:         row.6,
            complained:      row.7,
            suppressed:      row.8,
            failed:          row.9,
        })
    }
}

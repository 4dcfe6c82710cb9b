//! # EngagementEventRepository
//!
//! エンゲージメントイベントの監査ログを担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **追記専用**: イベントは更新も削除もしない
//! - **重複検出**: 同一（配信記録, 種別, 発生時刻）のイベントを重複とみなす
//! - **時系列取得**: タイムライン表示のため発生時刻昇順で返す

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailflow_domain::{
    engagement::{EngagementEvent, EngagementEventId, EngagementEventType},
    recipient_send::RecipientSendId,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// エンゲージメントイベントリポジトリトレイト
#[async_trait]
pub trait EngagementEventRepository: Send + Sync {
    /// イベントを追記する
    async fn append(&self, event: &EngagementEvent) -> Result<(), InfraError>;

    /// 同一イベントが既に記録されているかを返す
    ///
    /// Webhook の再送を冪等に処理するための重複プローブ。
    async fn exists(
        &self,
        recipient_send_id: &RecipientSendId,
        event_type: EngagementEventType,
        occurred_at: DateTime<Utc>,
    ) -> Result<bool, InfraError>;

    /// 配信記録のイベントを発生時刻昇順で取得
    async fn list_by_recipient_send(
        &self,
        recipient_send_id: &RecipientSendId,
    ) -> Result<Vec<EngagementEvent>, InfraError>;
}

/// PostgreSQL 実装の EngagementEventRepository
#[derive(Debug, Clone)]
pub struct PostgresEngagementEventRepository {
    pool: PgPool,
}

impl PostgresEngagementEventRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EngagementEventRow {
    id:                Uuid,
    recipient_send_id: Uuid,
    event_type:        String,
    occurred_at:       DateTime<Utc>,
    metadata:          serde_json::Value,
}

impl EngagementEventRow {
    fn into_domain(self) -> Result<EngagementEvent, InfraError> {
        let event_type = self.event_type.parse::<EngagementEventType>().map_err(|_| {
            InfraError::unexpected(format!("不正なイベント種別: {}", self.event_type))
        })?;

        Ok(EngagementEvent::new(
            EngagementEventId::from_uuid(self.id),
            RecipientSendId::from_uuid(self.recipient_send_id),
            event_type,
            self.occurred_at,
            self.metadata,
        ))
    }
}

#[async_trait]
impl EngagementEventRepository for PostgresEngagementEventRepository {
    async fn append(&self, event: &EngagementEvent) -> Result<(), InfraError> {
        sqlx::query(
            "INSERT INTO engagement_events \
             (id, recipient_send_id, event_type, occurred_at, metadata) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.id().as_uuid())
        .bind(event.recipient_send_id().as_uuid())
        .bind(<&'static str>::from(event.event_type()))
        .bind(event.occurred_at())
        .bind(event.metadata())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            // （配信記録, 種別, 発生時刻）のユニークインデックス違反は、
            // 同一 Webhook の並行再送で発生する。Conflict として返し、
            // 呼び出し側が重複として冪等に処理できるようにする。
            sqlx::Error::Database(db) if db.is_unique_violation() => InfraError::conflict(
                "EngagementEvent",
                event.recipient_send_id().as_uuid().to_string(),
            ),
            _ => InfraError::from(e),
        })?;
        Ok(())
    }

    async fn exists(
        &self,
        recipient_send_id: &RecipientSendId,
        event_type: EngagementEventType,
        occurred_at: DateTime<Utc>,
    ) -> Result<bool, InfraError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS( \
                 SELECT 1 FROM engagement_events \
                 WHERE recipient_send_id = $1 AND event_type = $2 AND occurred_at = $3 \
             )",
        )
        .bind(recipient_send_id.as_uuid())
        .bind(<&'static str>::from(event_type))
        .bind(occurred_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn list_by_recipient_send(
        &self,
        recipient_send_id: &RecipientSendId,
    ) -> Result<Vec<EngagementEvent>, InfraError> {
        let rows = sqlx::query_as::<_, EngagementEventRow>(
            "SELECT id, recipient_send_id, event_type, occurred_at, metadata \
             FROM engagement_events \
             WHERE recipient_send_id = $1 \
             ORDER BY occurred_at, id",
        )
        .bind(recipient_send_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(EngagementEventRow::into_domain)
            .collect()
    }
}

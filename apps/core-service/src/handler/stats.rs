//! # 配信統計ハンドラ
//!
//! UI のポーリングが参照する読み取り専用 API。
//!
//! ## エンドポイント
//!
//! - `GET /internal/newsletters/{id}/task-status` - 三段階タスク状況
//! - `GET /internal/newsletters/{id}/stats` - 集約統計
//! - `GET /internal/newsletters/{id}/recipients` - 受信者別配信記録（ページング）
//! - `GET /internal/newsletters/{id}/recipients/{recipient_send_id}/timeline` - イベントタイムライン

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use mailflow_domain::{
    newsletter::NewsletterId,
    recipient_send::{RecipientSend, RecipientSendId},
    tenant::TenantId,
};
use mailflow_shared::{ApiResponse, PaginatedResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::CoreError, usecase::StatsUseCaseImpl};

/// 一覧取得の既定ページサイズ
const DEFAULT_PAGE_SIZE: i64 = 50;

/// 配信統計 API の共有状態
pub struct StatsState {
    pub usecase: StatsUseCaseImpl,
}

// --- リクエスト/レスポンス型 ---

/// テナント ID クエリパラメータ
#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

/// 受信者一覧クエリパラメータ
#[derive(Debug, Deserialize)]
pub struct ListRecipientsQuery {
    pub tenant_id: Uuid,
    pub cursor:    Option<String>,
    pub limit:     Option<i64>,
}

/// 集約統計レスポンス DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct NewsletterStatsDto {
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

/// 受信者別配信記録 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct RecipientSendDto {
    pub id: Uuid,
    pub recipient: String,
    pub status: String,
    pub opens: u32,
    pub clicks: u32,
    pub last_activity_at: Option<String>,
}

impl RecipientSendDto {
    fn from_entity(send: &RecipientSend) -> Self {
        Self {
            id: *send.id().as_uuid(),
            recipient: send.recipient().as_str().to_string(),
            status: send.status().to_string(),
            opens: send.opens(),
            clicks: send.clicks(),
            last_activity_at: send.last_activity_at().map(|at| at.to_rfc3339()),
        }
    }
}

// --- ハンドラ ---

/// GET /internal/newsletters/{id}/task-status
///
/// `status` と `sent_at` と現在時刻から純粋に導出する。読み取りが
/// 書き込みを引き起こすことはない。
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn get_task_status(
    State(state): State<Arc<StatsState>>,
    Path(newsletter_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let status = state
        .usecase
        .get_task_status(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(query.tenant_id),
        )
        .await?;

    Ok((StatusCode::OK, Json(ApiResponse::new(status))))
}

/// GET /internal/newsletters/{id}/stats
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn get_newsletter_stats(
    State(state): State<Arc<StatsState>>,
    Path(newsletter_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let stats = state
        .usecase
        .get_aggregate_stats(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(query.tenant_id),
        )
        .await?;

    let dto = NewsletterStatsDto {
        recipient_count: stats.recipient_count,
        delivered:       stats.delivered,
        unique_opens:    stats.unique_opens,
        total_opens:     stats.total_opens,
        unique_clicks:   stats.unique_clicks,
        total_clicks:    stats.total_clicks,
        bounced:         stats.bounced,
        complained:      stats.complained,
        suppressed:      stats.suppressed,
        failed:          stats.failed,
    };
    Ok((StatusCode::OK, Json(ApiResponse::new(dto))))
}

/// GET /internal/newsletters/{id}/recipients
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn list_recipients(
    State(state): State<Arc<StatsState>>,
    Path(newsletter_id): Path<Uuid>,
    Query(query): Query<ListRecipientsQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 200);
    let page = state
        .usecase
        .get_detailed_stats(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(query.tenant_id),
            query.cursor.as_deref(),
            limit,
        )
        .await?;

    let response = PaginatedResponse {
        data:        page.items.iter().map(RecipientSendDto::from_entity).collect(),
        next_cursor: page.next_cursor,
    };
    Ok((StatusCode::OK, Json(response)))
}

/// GET /internal/newsletters/{id}/recipients/{recipient_send_id}/timeline
///
/// 先頭はニュースレターの `sent_at` から導出した合成 `sent` エントリ。
#[tracing::instrument(skip_all, fields(%newsletter_id, %recipient_send_id))]
pub async fn get_recipient_timeline(
    State(state): State<Arc<StatsState>>,
    Path((newsletter_id, recipient_send_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<TenantQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let timeline = state
        .usecase
        .get_recipient_timeline(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(query.tenant_id),
            &RecipientSendId::from_uuid(recipient_send_id),
        )
        .await?;

    Ok((StatusCode::OK, Json(ApiResponse::new(timeline))))
}

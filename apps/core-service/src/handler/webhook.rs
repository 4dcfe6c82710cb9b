//! # エンゲージメント Webhook ハンドラ
//!
//! 配信プロバイダからのイベントコールバックを受け付ける。
//!
//! ## エンドポイント
//!
//! - `POST /webhooks/engagement`
//!
//! ## 冪等性
//!
//! 同一イベントの再送・未知のメッセージ ID はどちらも `200 OK` で応答し、
//! プロバイダの再送ループを防ぐ。ストレージ障害のみ 5xx を返して再送させる。

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use mailflow_domain::engagement::EngagementEventType;
use mailflow_shared::ApiResponse;
use serde::{Deserialize, Serialize};

use crate::{
    error::CoreError,
    usecase::{EngagementUseCaseImpl, IngestOutcome, ProviderEvent},
};

/// Webhook API の共有状態
pub struct WebhookState {
    pub usecase: EngagementUseCaseImpl,
}

/// プロバイダからのイベント通知
#[derive(Debug, Deserialize)]
pub struct EngagementWebhookRequest {
    pub provider_message_id: String,
    pub event_type:          EngagementEventType,
    pub occurred_at:         DateTime<Utc>,
    #[serde(default)]
    pub metadata:            serde_json::Value,
}

/// 取り込み結果レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResultDto {
    pub outcome: String,
}

/// POST /webhooks/engagement
///
/// ## レスポンス
///
/// - `200 OK`: `applied` / `duplicate` / `unknown_message` のいずれか
/// - `500 Internal Server Error`: ストレージ障害（プロバイダが再送する）
#[tracing::instrument(skip_all)]
pub async fn ingest_engagement_event(
    State(state): State<Arc<WebhookState>>,
    Json(req): Json<EngagementWebhookRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let outcome = state
        .usecase
        .ingest(ProviderEvent {
            provider_message_id: req.provider_message_id,
            event_type:          req.event_type,
            occurred_at:         req.occurred_at,
            metadata:            req.metadata,
        })
        .await?;

    let dto = IngestResultDto {
        outcome: match outcome {
            IngestOutcome::Applied => "applied",
            IngestOutcome::Duplicate => "duplicate",
            IngestOutcome::UnknownMessage => "unknown_message",
        }
        .to_string(),
    };
    Ok((StatusCode::OK, Json(ApiResponse::new(dto))))
}

//! # ニュースレターハンドラ
//!
//! ニュースレターのライフサイクル操作を提供する内部 API。
//!
//! ## エンドポイント
//!
//! - `POST /internal/newsletters` - 作成
//! - `PUT /internal/newsletters/{id}` - 下書き編集
//! - `GET /internal/newsletters/{id}` - 取得
//! - `GET /internal/newsletters` - 一覧取得
//! - `POST /internal/newsletters/{id}/submit-for-review` - レビュー申請
//! - `POST /internal/newsletters/{id}/approve` - 承認
//! - `POST /internal/newsletters/{id}/approve-and-send` - 承認して送信
//! - `POST /internal/newsletters/{id}/reject` - 却下
//! - `POST /internal/newsletters/{id}/send` - 送信
//! - `POST /internal/newsletters/{id}/schedule` - 送信予約

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use mailflow_domain::{
    newsletter::{Newsletter, NewsletterId, Targeting},
    tenant::TenantId,
    user::UserId,
};
use mailflow_shared::ApiResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::CoreError,
    usecase::{
        CreateNewsletterInput,
        EditNewsletterInput,
        NewsletterUseCaseImpl,
        ReviewInput,
        SendReport,
    },
};

/// ニュースレター API の共有状態
///
/// ユースケースは予約配信スケジューラとも共有するため `Arc` で持つ。
pub struct NewsletterState {
    pub usecase: Arc<NewsletterUseCaseImpl>,
}

// --- リクエスト/レスポンス型 ---

/// 作成リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateNewsletterRequest {
    pub tenant_id:  Uuid,
    pub created_by: Uuid,
    pub title:      String,
    pub subject:    String,
    pub content:    String,
    pub targeting:  Targeting,
}

/// 編集リクエスト
#[derive(Debug, Deserialize)]
pub struct UpdateNewsletterRequest {
    pub tenant_id: Uuid,
    pub version:   u32,
    pub title:     String,
    pub subject:   String,
    pub content:   String,
    pub targeting: Targeting,
}

/// レビュー申請リクエスト
#[derive(Debug, Deserialize)]
pub struct SubmitForReviewRequest {
    pub tenant_id: Uuid,
}

/// 承認リクエスト
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub tenant_id: Uuid,
    pub user_id:   Uuid,
    pub code:      String,
    pub notes:     Option<String>,
}

/// 却下リクエスト
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub tenant_id: Uuid,
    pub user_id:   Uuid,
    pub notes:     String,
}

/// 送信リクエスト
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub tenant_id: Uuid,
}

/// 送信予約リクエスト
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub tenant_id:    Uuid,
    pub scheduled_at: DateTime<Utc>,
}

/// テナント ID クエリパラメータ
#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

/// レビュー結果 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewOutcomeDto {
    pub decision:    String,
    pub reviewer_id: Uuid,
    pub notes:       Option<String>,
    pub decided_at:  String,
}

/// ニュースレター詳細レスポンス DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct NewsletterDto {
    pub id:           Uuid,
    pub tenant_id:    Uuid,
    pub title:        String,
    pub subject:      String,
    pub content:      String,
    pub targeting:    Targeting,
    pub status:       String,
    pub version:      u32,
    pub created_by:   Uuid,
    pub reviewer_id:  Option<Uuid>,
    pub review:       Option<ReviewOutcomeDto>,
    pub scheduled_at: Option<String>,
    pub sent_at:      Option<String>,
    pub created_at:   String,
    pub updated_at:   String,
}

impl NewsletterDto {
    fn from_entity(newsletter: &Newsletter) -> Self {
        Self {
            id:           *newsletter.id().as_uuid(),
            tenant_id:    *newsletter.tenant_id().as_uuid(),
            title:        newsletter.title().as_str().to_string(),
            subject:      newsletter.subject().as_str().to_string(),
            content:      newsletter.content().to_string(),
            targeting:    newsletter.targeting().clone(),
            status:       newsletter.status().to_string(),
            version:      newsletter.version().as_u32(),
            created_by:   *newsletter.created_by().as_uuid(),
            reviewer_id:  newsletter.reviewer_id().map(|id| *id.as_uuid()),
            review:       newsletter.review().map(|review| ReviewOutcomeDto {
                decision:    review.decision.to_string(),
                reviewer_id: *review.reviewer_id.as_uuid(),
                notes:       review.notes.clone(),
                decided_at:  review.decided_at.to_rfc3339(),
            }),
            scheduled_at: newsletter.scheduled_at().map(|at| at.to_rfc3339()),
            sent_at:      newsletter.sent_at().map(|at| at.to_rfc3339()),
            created_at:   newsletter.created_at().to_rfc3339(),
            updated_at:   newsletter.updated_at().to_rfc3339(),
        }
    }
}

/// 送信結果レスポンス DTO
///
/// `failed` は部分失敗の件数。HTTP エラーにはならず本文で返す。
#[derive(Debug, Serialize, Deserialize)]
pub struct SendReportDto {
    pub newsletter: NewsletterDto,
    pub successful: usize,
    pub failed:     usize,
    pub candidates: usize,
}

impl SendReportDto {
    fn from_report(report: &SendReport) -> Self {
        Self {
            newsletter: NewsletterDto::from_entity(&report.newsletter),
            successful: report.successful,
            failed:     report.failed,
            candidates: report.candidates,
        }
    }
}

// --- ハンドラ ---

/// POST /internal/newsletters
///
/// ## レスポンス
///
/// - `201 Created`: 作成された下書き
/// - `400 Bad Request`: バリデーションエラー
#[tracing::instrument(skip_all)]
pub async fn create_newsletter(
    State(state): State<Arc<NewsletterState>>,
    Json(req): Json<CreateNewsletterRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let newsletter = state
        .usecase
        .create_newsletter(CreateNewsletterInput {
            tenant_id:  TenantId::from_uuid(req.tenant_id),
            created_by: UserId::from_uuid(req.created_by),
            title:      req.title,
            subject:    req.subject,
            content:    req.content,
            targeting:  req.targeting,
        })
        .await?;

    let response = ApiResponse::new(NewsletterDto::from_entity(&newsletter));
    Ok((StatusCode::CREATED, Json(response)))
}

/// PUT /internal/newsletters/{id}
///
/// ## レスポンス
///
/// - `200 OK`: 更新後の下書き
/// - `404 Not Found`: ニュースレターが見つからない
/// - `409 Conflict`: 下書き以外の編集、またはバージョン競合
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn update_newsletter(
    State(state): State<Arc<NewsletterState>>,
    Path(newsletter_id): Path<Uuid>,
    Json(req): Json<UpdateNewsletterRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let newsletter = state
        .usecase
        .edit_newsletter(EditNewsletterInput {
            tenant_id: TenantId::from_uuid(req.tenant_id),
            id:        NewsletterId::from_uuid(newsletter_id),
            version:   req.version,
            title:     req.title,
            subject:   req.subject,
            content:   req.content,
            targeting: req.targeting,
        })
        .await?;

    let response = ApiResponse::new(NewsletterDto::from_entity(&newsletter));
    Ok((StatusCode::OK, Json(response)))
}

/// GET /internal/newsletters/{id}
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn get_newsletter(
    State(state): State<Arc<NewsletterState>>,
    Path(newsletter_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let newsletter = state
        .usecase
        .get_newsletter(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(query.tenant_id),
        )
        .await?;

    let response = ApiResponse::new(NewsletterDto::from_entity(&newsletter));
    Ok((StatusCode::OK, Json(response)))
}

/// GET /internal/newsletters
#[tracing::instrument(skip_all)]
pub async fn list_newsletters(
    State(state): State<Arc<NewsletterState>>,
    Query(query): Query<TenantQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let newsletters = state
        .usecase
        .list_newsletters(&TenantId::from_uuid(query.tenant_id))
        .await?;

    let dtos: Vec<NewsletterDto> = newsletters.iter().map(NewsletterDto::from_entity).collect();
    let response = ApiResponse::new(dtos);
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/newsletters/{id}/submit-for-review
///
/// ## レスポンス
///
/// - `200 OK`: レビュー待ちになったニュースレター
/// - `409 Conflict`: 下書き・送信可能以外からの申請
/// - `422 Unprocessable Entity`: レビュー設定の不備
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn submit_newsletter_for_review(
    State(state): State<Arc<NewsletterState>>,
    Path(newsletter_id): Path<Uuid>,
    Json(req): Json<SubmitForReviewRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let newsletter = state
        .usecase
        .submit_for_review(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(req.tenant_id),
        )
        .await?;

    let response = ApiResponse::new(NewsletterDto::from_entity(&newsletter));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/newsletters/{id}/approve
///
/// ## レスポンス
///
/// - `200 OK`: 送信可能になったニュースレター
/// - `400 Bad Request`: 承認コードの不一致・期限切れ
/// - `403 Forbidden`: 指名レビュアー以外の操作
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn approve_newsletter(
    State(state): State<Arc<NewsletterState>>,
    Path(newsletter_id): Path<Uuid>,
    Json(req): Json<ApproveRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let newsletter = state
        .usecase
        .approve(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(req.tenant_id),
            ReviewInput {
                acting_user: UserId::from_uuid(req.user_id),
                code:        req.code,
                notes:       req.notes,
            },
        )
        .await?;

    let response = ApiResponse::new(NewsletterDto::from_entity(&newsletter));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/newsletters/{id}/approve-and-send
///
/// 承認後の送信が失敗した場合、ニュースレターは送信可能のまま残り、
/// 送信エラーがそのまま返る。
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn approve_and_send_newsletter(
    State(state): State<Arc<NewsletterState>>,
    Path(newsletter_id): Path<Uuid>,
    Json(req): Json<ApproveRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let report = state
        .usecase
        .approve_and_send(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(req.tenant_id),
            ReviewInput {
                acting_user: UserId::from_uuid(req.user_id),
                code:        req.code,
                notes:       req.notes,
            },
        )
        .await?;

    let response = ApiResponse::new(SendReportDto::from_report(&report));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/newsletters/{id}/reject
///
/// ## レスポンス
///
/// - `200 OK`: 下書きに戻ったニュースレター
/// - `400 Bad Request`: コメントなし
/// - `403 Forbidden`: 指名レビュアー以外の操作
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn reject_newsletter(
    State(state): State<Arc<NewsletterState>>,
    Path(newsletter_id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let newsletter = state
        .usecase
        .reject(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(req.tenant_id),
            ReviewInput {
                acting_user: UserId::from_uuid(req.user_id),
                code:        String::new(),
                notes:       Some(req.notes),
            },
        )
        .await?;

    let response = ApiResponse::new(NewsletterDto::from_entity(&newsletter));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/newsletters/{id}/send
///
/// ## レスポンス
///
/// - `200 OK`: 送信結果（送信中・送信済みへの再実行は現在の状態を返す no-op）
/// - `409 Conflict`: 送信可能・予約済み以外からの送信
/// - `502 Bad Gateway`: 1 通も送信できなかった
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn send_newsletter(
    State(state): State<Arc<NewsletterState>>,
    Path(newsletter_id): Path<Uuid>,
    Json(req): Json<SendRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let report = state
        .usecase
        .send(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(req.tenant_id),
        )
        .await?;

    let response = ApiResponse::new(SendReportDto::from_report(&report));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/newsletters/{id}/schedule
#[tracing::instrument(skip_all, fields(%newsletter_id))]
pub async fn schedule_newsletter(
    State(state): State<Arc<NewsletterState>>,
    Path(newsletter_id): Path<Uuid>,
    Json(req): Json<ScheduleRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let newsletter = state
        .usecase
        .schedule_newsletter(
            &NewsletterId::from_uuid(newsletter_id),
            &TenantId::from_uuid(req.tenant_id),
            req.scheduled_at,
        )
        .await?;

    let response = ApiResponse::new(NewsletterDto::from_entity(&newsletter));
    Ok((StatusCode::OK, Json(response)))
}

//! # Core Service エラー定義
//!
//! Core Service 固有のエラーと、HTTP レスポンスへの変換を定義する。
//!
//! ## ステータスコード対応表
//!
//! | エラー | HTTP ステータス |
//! |--------|----------------|
//! | `Domain(Validation)` | 400 Bad Request |
//! | `Domain(InvalidApprovalCode / ExpiredApprovalCode)` | 400 Bad Request |
//! | `Domain(Forbidden)` | 403 Forbidden |
//! | `Domain(NotFound)` / `NotFound` | 404 Not Found |
//! | `Domain(InvalidTransition / ImmutableContent / Conflict)` | 409 Conflict |
//! | `Domain(ConfigurationError)` | 422 Unprocessable Entity |
//! | `BadRequest` | 400 Bad Request |
//! | `Conflict` | 409 Conflict |
//! | `TotalSendFailure` | 502 Bad Gateway |
//! | `Database` / `Internal` | 500 Internal Server Error |

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mailflow_domain::DomainError;
use mailflow_shared::ErrorResponse;
use thiserror::Error;

/// Core Service で発生するエラー
#[derive(Debug, Error)]
pub enum CoreError {
    /// リソースが見つからない
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),

    /// 競合（楽観的ロック失敗）
    #[error("競合が発生しました: {0}")]
    Conflict(String),

    /// ドメインルール違反
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// 全受信者への配信失敗
    ///
    /// ファンアウトで 1 件も送信できなかった場合。ニュースレターは
    /// ready_to_send に巻き戻され、クライアントには 502 を返す。
    #[error("配信に失敗しました: {0}")]
    TotalSendFailure(String),

    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(#[from] mailflow_infra::InfraError),

    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            CoreError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, ErrorResponse::not_found(msg.clone()))
            }
            CoreError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::bad_request(msg.clone()),
            ),
            CoreError::Conflict(msg) => {
                (StatusCode::CONFLICT, ErrorResponse::conflict(msg.clone()))
            }
            CoreError::Domain(e) => domain_error_response(e),
            CoreError::TotalSendFailure(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::bad_gateway(msg.clone()),
            ),
            CoreError::Database(e) => {
                tracing::error!(error = %e, span_trace = %e.span_trace(), "データベースエラー");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::internal_error())
            }
            CoreError::Internal(msg) => {
                tracing::error!("内部エラー: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::internal_error())
            }
        };

        (status, Json(body)).into_response()
    }
}

/// ドメインエラーを HTTP レスポンスに対応付ける
fn domain_error_response(e: &DomainError) -> (StatusCode, ErrorResponse) {
    match e {
        DomainError::Validation(_) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::validation_error(e.to_string()),
        ),
        DomainError::InvalidApprovalCode | DomainError::ExpiredApprovalCode => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::bad_request(e.to_string()),
        ),
        DomainError::Forbidden(_) => (
            StatusCode::FORBIDDEN,
            ErrorResponse::forbidden(e.to_string()),
        ),
        DomainError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            ErrorResponse::not_found(e.to_string()),
        ),
        DomainError::InvalidTransition { .. }
        | DomainError::ImmutableContent(_)
        | DomainError::Conflict(_) => {
            (StatusCode::CONFLICT, ErrorResponse::conflict(e.to_string()))
        }
        DomainError::ConfigurationError(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorResponse::configuration_error(e.to_string()),
        ),
    }
}

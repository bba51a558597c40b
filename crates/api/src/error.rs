//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use conversation::ConversationError;
use domain::DomainError;
use entity_store::StoreError;
use settlement::SettlementError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Settlement orchestration error.
    Settlement(SettlementError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Settlement(err) => settlement_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::InvoiceNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
        DomainError::Validation(_) | DomainError::Parse(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        DomainError::Store(e) if e.is_conflict() => (StatusCode::CONFLICT, err.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn settlement_error_to_response(err: SettlementError) -> (StatusCode, String) {
    match &err {
        SettlementError::InvoiceNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SettlementError::PaymentInProgress(_)
        | SettlementError::InvalidInvoiceStatus { .. } => (StatusCode::CONFLICT, err.to_string()),
        SettlementError::RetryBlocked(_) | SettlementError::NoPriorPayment(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        SettlementError::Provider(_) | SettlementError::ProviderTimeout => {
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
        SettlementError::Domain(e) => domain_error_to_response_ref(e),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn domain_error_to_response_ref(err: &DomainError) -> (StatusCode, String) {
    match err {
        DomainError::InvoiceNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        ApiError::Settlement(err)
    }
}

impl From<ConversationError> for ApiError {
    fn from(err: ConversationError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

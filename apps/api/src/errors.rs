use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::abuse::GuardDecision;
use crate::credits::{CreditCheck, CreditDenial};
use crate::db::StoreError;
use crate::llm_client::LlmError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// `CreditDenied` and `Throttled` carry business denials from the ledger and the
/// guard; they are expected outcomes and are not logged as errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Credit check failed: {:?}", .0.reason)]
    CreditDenied(CreditCheck),

    #[error("Throttled: {:?}", .0.reason)]
    Throttled(GuardDecision),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn error_body(code: &str, message: &str, details: Option<Value>) -> Json<Value> {
    let mut error = json!({ "code": code, "message": message });
    if let (Some(Value::Object(extra)), Some(obj)) = (details, error.as_object_mut()) {
        obj.extend(extra);
    }
    Json(json!({ "error": error }))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                error_body("VALIDATION_ERROR", &msg, None),
            )
                .into_response(),
            AppError::CreditDenied(check) => {
                let reason = check.reason.unwrap_or(CreditDenial::InsufficientCredits);
                let (status, message) = match reason {
                    CreditDenial::InsufficientCredits => (
                        StatusCode::PAYMENT_REQUIRED,
                        "Not enough AI credits left this month",
                    ),
                    CreditDenial::PremiumRequired => (
                        StatusCode::FORBIDDEN,
                        "This feature requires a premium plan",
                    ),
                    CreditDenial::InvalidOperation => {
                        (StatusCode::BAD_REQUEST, "Unknown AI operation")
                    }
                };
                let details = serde_json::to_value(&check).ok();
                (status, error_body(reason.code(), message, details)).into_response()
            }
            AppError::Throttled(decision) => {
                let code = decision.reason.map_or("throttled", |r| r.as_str());
                let retry_after = decision.retry_after_seconds.unwrap_or(60);
                let body = error_body(
                    code,
                    "Too many requests from this network or device. Try again later.",
                    Some(json!({ "retry_after_seconds": retry_after })),
                );
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            AppError::Store(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("STORAGE_ERROR", "A storage error occurred", None),
                )
                    .into_response()
            }
            AppError::Llm(e) => {
                tracing::error!("LLM error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    error_body("LLM_ERROR", "The AI provider could not complete the request", None),
                )
                    .into_response()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("INTERNAL_ERROR", "An internal server error occurred", None),
                )
                    .into_response()
            }
        }
    }
}

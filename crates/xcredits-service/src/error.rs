//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use xcredits_core::CreditsError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but not the owner.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Redeem code cannot be used.
    #[error("redeem code {code} is unusable: {reason}")]
    CodeUnusable {
        /// The presented code.
        code: String,
        /// Why it was refused.
        reason: &'static str,
    },

    /// Past its deadline.
    #[error("expired: {0}")]
    Expired(String),

    /// Payment callback failed authentication.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// First step committed, later step failed; needs reconciliation.
    #[error("partial failure during {operation} ({reference}): {message}")]
    PartialFailure {
        /// Operation name.
        operation: &'static str,
        /// Reconciliation reference.
        reference: String,
        /// Error of the failed step.
        message: String,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::CodeUnusable { code, reason } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "code_unusable",
                self.to_string(),
                Some(serde_json::json!({ "code": code, "reason": reason })),
            ),
            Self::Expired(msg) => (StatusCode::GONE, "expired", msg.clone(), None),
            Self::SignatureInvalid(msg) => {
                (StatusCode::UNAUTHORIZED, "signature_invalid", msg.clone(), None)
            }
            Self::PartialFailure {
                operation,
                reference,
                message,
            } => {
                tracing::error!(
                    operation,
                    reference = %reference,
                    error = %message,
                    "Partial failure needs reconciliation"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "partial_failure",
                    "The operation was only partially applied".to_string(),
                    Some(serde_json::json!({
                        "operation": operation,
                        "reference": reference
                    })),
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<CreditsError> for ApiError {
    fn from(err: CreditsError) -> Self {
        match err {
            CreditsError::NotFound { .. } => Self::NotFound(err.to_string()),
            CreditsError::AlreadyExists { .. } | CreditsError::InvalidState { .. } => {
                Self::Conflict(err.to_string())
            }
            CreditsError::InsufficientBalance { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            CreditsError::CodeUnusable { code, reason } => Self::CodeUnusable { code, reason },
            CreditsError::Expired { .. } => Self::Expired(err.to_string()),
            CreditsError::Forbidden => Self::Forbidden,
            CreditsError::InvalidInput(msg) => Self::BadRequest(msg),
            CreditsError::InvalidId(e) => Self::BadRequest(e.to_string()),
            CreditsError::SignatureInvalid(msg) => Self::SignatureInvalid(msg),
            CreditsError::Provider(msg) => Self::ExternalService(msg),
            CreditsError::PartialFailure {
                operation,
                reference,
                message,
            } => Self::PartialFailure {
                operation,
                reference,
                message,
            },
            CreditsError::Storage(msg) => Self::Internal(msg),
        }
    }
}

impl From<xcredits_store::StoreError> for ApiError {
    fn from(err: xcredits_store::StoreError) -> Self {
        CreditsError::from(err).into()
    }
}

//! Public registration and verification code handlers.
//!
//! Tokens and codes are never echoed back; delivering them to the applicant
//! (email) happens outside this service.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use xcredits_core::{RegistrationStatus, UserRegistration, VerificationPurpose};

use crate::error::ApiError;
use crate::state::AppState;

/// Registration as shown to clients; secrets stripped.
#[derive(Debug, Serialize)]
pub struct RegistrationView {
    /// Registration ID.
    pub id: String,
    /// Normalised email.
    pub email: String,
    /// Username.
    pub username: String,
    /// Workflow status.
    pub status: RegistrationStatus,
    /// User ID once approved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Application deadline.
    pub expires_at: String,
    /// Submission time.
    pub created_at: String,
}

impl From<&UserRegistration> for RegistrationView {
    fn from(reg: &UserRegistration) -> Self {
        Self {
            id: reg.id.to_string(),
            email: reg.email.clone(),
            username: reg.username.clone(),
            status: reg.status,
            user_id: reg.user_id.map(|id| id.to_string()),
            expires_at: reg.expires_at.to_rfc3339(),
            created_at: reg.created_at.to_rfc3339(),
        }
    }
}

/// Registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Email address.
    pub email: String,
    /// Desired username.
    pub username: String,
    /// Plain password; only its salted hash is stored.
    pub password: String,
}

/// Submit a registration application.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegistrationView>, ApiError> {
    let registration =
        state
            .engines
            .registrations
            .apply(&body.email, &body.username, &body.password)?;
    Ok(Json(RegistrationView::from(&registration)))
}

/// Email verification request.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Token sent to the applicant.
    pub token: String,
}

/// Confirm an application's email.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<RegistrationView>, ApiError> {
    let registration = state.engines.registrations.verify(&body.token)?;
    Ok(Json(RegistrationView::from(&registration)))
}

/// Verification code request.
#[derive(Debug, Deserialize)]
pub struct IssueCodeRequest {
    /// Recipient email.
    pub email: String,
    /// What the code is for.
    pub purpose: VerificationPurpose,
}

/// Verification code issue response.
#[derive(Debug, Serialize)]
pub struct IssueCodeResponse {
    /// Always true on success.
    pub issued: bool,
    /// When the code stops working.
    pub expires_at: String,
}

/// Issue a fresh verification code.
pub async fn issue_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IssueCodeRequest>,
) -> Result<Json<IssueCodeResponse>, ApiError> {
    let code = state
        .engines
        .registrations
        .issue_code(&body.email, body.purpose)?;
    Ok(Json(IssueCodeResponse {
        issued: true,
        expires_at: code.expires_at.to_rfc3339(),
    }))
}

/// Verification code check request.
#[derive(Debug, Deserialize)]
pub struct ConsumeCodeRequest {
    /// Recipient email.
    pub email: String,
    /// What the code is for.
    pub purpose: VerificationPurpose,
    /// The code as typed.
    pub code: String,
}

/// Consume a verification code.
pub async fn consume_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConsumeCodeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .engines
        .registrations
        .consume_code(&body.email, body.purpose, &body.code)?;
    Ok(Json(serde_json::json!({ "verified": true })))
}

//! Redeem code handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Redeem request.
#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    /// The code as typed by the user.
    pub code: String,
}

/// Redeem response.
#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    /// Credits granted.
    pub credits: i64,
    /// Balance after redemption.
    pub balance: i64,
}

/// Redeem a code for credits.
pub async fn redeem_code(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    if body.code.trim().is_empty() {
        return Err(ApiError::BadRequest("code is required".into()));
    }
    let credits = state.engines.redeem.redeem(&auth.user_id, &body.code)?;
    let account = state.engines.ledger.balance(&auth.user_id)?;
    Ok(Json(RedeemResponse {
        credits,
        balance: account.balance,
    }))
}

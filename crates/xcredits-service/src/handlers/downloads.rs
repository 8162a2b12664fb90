//! Download check and charge handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use xcredits_core::CreditTransaction;
use xcredits_engine::DownloadCheck;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::PathQuery;
use crate::state::AppState;

/// Whether the user may download `path`, and at what price.
pub async fn check_download(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PathQuery>,
) -> Result<Json<DownloadCheck>, ApiError> {
    let check = state.engines.downloads.check(&auth.user_id, &query.path)?;
    Ok(Json(check))
}

/// Download charge response.
#[derive(Debug, Serialize)]
pub struct ProcessDownloadResponse {
    /// Credits deducted (0 for free paths).
    pub charged: i64,
    /// Balance after the charge, if the account was touched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    /// The ledger entry, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<CreditTransaction>,
}

/// Charge the user for downloading `path`.
pub async fn process_download(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PathQuery>,
) -> Result<Json<ProcessDownloadResponse>, ApiError> {
    let receipt = state.engines.downloads.process(&auth.user_id, &query.path)?;
    Ok(Json(ProcessDownloadResponse {
        charged: receipt.charged,
        balance: receipt.transaction.as_ref().map(|tx| tx.balance_after),
        transaction: receipt.transaction,
    }))
}

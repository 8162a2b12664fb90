//! Credit balance and transaction handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use xcredits_core::{Account, CreditTransaction, Paged};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::PageQuery;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// User ID.
    pub user_id: String,
    /// Current balance in credits.
    pub balance: i64,
    /// Lifetime credits earned.
    pub total_earned: i64,
    /// Lifetime credits spent.
    pub total_spent: i64,
    /// Last change.
    pub updated_at: String,
}

impl From<&Account> for BalanceResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            balance: account.balance,
            total_earned: account.total_earned,
            total_spent: account.total_spent,
            updated_at: account.updated_at.to_rfc3339(),
        }
    }
}

/// Get current credit balance. The account is created on first access.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state.engines.ledger.balance(&auth.user_id)?;
    Ok(Json(BalanceResponse::from(&account)))
}

/// List transaction history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paged<CreditTransaction>>, ApiError> {
    let page = state
        .engines
        .ledger
        .history(&auth.user_id, query.request())?;
    Ok(Json(page))
}

//! Admin handlers: pricing rules, redeem codes, grants, orders and approvals.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use xcredits_core::{
    CreditTransaction, Paged, PaymentOrder, PricingRule, RedeemCode, RedeemCodeUsage,
    RegistrationId, RegistrationStatus, UserId,
};
use xcredits_engine::{GenerateCodes, PurgeReport, RefundOutcome, RuleInput};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::registration::RegistrationView;
use crate::handlers::{PageQuery, PathQuery};
use crate::state::AppState;

// ============================================================================
// Pricing
// ============================================================================

/// Resolved price of a path.
#[derive(Debug, Serialize)]
pub struct PathPricingResponse {
    /// The queried path.
    pub path: String,
    /// Credits a download costs.
    pub credits: i64,
    /// The rule that applies, exact or inherited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<PricingRule>,
}

/// Get the effective pricing for a path.
pub async fn get_pricing(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<PathQuery>,
) -> Result<Json<PathPricingResponse>, ApiError> {
    let rule = state.engines.pricing.effective_rule(&query.path)?;
    let credits = state.engines.pricing.resolve(&query.path)?;
    Ok(Json(PathPricingResponse {
        path: query.path,
        credits,
        rule,
    }))
}

/// Create or replace the rule for a path.
pub async fn set_pricing(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<RuleInput>,
) -> Result<Json<PricingRule>, ApiError> {
    let rule = state.engines.pricing.set_rule(&admin.admin_id, body)?;
    Ok(Json(rule))
}

/// Soft-delete the exact rule for a path.
pub async fn delete_pricing(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<PathQuery>,
) -> Result<Json<PricingRule>, ApiError> {
    let rule = state.engines.pricing.delete_rule(&query.path)?;
    Ok(Json(rule))
}

/// List active rules in path order.
pub async fn list_pricing_rules(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paged<PricingRule>>, ApiError> {
    Ok(Json(state.engines.pricing.list_rules(query.request())?))
}

// ============================================================================
// Redeem Codes
// ============================================================================

/// Generate a batch of redeem codes.
pub async fn generate_codes(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<GenerateCodes>,
) -> Result<Json<Vec<RedeemCode>>, ApiError> {
    let codes = state.engines.redeem.generate(&admin.admin_id, &body)?;
    Ok(Json(codes))
}

/// List redeem codes, newest first.
pub async fn list_codes(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paged<RedeemCode>>, ApiError> {
    Ok(Json(state.engines.redeem.list_codes(query.request())?))
}

/// List the redemptions of one code.
pub async fn list_code_usages(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(code): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paged<RedeemCodeUsage>>, ApiError> {
    Ok(Json(state.engines.redeem.usages(&code, query.request())?))
}

/// Enable/disable request.
#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    /// New state.
    pub enabled: bool,
}

/// Enable or disable a redeem code.
pub async fn set_code_enabled(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(code): Path<String>,
    Json(body): Json<SetEnabledRequest>,
) -> Result<Json<RedeemCode>, ApiError> {
    Ok(Json(state.engines.redeem.set_enabled(&code, body.enabled)?))
}

// ============================================================================
// Credits
// ============================================================================

/// Grant request.
#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    /// Recipient.
    pub user_id: UserId,
    /// Credits to add.
    pub amount: i64,
    /// Audit reason.
    pub reason: String,
}

/// Grant credits to a user.
pub async fn grant_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<GrantCreditsRequest>,
) -> Result<Json<CreditTransaction>, ApiError> {
    let tx = state.engines.ledger.admin_grant(
        &admin.admin_id,
        &body.user_id,
        body.amount,
        &body.reason,
    )?;
    Ok(Json(tx))
}

/// Ledger refund request.
#[derive(Debug, Deserialize)]
pub struct RefundCreditsRequest {
    /// Recipient.
    pub user_id: UserId,
    /// Credits to give back.
    pub amount: i64,
    /// What is being refunded (order number, path).
    pub source_id: String,
    /// Audit reason.
    pub reason: String,
}

/// Credit back a spend as a refund.
pub async fn refund_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<RefundCreditsRequest>,
) -> Result<Json<CreditTransaction>, ApiError> {
    let tx = state.engines.ledger.refund(
        &body.user_id,
        body.amount,
        &body.source_id,
        &body.reason,
    )?;
    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %body.user_id,
        amount = body.amount,
        "Admin refund recorded"
    );
    Ok(Json(tx))
}

// ============================================================================
// Orders
// ============================================================================

/// Manual settlement request.
#[derive(Debug, Deserialize)]
pub struct CompleteOrderRequest {
    /// The provider's transaction reference.
    pub provider_transaction_id: String,
}

/// Settle an order by hand (reconciliation).
pub async fn complete_order(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(order_no): Path<String>,
    Json(body): Json<CompleteOrderRequest>,
) -> Result<Json<PaymentOrder>, ApiError> {
    let order =
        state
            .engines
            .orders
            .complete(&order_no, &body.provider_transaction_id, Utc::now())?;
    tracing::info!(admin_id = %admin.admin_id, order_no = %order_no, "Order settled by admin");
    Ok(Json(order))
}

/// Failure request.
#[derive(Debug, Deserialize)]
pub struct FailOrderRequest {
    /// Why the order failed.
    pub reason: String,
}

/// Mark a pending order failed.
pub async fn fail_order(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(order_no): Path<String>,
    Json(body): Json<FailOrderRequest>,
) -> Result<Json<PaymentOrder>, ApiError> {
    Ok(Json(state.engines.orders.fail(&order_no, &body.reason)?))
}

/// Provider refund request.
#[derive(Debug, Deserialize)]
pub struct RefundOrderRequest {
    /// Amount to refund in minor units.
    pub amount_minor: i64,
}

/// Refund a paid order through its provider.
pub async fn refund_order(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(order_no): Path<String>,
    Json(body): Json<RefundOrderRequest>,
) -> Result<Json<RefundOutcome>, ApiError> {
    let outcome = state
        .engines
        .orders
        .refund(&order_no, body.amount_minor)
        .await?;
    Ok(Json(outcome))
}

/// Sweep response.
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    /// Orders moved to expired.
    pub expired: usize,
}

/// Expire overdue pending orders now.
pub async fn sweep_orders(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<SweepResponse>, ApiError> {
    let expired = state.engines.orders.sweep_expired()?;
    Ok(Json(SweepResponse { expired }))
}

// ============================================================================
// Registrations
// ============================================================================

/// Registration listing query.
#[derive(Debug, Deserialize)]
pub struct ListRegistrationsQuery {
    /// Status filter as its wire code (default: pending).
    pub status: Option<i8>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Items per page.
    pub page_size: Option<u32>,
}

/// List registrations by status.
pub async fn list_registrations(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<ListRegistrationsQuery>,
) -> Result<Json<Paged<RegistrationView>>, ApiError> {
    let status = match query.status {
        Some(code) => RegistrationStatus::from_code(code)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown status: {code}")))?,
        None => RegistrationStatus::Pending,
    };
    let page = PageQuery {
        page: query.page,
        page_size: query.page_size,
    };
    let registrations = state
        .engines
        .registrations
        .list_by_status(status, page.request())?;
    Ok(Json(registrations.map(|r| RegistrationView::from(&r))))
}

fn parse_registration_id(id: &str) -> Result<RegistrationId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid registration id: {id}")))
}

/// Approve a verified registration.
pub async fn approve_registration(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(id): Path<String>,
) -> Result<Json<RegistrationView>, ApiError> {
    let id = parse_registration_id(&id)?;
    let registration = state.engines.registrations.approve(&id)?;
    tracing::info!(admin_id = %admin.admin_id, registration_id = %id, "Registration approved by admin");
    Ok(Json(RegistrationView::from(&registration)))
}

/// Reject a pending or verified registration.
pub async fn reject_registration(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(id): Path<String>,
) -> Result<Json<RegistrationView>, ApiError> {
    let id = parse_registration_id(&id)?;
    let registration = state.engines.registrations.reject(&id)?;
    tracing::info!(admin_id = %admin.admin_id, registration_id = %id, "Registration rejected by admin");
    Ok(Json(RegistrationView::from(&registration)))
}

/// Remove expired registrations and verification codes now.
pub async fn purge_expired(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<PurgeReport>, ApiError> {
    Ok(Json(state.engines.registrations.purge_expired()?))
}

//! Payment order handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use xcredits_core::{Paged, PaymentOrder};
use xcredits_engine::CheckoutPayload;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::PageQuery;
use crate::state::AppState;

/// Create order request.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Credits to buy.
    pub credits: i64,
    /// Provider name, e.g. `wechat`.
    pub payment_method: String,
}

/// Create order response.
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    /// The stored order.
    pub order: PaymentOrder,
    /// What the client needs to complete payment.
    pub checkout: CheckoutPayload,
}

/// Create a payment order and open it with the chosen provider.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    let (order, checkout) = state
        .engines
        .orders
        .create_order(&auth.user_id, body.credits, &body.payment_method)
        .await?;
    Ok(Json(CreateOrderResponse { order, checkout }))
}

/// List the caller's orders, newest first.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paged<PaymentOrder>>, ApiError> {
    let orders = state
        .engines
        .orders
        .list_orders(&auth.user_id, query.request())?;
    Ok(Json(orders))
}

/// Get one of the caller's orders.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_no): Path<String>,
) -> Result<Json<PaymentOrder>, ApiError> {
    let order = state.engines.orders.get_order(&auth.user_id, &order_no)?;
    Ok(Json(order))
}

/// Cancel one of the caller's pending orders.
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_no): Path<String>,
) -> Result<Json<PaymentOrder>, ApiError> {
    let order = state.engines.orders.cancel(&order_no, &auth.user_id)?;
    Ok(Json(order))
}

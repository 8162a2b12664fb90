//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    admin, credits, downloads, health, orders, redeem, registration, webhooks,
};
use crate::state::AppState;

/// Maximum concurrent requests for user API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for admin endpoints.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 20;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /v1/auth/register` - Submit a registration
/// - `POST /v1/auth/verify` - Verify an email token
/// - `POST /v1/auth/codes` - Issue a verification code
/// - `POST /v1/auth/codes/verify` - Consume a verification code
///
/// ## User (JWT auth)
/// - `GET /v1/credits/balance`, `GET /v1/credits/transactions`
/// - `GET /v1/downloads/check`, `POST /v1/downloads/process`
/// - `POST /v1/redeem`
/// - `POST /v1/orders`, `GET /v1/orders`, `GET /v1/orders/:order_no`,
///   `POST /v1/orders/:order_no/cancel`
///
/// ## Admin (`X-Admin-Key`)
/// - pricing rules, redeem codes, grants and refunds, order reconciliation,
///   registrations, maintenance
///
/// ## Webhooks (provider signature)
/// - `POST /webhooks/payments/:provider`
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let admin_routes = Router::new()
        // Pricing
        .route(
            "/pricing",
            get(admin::get_pricing)
                .put(admin::set_pricing)
                .delete(admin::delete_pricing),
        )
        .route("/pricing/rules", get(admin::list_pricing_rules))
        // Redeem codes
        .route(
            "/redeem-codes",
            post(admin::generate_codes).get(admin::list_codes),
        )
        .route("/redeem-codes/:code/usages", get(admin::list_code_usages))
        .route("/redeem-codes/:code/enabled", post(admin::set_code_enabled))
        // Credits
        .route("/credits/grant", post(admin::grant_credits))
        .route("/credits/refund", post(admin::refund_credits))
        // Orders
        .route("/orders/sweep", post(admin::sweep_orders))
        .route("/orders/:order_no/complete", post(admin::complete_order))
        .route("/orders/:order_no/fail", post(admin::fail_order))
        .route("/orders/:order_no/refund", post(admin::refund_order))
        // Registrations
        .route("/registrations", get(admin::list_registrations))
        .route(
            "/registrations/:id/approve",
            post(admin::approve_registration),
        )
        .route("/registrations/:id/reject", post(admin::reject_registration))
        .route("/maintenance/purge", post(admin::purge_expired))
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Credits
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))
        // Downloads
        .route("/downloads/check", get(downloads::check_download))
        .route("/downloads/process", post(downloads::process_download))
        // Redeem
        .route("/redeem", post(redeem::redeem_code))
        // Orders
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/:order_no", get(orders::get_order))
        .route("/orders/:order_no/cancel", post(orders::cancel_order))
        // Registration (public)
        .route("/auth/register", post(registration::register))
        .route("/auth/verify", post(registration::verify))
        .route("/auth/codes", post(registration::issue_code))
        .route("/auth/codes/verify", post(registration::consume_code))
        .nest("/admin", admin_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by payment providers)
        .route(
            "/webhooks/payments/:provider",
            post(webhooks::payment_callback),
        )
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

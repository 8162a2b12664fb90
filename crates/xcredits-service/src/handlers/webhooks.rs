//! Payment provider callbacks.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use xcredits_engine::CallbackOutcome;

use crate::error::ApiError;
use crate::state::AppState;

/// Handle a payment notification for `provider`.
///
/// The body is authenticated by the provider adapter before anything is
/// read from it. Settled, failed and duplicate notifications are all
/// acknowledged so the provider stops retrying.
pub async fn payment_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let gateway = state.engines.orders.gateway(&provider)?;
    let outcome = state.engines.orders.process_callback(&provider, &body)?;

    match &outcome {
        CallbackOutcome::Settled(order) => {
            tracing::info!(provider = %provider, order_no = %order.order_no, "Payment callback settled order");
        }
        CallbackOutcome::Failed(order) => {
            tracing::info!(provider = %provider, order_no = %order.order_no, "Payment callback reported failure");
        }
        CallbackOutcome::Unchanged(order) => {
            tracing::debug!(
                provider = %provider,
                order_no = %order.order_no,
                status = %order.status,
                "Duplicate payment callback"
            );
        }
    }

    let ack = gateway.acknowledgement(true);
    Ok(([(header::CONTENT_TYPE, ack.content_type)], ack.body).into_response())
}

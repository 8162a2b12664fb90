//! Payment provider abstraction and registry.
//!
//! Providers own all protocol detail (signing, wire format, HTTP). The order
//! engine only sees verified callbacks and checkout payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use xcredits_core::{CreditsError, PaymentOrder, Result};

/// Errors raised by payment providers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The callback signature did not verify.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// The callback or provider response could not be parsed.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The provider could not be reached or returned an error.
    #[error("provider request failed: {0}")]
    Request(String),

    /// The provider does not support the operation.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<GatewayError> for CreditsError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::SignatureInvalid(msg) => Self::SignatureInvalid(msg),
            GatewayError::Malformed(msg) => Self::SignatureInvalid(format!("malformed: {msg}")),
            GatewayError::Request(msg) | GatewayError::Unsupported(msg) => Self::Provider(msg),
        }
    }
}

/// What the user needs to complete payment (redirect URL or QR content).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutPayload {
    /// URL to redirect the user to, if the provider uses redirects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    /// Content to render as a QR code, if the provider uses QR payment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    /// Provider-specific extras, stored with the order.
    pub data: serde_json::Value,
}

/// An authenticated payment notification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCallback {
    /// Our order number.
    pub order_no: String,
    /// The provider's transaction reference.
    pub provider_transaction_id: String,
    /// Amount paid, in minor units.
    pub amount_minor: i64,
    /// When the provider says payment completed.
    pub paid_at: DateTime<Utc>,
    /// Whether the provider reports the payment as successful. The signature
    /// has already been verified either way.
    pub valid: bool,
}

/// Result of a refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundOutcome {
    /// Whether the provider accepted the refund.
    pub success: bool,
    /// The provider's refund reference.
    pub refund_id: Option<String>,
    /// Provider message.
    pub message: String,
}

/// Body a provider expects in reply to a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    /// MIME type of `body`.
    pub content_type: &'static str,
    /// Response body.
    pub body: String,
}

/// A payment provider adapter.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Registry key, also stored on orders.
    fn name(&self) -> &str;

    /// Open a payment with the provider for a freshly created order.
    async fn create_order(
        &self,
        order: &PaymentOrder,
    ) -> std::result::Result<CheckoutPayload, GatewayError>;

    /// Authenticate and parse a raw callback body.
    ///
    /// Must return `GatewayError::SignatureInvalid` for anything that does not
    /// verify; an `Ok` value is trusted by the order engine.
    fn verify_callback(&self, raw: &[u8]) -> std::result::Result<VerifiedCallback, GatewayError>;

    /// Refund `amount_minor` of a paid order.
    async fn refund(
        &self,
        order: &PaymentOrder,
        amount_minor: i64,
    ) -> std::result::Result<RefundOutcome, GatewayError>;

    /// Reply body for a processed callback.
    fn acknowledgement(&self, success: bool) -> Acknowledgement;
}

/// Providers keyed by name.
#[derive(Clone, Default)]
pub struct PaymentGateways {
    providers: BTreeMap<String, Arc<dyn PaymentProvider>>,
}

impl fmt::Debug for PaymentGateways {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentGateways")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PaymentGateways {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its own name, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(provider.name().to_owned(), provider);
    }

    /// Look up a provider.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound` for unknown names.
    pub fn get(&self, name: &str) -> Result<Arc<dyn PaymentProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| CreditsError::not_found("payment provider", name))
    }

    /// Registered provider names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

//! Payment order types for xcredits.
//!
//! A payment order is a pending request to turn a real-world payment into
//! credits. It is created `pending` and leaves that state exactly once.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::redeem::CODE_PREFIX;
use crate::UserId;

/// Default time-to-live for pending orders, in minutes.
pub const DEFAULT_ORDER_TTL_MINUTES: i64 = 30;

/// Default currency for payment orders.
pub const DEFAULT_CURRENCY: &str = "CNY";

/// A payment order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    /// Globally unique order number.
    pub order_no: String,

    /// The purchasing user.
    pub user_id: UserId,

    /// Credits granted on settlement.
    pub credits: i64,

    /// Amount to pay, in minor currency units.
    pub amount_minor: i64,

    /// ISO currency code.
    pub currency: String,

    /// Name of the payment provider handling the order.
    pub provider: String,

    /// Current status.
    pub status: OrderStatus,

    /// When the provider reported the payment.
    pub paid_at: Option<DateTime<Utc>>,

    /// Deadline for settlement.
    pub expires_at: DateTime<Utc>,

    /// Opaque provider data (redirect/QR payload, provider transaction ID).
    pub provider_payload: serde_json::Value,

    /// When the order was created.
    pub created_at: DateTime<Utc>,

    /// When the order was last updated.
    pub updated_at: DateTime<Utc>,
}

impl PaymentOrder {
    /// Create a pending order expiring `ttl` after `now`.
    #[must_use]
    pub fn pending(
        user_id: UserId,
        credits: i64,
        amount_minor: i64,
        currency: impl Into<String>,
        provider: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            order_no: generate_order_no(now),
            user_id,
            credits,
            amount_minor,
            currency: currency.into(),
            provider: provider.into(),
            status: OrderStatus::Pending,
            paid_at: None,
            expires_at: now + ttl,
            provider_payload: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the order is past its deadline at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The order moved to `status` at `now`.
    #[must_use]
    pub fn with_status(&self, status: OrderStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Status of a payment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting payment.
    Pending,
    /// Settled and credited.
    Paid,
    /// Rejected by the provider.
    Failed,
    /// Cancelled by the user.
    Cancelled,
    /// Not settled before its deadline.
    Expired,
}

impl OrderStatus {
    /// Whether the status is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Transition table. Only `pending` has outgoing edges.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Paid | Self::Failed | Self::Cancelled | Self::Expired
            )
        )
    }

    /// Whether a refund can be issued against an order in this status.
    #[must_use]
    pub const fn is_refundable(self) -> bool {
        matches!(self, Self::Paid)
    }

    /// Get the status name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate an order number: prefix, unix seconds, 8 random characters.
#[must_use]
pub fn generate_order_no(now: DateTime<Utc>) -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{CODE_PREFIX}{}{random}", now.timestamp())
}

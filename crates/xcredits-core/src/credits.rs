//! Credit transaction types for xcredits.
//!
//! Transactions are the append-only history of an account: one record per
//! balance mutation, never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Account, TransactionId, UserId};

/// A credit transaction representing a balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Signed amount. Positive = credit, negative = debit.
    pub amount: i64,

    /// Balance after this transaction.
    pub balance_after: i64,

    /// Direction of the change.
    pub kind: TransactionKind,

    /// What caused the change.
    pub source: TransactionSource,

    /// Order number, redeem code or file path, depending on `source`.
    pub source_id: String,

    /// Human-readable description.
    pub description: String,

    /// Additional metadata.
    pub metadata: serde_json::Value,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Build the record for a credit that produced `after`.
    #[must_use]
    pub fn earn(
        after: &Account,
        amount: i64,
        source: TransactionSource,
        source_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::record(after, amount.abs(), TransactionKind::Earn, source, source_id, description)
    }

    /// Build the record for a debit that produced `after`.
    #[must_use]
    pub fn spend(
        after: &Account,
        amount: i64,
        source: TransactionSource,
        source_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::record(
            after,
            -amount.abs(), // Always negative for spend
            TransactionKind::Spend,
            source,
            source_id,
            description,
        )
    }

    /// Build the record for a refund credit that produced `after`.
    #[must_use]
    pub fn refund(
        after: &Account,
        amount: i64,
        source_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::record(
            after,
            amount.abs(),
            TransactionKind::Refund,
            TransactionSource::Purchase,
            source_id,
            description,
        )
    }

    fn record(
        after: &Account,
        amount: i64,
        kind: TransactionKind,
        source: TransactionSource,
        source_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id: after.user_id,
            amount,
            balance_after: after.balance,
            kind,
            source,
            source_id: source_id.into(),
            description: description.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Attach metadata to the transaction.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Credits received.
    Earn,
    /// Credits spent.
    Spend,
    /// Credits returned after a refund.
    Refund,
}

impl TransactionKind {
    /// Get the kind name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Earn => "earn",
            Self::Spend => "spend",
            Self::Refund => "refund",
        }
    }
}

/// Origin of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    /// A settled payment order.
    Purchase,
    /// A redeemed code.
    Redeem,
    /// A priced file download.
    Download,
    /// A manual admin grant.
    Admin,
}

impl TransactionSource {
    /// Get the source name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Redeem => "redeem",
            Self::Download => "download",
            Self::Admin => "admin",
        }
    }
}

//! Account types for xcredits.
//!
//! An account holds one user's credit balance plus lifetime counters. It is
//! mutated exclusively through the ledger, which bumps `version` on every write
//! so concurrent writers can detect each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A credit account for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The owning user.
    pub user_id: UserId,

    /// Current credit balance. Never negative.
    pub balance: i64,

    /// Lifetime credits received.
    pub total_earned: i64,

    /// Lifetime credits spent.
    pub total_spent: i64,

    /// Write counter used for compare-and-swap updates.
    pub version: u64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            total_earned: 0,
            total_spent: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account has sufficient credits for a deduction.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    /// The account state after crediting `amount`.
    #[must_use]
    pub fn credited(&self, amount: i64) -> Self {
        Self {
            balance: self.balance + amount,
            total_earned: self.total_earned + amount,
            version: self.version + 1,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// The account state after debiting `amount`.
    ///
    /// Callers check [`Account::has_sufficient_credits`] first.
    #[must_use]
    pub fn debited(&self, amount: i64) -> Self {
        Self {
            balance: self.balance - amount,
            total_spent: self.total_spent + amount,
            version: self.version + 1,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

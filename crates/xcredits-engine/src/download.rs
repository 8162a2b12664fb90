//! Download gate: price check and charge for a path.

use serde::Serialize;
use xcredits_core::{normalize_path, CreditTransaction, Result, TransactionSource, UserId};

use crate::ledger::Ledger;
use crate::pricing::PricingResolver;

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadCheck {
    /// Whether the user may download the path now.
    pub allowed: bool,
    /// Credits the download costs.
    pub required_credits: i64,
    /// Current balance; absent for free paths.
    pub balance: Option<i64>,
}

/// Outcome of a processed download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadReceipt {
    /// Credits deducted (0 for free paths).
    pub charged: i64,
    /// The debit, if one was made.
    pub transaction: Option<CreditTransaction>,
}

/// Gates downloads behind the pricing rules.
#[derive(Debug, Clone)]
pub struct DownloadGate {
    pricing: PricingResolver,
    ledger: Ledger,
}

impl DownloadGate {
    /// Create a gate from a resolver and a ledger.
    #[must_use]
    pub fn new(pricing: PricingResolver, ledger: Ledger) -> Self {
        Self { pricing, ledger }
    }

    /// Whether `user_id` can afford `path`. Free paths never touch the account.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidInput` for relative paths and
    /// `CreditsError::Storage` on persistence failure.
    pub fn check(&self, user_id: &UserId, path: &str) -> Result<DownloadCheck> {
        let required = self.pricing.resolve(path)?;
        if required <= 0 {
            return Ok(DownloadCheck {
                allowed: true,
                required_credits: 0,
                balance: None,
            });
        }

        let account = self.ledger.get_or_create_account(user_id)?;
        Ok(DownloadCheck {
            allowed: account.has_sufficient_credits(required),
            required_credits: required,
            balance: Some(account.balance),
        })
    }

    /// Charge `user_id` for downloading `path`.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InsufficientBalance` if the balance does not
    /// cover the price.
    pub fn process(&self, user_id: &UserId, path: &str) -> Result<DownloadReceipt> {
        let path = normalize_path(path)?;
        let required = self.pricing.resolve(&path)?;
        if required <= 0 {
            return Ok(DownloadReceipt {
                charged: 0,
                transaction: None,
            });
        }

        let tx = self.ledger.debit(
            user_id,
            required,
            TransactionSource::Download,
            &path,
            &format!("Download {path}"),
        )?;
        Ok(DownloadReceipt {
            charged: required,
            transaction: Some(tx),
        })
    }
}

//! Ledger engine: the only path by which balances change.
//!
//! Every mutation reads the account, builds the next account state and its
//! transaction, and commits both through [`Store::commit_ledger_entry`], which
//! only succeeds if nobody else committed in between. On conflict the
//! engine re-reads and tries again, up to [`MAX_CAS_ATTEMPTS`] times.

use std::fmt;
use std::sync::Arc;

use xcredits_core::{
    Account, CreditTransaction, CreditsError, PageRequest, Paged, Result, TransactionSource,
    UserId,
};
use xcredits_store::{Store, StoreError};

/// Upper bound on optimistic retries before giving up with a storage error.
pub const MAX_CAS_ATTEMPTS: usize = 16;

/// Balance mutation and history.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    /// Create a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Return the user's account, creating an empty one if absent.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Storage` on persistence failure.
    pub fn get_or_create_account(&self, user_id: &UserId) -> Result<Account> {
        if let Some(account) = self.store.get_account(user_id)? {
            return Ok(account);
        }
        let account = self.store.create_account_if_absent(&Account::new(*user_id))?;
        tracing::debug!(user_id = %user_id, "Account created");
        Ok(account)
    }

    /// Current account state (alias of [`Ledger::get_or_create_account`]).
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Storage` on persistence failure.
    pub fn balance(&self, user_id: &UserId) -> Result<Account> {
        self.get_or_create_account(user_id)
    }

    /// Transaction history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Storage` on persistence failure.
    pub fn history(&self, user_id: &UserId, page: PageRequest) -> Result<Paged<CreditTransaction>> {
        let items = self
            .store
            .list_transactions_by_user(user_id, page.limit(), page.offset())?;
        let total = self.store.count_transactions_by_user(user_id)?;
        Ok(Paged {
            items,
            total,
            page: page.page(),
            page_size: page.page_size(),
        })
    }

    /// Add `amount` credits.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidInput` if `amount` is not positive and
    /// `CreditsError::Storage` on persistence failure.
    pub fn credit(
        &self,
        user_id: &UserId,
        amount: i64,
        source: TransactionSource,
        source_id: &str,
        description: &str,
    ) -> Result<CreditTransaction> {
        let tx = self.apply(user_id, amount, |account| {
            let next = checked_credit(account, amount)?;
            let tx = CreditTransaction::earn(&next, amount, source, source_id, description);
            Ok((next, tx))
        })?;

        tracing::info!(
            user_id = %user_id,
            amount,
            source = source.as_str(),
            source_id,
            balance = tx.balance_after,
            "Credits added"
        );
        Ok(tx)
    }

    /// Remove `amount` credits.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InsufficientBalance` if the balance does not
    /// cover `amount`, `CreditsError::InvalidInput` if `amount` is not
    /// positive, and `CreditsError::Storage` on persistence failure.
    pub fn debit(
        &self,
        user_id: &UserId,
        amount: i64,
        source: TransactionSource,
        source_id: &str,
        description: &str,
    ) -> Result<CreditTransaction> {
        let tx = self.apply(user_id, amount, |account| {
            if !account.has_sufficient_credits(amount) {
                return Err(CreditsError::InsufficientBalance {
                    balance: account.balance,
                    required: amount,
                });
            }
            let next = account.debited(amount);
            let tx = CreditTransaction::spend(&next, amount, source, source_id, description);
            Ok((next, tx))
        })?;

        tracing::info!(
            user_id = %user_id,
            amount,
            source = source.as_str(),
            source_id,
            balance = tx.balance_after,
            "Credits deducted"
        );
        Ok(tx)
    }

    /// Credit back `amount` as a refund of an earlier spend.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::credit`].
    pub fn refund(
        &self,
        user_id: &UserId,
        amount: i64,
        source_id: &str,
        reason: &str,
    ) -> Result<CreditTransaction> {
        let tx = self.apply(user_id, amount, |account| {
            let next = checked_credit(account, amount)?;
            let tx = CreditTransaction::refund(&next, amount, source_id, reason);
            Ok((next, tx))
        })?;

        tracing::info!(
            user_id = %user_id,
            amount,
            source_id,
            balance = tx.balance_after,
            "Credits refunded"
        );
        Ok(tx)
    }

    /// Grant credits on behalf of an admin.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::credit`].
    pub fn admin_grant(
        &self,
        admin: &UserId,
        user_id: &UserId,
        amount: i64,
        reason: &str,
    ) -> Result<CreditTransaction> {
        let granted_by = admin.to_string();
        let tx = self.apply(user_id, amount, |account| {
            let next = checked_credit(account, amount)?;
            let tx = CreditTransaction::earn(
                &next,
                amount,
                TransactionSource::Admin,
                granted_by.as_str(),
                reason,
            )
            .with_metadata(serde_json::json!({ "granted_by": granted_by }));
            Ok((next, tx))
        })?;

        tracing::info!(
            admin = %admin,
            user_id = %user_id,
            amount,
            balance = tx.balance_after,
            "Credits granted"
        );
        Ok(tx)
    }

    /// Run one optimistic read-modify-write cycle until it commits.
    fn apply<F>(&self, user_id: &UserId, amount: i64, build: F) -> Result<CreditTransaction>
    where
        F: Fn(&Account) -> Result<(Account, CreditTransaction)>,
    {
        if amount <= 0 {
            return Err(CreditsError::InvalidInput(format!(
                "amount must be positive, got {amount}"
            )));
        }

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.get_or_create_account(user_id)?;
            let (next, tx) = build(&current)?;
            match self.store.commit_ledger_entry(current.version, &next, &tx) {
                Ok(()) => return Ok(tx),
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(user_id = %user_id, attempt, "Ledger write conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(user_id = %user_id, "Ledger write abandoned after repeated conflicts");
        Err(CreditsError::Storage(format!(
            "contention on account {user_id}"
        )))
    }
}

fn checked_credit(account: &Account, amount: i64) -> Result<Account> {
    if account.balance.checked_add(amount).is_none()
        || account.total_earned.checked_add(amount).is_none()
    {
        return Err(CreditsError::InvalidInput(
            "credit would overflow the balance".into(),
        ));
    }
    Ok(account.credited(amount))
}

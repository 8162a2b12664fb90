//! Storage layer for xcredits.
//!
//! This crate provides persistent storage for accounts, ledger transactions,
//! pricing rules, redeem codes, payment orders and registrations.
//!
//! # Backends
//!
//! - [`MemoryStore`]: a lock-protected in-memory store, used by tests and
//!   ephemeral deployments.
//! - `RocksStore` (feature `rocksdb-backend`): `RocksDB` with one column family
//!   per record kind plus by-user and uniqueness indices.
//!
//! # Conditional writes
//!
//! Every state change that can race is expressed as a compare-and-write:
//! the caller passes the value it read (account or redeem code version, order
//! or registration status) and the store applies the write only if that value
//! is still current, returning [`StoreError::Conflict`] otherwise. Callers are
//! expected to re-read and retry or give up.
//!
//! # Listing order
//!
//! By-user transaction indices are keyed by the account version each entry
//! committed, and usage records by the code version, so newest-first listings
//! follow commit order rather than identifier order.
//!
//! # Example
//!
//! ```
//! use xcredits_store::{MemoryStore, Store};
//! use xcredits_core::{Account, UserId};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//! let account = store.create_account_if_absent(&Account::new(user_id)).unwrap();
//! assert_eq!(account.balance, 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use xcredits_core::{
    Account, CreditTransaction, OrderStatus, PaymentOrder, PricingRule, RedeemCode,
    RedeemCodeUsage, RegistrationId, RegistrationStatus, TransactionId, UserId, UserRegistration,
    VerificationCode, VerificationPurpose,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (`RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Insert an account if none exists for its user.
    ///
    /// Returns whichever account is stored afterwards, so concurrent callers
    /// all observe the same record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_account_if_absent(&self, account: &Account) -> Result<Account>;

    /// Atomically write an updated account and its ledger transaction.
    ///
    /// The write happens only if the stored account's version equals
    /// `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist and
    /// `StoreError::Conflict` if its version has moved on.
    fn commit_ledger_entry(
        &self,
        expected_version: u64,
        account: &Account,
        transaction: &CreditTransaction,
    ) -> Result<()>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>>;

    /// List transactions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>>;

    /// Count transactions for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_transactions_by_user(&self, user_id: &UserId) -> Result<u64>;

    // =========================================================================
    // Pricing Rule Operations
    // =========================================================================

    /// Insert or replace the rule at `rule.path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_pricing_rule(&self, rule: &PricingRule) -> Result<()>;

    /// Get the rule stored at exactly `path`, including soft-deleted rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_pricing_rule(&self, path: &str) -> Result<Option<PricingRule>>;

    /// Get the rules stored at each of `paths`, in the same order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_pricing_rules(&self, paths: &[&str]) -> Result<Vec<Option<PricingRule>>>;

    /// List rules that are not soft-deleted, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_pricing_rules(&self, limit: usize, offset: usize) -> Result<Vec<PricingRule>>;

    /// Count rules that are not soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_pricing_rules(&self) -> Result<u64>;

    // =========================================================================
    // Redeem Code Operations
    // =========================================================================

    /// Insert a new redeem code.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the code string is taken.
    fn insert_redeem_code(&self, code: &RedeemCode) -> Result<()>;

    /// Get a redeem code by its string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_redeem_code(&self, code: &str) -> Result<Option<RedeemCode>>;

    /// Conditionally replace a redeem code, optionally recording a usage.
    ///
    /// The write happens only if the stored code's `version` equals
    /// `expected_version`; the usage record, when given, is written in the
    /// same atomic batch.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the code doesn't exist and
    /// `StoreError::Conflict` if it was written since it was read.
    fn update_redeem_code(
        &self,
        expected_version: u64,
        code: &RedeemCode,
        usage: Option<&RedeemCodeUsage>,
    ) -> Result<()>;

    /// List redeem codes, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_redeem_codes(&self, limit: usize, offset: usize) -> Result<Vec<RedeemCode>>;

    /// Count redeem codes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_redeem_codes(&self) -> Result<u64>;

    /// List usages of a code, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_redeem_code_usages(
        &self,
        code: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RedeemCodeUsage>>;

    /// Count usages of a code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_redeem_code_usages(&self, code: &str) -> Result<u64>;

    // =========================================================================
    // Payment Order Operations
    // =========================================================================

    /// Insert a new order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the order number is taken.
    fn insert_order(&self, order: &PaymentOrder) -> Result<()>;

    /// Get an order by its number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_order(&self, order_no: &str) -> Result<Option<PaymentOrder>>;

    /// Conditionally replace an order.
    ///
    /// The write happens only if the stored order's status equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the order doesn't exist and
    /// `StoreError::Conflict` if its status has changed.
    fn transition_order(&self, expected: OrderStatus, order: &PaymentOrder) -> Result<()>;

    /// Edit the provider payload of an order that is still in `expected`.
    ///
    /// `edit` runs against the stored payload under the write lock, so
    /// concurrent edits compose. The status is left untouched. Returns the
    /// updated order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the order doesn't exist and
    /// `StoreError::Conflict` if its status is no longer `expected`.
    fn update_order_payload(
        &self,
        order_no: &str,
        expected: OrderStatus,
        now: DateTime<Utc>,
        edit: &dyn Fn(&mut serde_json::Value),
    ) -> Result<PaymentOrder>;

    /// List orders for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PaymentOrder>>;

    /// Count orders for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_orders_by_user(&self, user_id: &UserId) -> Result<u64>;

    /// List pending orders whose expiry is strictly before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_expired_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>>;

    // =========================================================================
    // Registration Operations
    // =========================================================================

    /// Insert a new registration.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the email, username or token is
    /// already held by another registration.
    fn insert_registration(&self, registration: &UserRegistration) -> Result<()>;

    /// Get a registration by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_registration(&self, id: &RegistrationId) -> Result<Option<UserRegistration>>;

    /// Find a registration by its (lowercased) email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_registration_by_email(&self, email: &str) -> Result<Option<UserRegistration>>;

    /// Find a registration by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_registration_by_username(&self, username: &str) -> Result<Option<UserRegistration>>;

    /// Find a registration by its verification token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_registration_by_token(&self, token: &str) -> Result<Option<UserRegistration>>;

    /// Conditionally replace a registration.
    ///
    /// The write happens only if the stored status equals `expected`. The
    /// token index follows the new record (a cleared token is unindexed).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the registration doesn't exist and
    /// `StoreError::Conflict` if its status has changed.
    fn transition_registration(
        &self,
        expected: RegistrationStatus,
        registration: &UserRegistration,
    ) -> Result<()>;

    /// Delete a registration and its index entries.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the registration doesn't exist.
    fn delete_registration(&self, id: &RegistrationId) -> Result<()>;

    /// List registrations in `status`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_registrations_by_status(
        &self,
        status: RegistrationStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserRegistration>>;

    /// Count registrations in `status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_registrations_by_status(&self, status: RegistrationStatus) -> Result<u64>;

    /// Delete pending registrations that expired before `now`.
    ///
    /// Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_expired_registrations(&self, now: DateTime<Utc>) -> Result<usize>;

    // =========================================================================
    // Verification Code Operations
    // =========================================================================

    /// Store a verification code, replacing any earlier code for the same
    /// email and purpose.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_verification_code(&self, code: &VerificationCode) -> Result<()>;

    /// Get the current verification code for an email and purpose.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_verification_code(
        &self,
        email: &str,
        purpose: VerificationPurpose,
    ) -> Result<Option<VerificationCode>>;

    /// Mark the current code used if it equals `code` and is still unused.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no code is stored and
    /// `StoreError::Conflict` if it differs or was already used.
    fn mark_verification_code_used(
        &self,
        email: &str,
        purpose: VerificationPurpose,
        code: &str,
    ) -> Result<()>;

    /// Delete verification codes that expired before `now`.
    ///
    /// Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_expired_verification_codes(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Apply `offset`/`limit` to an already ordered iterator.
pub(crate) fn paginate<T>(items: impl IntoIterator<Item = T>, limit: usize, offset: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}

/// Convert a collection length into a `u64` count.
pub(crate) fn count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

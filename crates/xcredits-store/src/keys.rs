//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in column families.

use xcredits_core::{RegistrationId, TransactionId, UserId, VerificationPurpose};

/// Separator between variable-length key components.
const SEP: u8 = 0x00;

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || account version (8 bytes BE)`
///
/// The version is the one the entry committed, so keys sort in commit order.
/// The value stored under the key is the transaction ID.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, account_version: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&account_version.to_be_bytes());
    key
}

/// Create a prefix for iterating all entries for a user in a by-user index.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Decode the transaction ID stored in a user-transaction index entry.
///
/// Returns `None` unless the value is exactly 16 bytes.
#[must_use]
pub fn transaction_id_from_index_value(value: &[u8]) -> Option<TransactionId> {
    let bytes: [u8; 16] = value.try_into().ok()?;
    Some(TransactionId::from_bytes(bytes))
}

/// Create a pricing rule key from a normalized path.
#[must_use]
pub fn pricing_rule_key(path: &str) -> Vec<u8> {
    path.as_bytes().to_vec()
}

/// Create a redeem code key.
#[must_use]
pub fn redeem_code_key(code: &str) -> Vec<u8> {
    code.as_bytes().to_vec()
}

/// Create a redeem code usage key.
///
/// Format: `code || 0x00 || code version (8 bytes BE)`
///
/// Each usage is written together with a version bump of its code, so keys
/// sort in redemption order.
#[must_use]
pub fn redeem_usage_key(code: &str, code_version: u64) -> Vec<u8> {
    let mut key = redeem_usage_prefix(code);
    key.extend_from_slice(&code_version.to_be_bytes());
    key
}

/// Create a prefix for iterating all usages of a redeem code.
#[must_use]
pub fn redeem_usage_prefix(code: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(code.len() + 9);
    key.extend_from_slice(code.as_bytes());
    key.push(SEP);
    key
}

/// Create an order key from an order number.
#[must_use]
pub fn order_key(order_no: &str) -> Vec<u8> {
    order_no.as_bytes().to_vec()
}

/// Create a user-order index key.
///
/// Format: `user_id (16 bytes) || created_at millis (8 bytes BE) || order_no`
#[must_use]
pub fn user_order_key(user_id: &UserId, created_millis: i64, order_no: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(24 + order_no.len());
    key.extend_from_slice(user_id.as_bytes());
    // Offset into unsigned space so pre-epoch timestamps still sort first.
    #[allow(clippy::cast_sign_loss)]
    let ordered = (created_millis as u64) ^ (1 << 63);
    key.extend_from_slice(&ordered.to_be_bytes());
    key.extend_from_slice(order_no.as_bytes());
    key
}

/// Extract the order number from a user-order index key.
#[must_use]
pub fn extract_order_no_from_user_key(key: &[u8]) -> Option<&str> {
    std::str::from_utf8(key.get(24..)?).ok()
}

/// Create a registration key from a registration ID.
#[must_use]
pub fn registration_key(id: &RegistrationId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// A unique lookup key in the registration index.
#[derive(Debug, Clone, Copy)]
pub enum RegistrationIndex<'a> {
    /// Lowercased email address.
    Email(&'a str),
    /// Username.
    Username(&'a str),
    /// Email verification token.
    Token(&'a str),
}

/// Create a registration index key.
///
/// Format: `tag || 0x00 || value`
#[must_use]
pub fn registration_index_key(index: RegistrationIndex<'_>) -> Vec<u8> {
    let (tag, value): (&[u8], &str) = match index {
        RegistrationIndex::Email(v) => (b"email", v),
        RegistrationIndex::Username(v) => (b"username", v),
        RegistrationIndex::Token(v) => (b"token", v),
    };
    let mut key = Vec::with_capacity(tag.len() + 1 + value.len());
    key.extend_from_slice(tag);
    key.push(SEP);
    key.extend_from_slice(value.as_bytes());
    key
}

/// Create a verification code key.
///
/// Format: `email || 0x00 || purpose`
#[must_use]
pub fn verification_code_key(email: &str, purpose: VerificationPurpose) -> Vec<u8> {
    let mut key = Vec::with_capacity(email.len() + 16);
    key.extend_from_slice(email.as_bytes());
    key.push(SEP);
    key.extend_from_slice(purpose.as_str().as_bytes());
    key
}

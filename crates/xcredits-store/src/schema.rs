//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Credit transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Pricing rules, keyed by exact path.
    pub const PRICING_RULES: &str = "pricing_rules";

    /// Redeem codes, keyed by code string.
    pub const REDEEM_CODES: &str = "redeem_codes";

    /// Redeem code usages, keyed by `code || 0x00 || usage_id`.
    pub const REDEEM_CODE_USAGES: &str = "redeem_code_usages";

    /// Payment orders, keyed by order number.
    pub const ORDERS: &str = "orders";

    /// Index: orders by user, keyed by `user_id || created_millis || order_no`.
    pub const ORDERS_BY_USER: &str = "orders_by_user";

    /// User registrations, keyed by `registration_id`.
    pub const REGISTRATIONS: &str = "registrations";

    /// Index: unique registration keys (email, username, token) to `registration_id`.
    pub const REGISTRATION_INDEX: &str = "registration_index";

    /// Verification codes, keyed by `email || 0x00 || purpose`.
    pub const VERIFICATION_CODES: &str = "verification_codes";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::PRICING_RULES,
        cf::REDEEM_CODES,
        cf::REDEEM_CODE_USAGES,
        cf::ORDERS,
        cf::ORDERS_BY_USER,
        cf::REGISTRATIONS,
        cf::REGISTRATION_INDEX,
        cf::VERIFICATION_CODES,
    ]
}

//! Core types and utilities for xcredits.
//!
//! This crate provides the foundational types used throughout the xcredits
//! download-credits service:
//!
//! - **Identifiers**: `UserId`, `RegistrationId`, `TransactionId`, `UsageId`
//! - **Accounts**: `Account`
//! - **Ledger**: `CreditTransaction`, `TransactionKind`, `TransactionSource`
//! - **Pricing**: `PricingRule`, path normalization
//! - **Redeem codes**: `RedeemCode`, `RedeemCodeUsage`
//! - **Orders**: `PaymentOrder`, `OrderStatus`
//! - **Registration**: `UserRegistration`, `RegistrationStatus`, `VerificationCode`
//!
//! # Credit Unit
//!
//! Credits are whole numbers stored as `i64`. A download of a priced path
//! deducts the rule's credits; purchases convert minor currency units into
//! credits at a configured rate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod credits;
pub mod error;
pub mod ids;
pub mod order;
pub mod page;
pub mod pricing;
pub mod redeem;
pub mod registration;

pub use account::Account;
pub use credits::{CreditTransaction, TransactionKind, TransactionSource};
pub use error::{CreditsError, Result};
pub use ids::{IdError, RegistrationId, TransactionId, UsageId, UserId};
pub use order::{
    generate_order_no, OrderStatus, PaymentOrder, DEFAULT_CURRENCY, DEFAULT_ORDER_TTL_MINUTES,
};
pub use page::{PageRequest, Paged, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use pricing::{ancestor_prefixes, normalize_path, PricingRule, MAX_PATH_CHARS};
pub use redeem::{generate_redeem_code, RedeemCode, RedeemCodeUsage, CODE_PREFIX};
pub use registration::{
    generate_verification_code, hash_password, random_hex, RegistrationStatus, UserRegistration,
    VerificationCode, VerificationPurpose, REGISTRATION_TTL_HOURS, VERIFICATION_CODE_TTL_MINUTES,
    VERIFICATION_TOKEN_BYTES,
};

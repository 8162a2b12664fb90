//! Redeem code types for xcredits.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{UsageId, UserId};

/// Prefix shared by generated redeem codes and order numbers.
pub const CODE_PREFIX: &str = "XC";

/// Number of random characters in a generated redeem code.
pub const REDEEM_CODE_RANDOM_LEN: usize = 12;

/// A pre-generated code exchangeable for a fixed credit grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemCode {
    /// The unique code string.
    pub code: String,

    /// Credits granted per redemption.
    pub credits: i64,

    /// Maximum number of redemptions.
    pub max_uses: u32,

    /// Redemptions so far. Never exceeds `max_uses`.
    pub used_count: u32,

    /// Disabled codes cannot be redeemed.
    pub enabled: bool,

    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,

    /// The admin who generated the code.
    pub created_by: UserId,

    /// Free-text description.
    pub description: String,

    /// When the code was created.
    pub created_at: DateTime<Utc>,

    /// When the code was last updated.
    pub updated_at: DateTime<Utc>,

    /// Bumped on every write; conditional updates compare against it.
    #[serde(default)]
    pub version: u64,
}

impl RedeemCode {
    /// Whether the code is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now > expires)
    }

    /// Why the code cannot be used at `now`, if it cannot.
    #[must_use]
    pub fn unusable_reason(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if !self.enabled {
            Some("disabled")
        } else if self.is_expired_at(now) {
            Some("expired")
        } else if self.used_count >= self.max_uses {
            Some("exhausted")
        } else {
            None
        }
    }

    /// The code state after one more redemption.
    #[must_use]
    pub fn consumed(&self, now: DateTime<Utc>) -> Self {
        Self {
            used_count: self.used_count + 1,
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        }
    }

    /// The code state with `enabled` set.
    #[must_use]
    pub fn with_enabled(&self, enabled: bool, now: DateTime<Utc>) -> Self {
        Self {
            enabled,
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        }
    }
}

/// One successful redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemCodeUsage {
    /// Usage record ID (ULID).
    pub id: UsageId,

    /// The redeemed code.
    pub code: String,

    /// The redeeming user.
    pub user_id: UserId,

    /// Credits granted.
    pub credits: i64,

    /// When the code was redeemed.
    pub used_at: DateTime<Utc>,
}

/// Generate a fresh redeem code string.
#[must_use]
pub fn generate_redeem_code() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REDEEM_CODE_RANDOM_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{CODE_PREFIX}{random}")
}

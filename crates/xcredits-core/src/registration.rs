//! Registration types for xcredits.
//!
//! New users apply, confirm their email through a single-use token, and are
//! then approved or rejected by an admin. Status only moves forward, except
//! that rejection is reachable from `pending` and `verified`.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::{RegistrationId, UserId};

/// Lifetime of a registration application, in hours.
pub const REGISTRATION_TTL_HOURS: i64 = 24;

/// Lifetime of a verification code, in minutes.
pub const VERIFICATION_CODE_TTL_MINUTES: i64 = 10;

/// Number of random bytes in a verification token (hex-encoded on the wire).
pub const VERIFICATION_TOKEN_BYTES: usize = 32;

/// Number of random bytes in a password salt.
const SALT_BYTES: usize = 8;

/// A pending-user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistration {
    /// Registration ID.
    pub id: RegistrationId,

    /// Globally unique email.
    pub email: String,

    /// Globally unique username.
    pub username: String,

    /// Salted password hash (hex).
    pub password_hash: String,

    /// Password salt.
    pub salt: String,

    /// Current status.
    pub status: RegistrationStatus,

    /// Single-use verification token. Cleared once consumed.
    pub token: Option<String>,

    /// The user created on approval.
    #[serde(default)]
    pub user_id: Option<UserId>,

    /// Deadline for verification.
    pub expires_at: DateTime<Utc>,

    /// When the application was submitted.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl UserRegistration {
    /// A fresh application awaiting email verification.
    #[must_use]
    pub fn pending(
        email: impl Into<String>,
        username: impl Into<String>,
        password: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let salt = random_hex(SALT_BYTES);
        Self {
            id: RegistrationId::generate(),
            email: email.into(),
            username: username.into(),
            password_hash: hash_password(password, &salt),
            salt,
            status: RegistrationStatus::Pending,
            token: Some(random_hex(VERIFICATION_TOKEN_BYTES)),
            user_id: None,
            expires_at: now + Duration::hours(REGISTRATION_TTL_HOURS),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the application is past its deadline at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Check a candidate password against the stored hash.
    #[must_use]
    pub fn password_matches(&self, password: &str) -> bool {
        hash_password(password, &self.salt) == self.password_hash
    }
}

/// Status of a registration.
///
/// The numeric codes exist only on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum RegistrationStatus {
    /// Rejected by an admin (terminal).
    Rejected,
    /// Submitted, awaiting email verification.
    Pending,
    /// Email verified, awaiting admin approval.
    Verified,
    /// Approved; the user exists (terminal).
    Registered,
}

impl RegistrationStatus {
    /// Transition table.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Verified | Self::Rejected)
                | (Self::Verified, Self::Registered | Self::Rejected)
        )
    }

    /// Numeric wire code.
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::Rejected => -1,
            Self::Pending => 0,
            Self::Verified => 1,
            Self::Registered => 2,
        }
    }

    /// Parse a numeric wire code.
    #[must_use]
    pub const fn from_code(code: i8) -> Option<Self> {
        match code {
            -1 => Some(Self::Rejected),
            0 => Some(Self::Pending),
            1 => Some(Self::Verified),
            2 => Some(Self::Registered),
            _ => None,
        }
    }
}

impl From<RegistrationStatus> for i8 {
    fn from(status: RegistrationStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i8> for RegistrationStatus {
    type Error = String;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown registration status: {code}"))
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rejected => "rejected",
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Registered => "registered",
        };
        f.write_str(name)
    }
}

/// What a verification code is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPurpose {
    /// Confirming a new registration.
    Register,
    /// Resetting a password.
    ResetPassword,
}

impl VerificationPurpose {
    /// Get the purpose name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::ResetPassword => "reset_password",
        }
    }
}

/// A short-lived one-time code scoped to an email and a purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    /// Target email.
    pub email: String,

    /// Scope of the code.
    pub purpose: VerificationPurpose,

    /// The 6-digit code.
    pub code: String,

    /// Set once consumed.
    pub used: bool,

    /// Deadline for use.
    pub expires_at: DateTime<Utc>,

    /// When the code was issued.
    pub created_at: DateTime<Utc>,
}

impl VerificationCode {
    /// Whether the code is past its deadline at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Hash a password with its salt: `hex(sha256(hex(sha256(password)) || salt))`.
#[must_use]
pub fn hash_password(password: &str, salt: &str) -> String {
    let inner = hex::encode(Sha256::digest(password.as_bytes()));
    let mut hasher = Sha256::new();
    hasher.update(inner.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a random hex string of `bytes` random bytes.
#[must_use]
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(buf.as_mut_slice());
    hex::encode(buf)
}

/// Generate a 6-digit numeric verification code.
#[must_use]
pub fn generate_verification_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

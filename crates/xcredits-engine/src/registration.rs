//! Registration workflow and verification codes.
//!
//! Applications are verified by email token and then approved or rejected by
//! an admin. Every status change is a conditional update on the stored
//! status, so an approve racing a reject has one winner.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use xcredits_core::{
    generate_verification_code, CreditsError, PageRequest, Paged, RegistrationId,
    RegistrationStatus, Result, UserId, UserRegistration, VerificationCode, VerificationPurpose,
    VERIFICATION_CODE_TTL_MINUTES,
};
use xcredits_store::{Store, StoreError};

use crate::clock::Clock;
use crate::ledger::Ledger;

/// Username length bounds, in characters.
const USERNAME_CHARS: std::ops::RangeInclusive<usize> = 3..=50;

/// Shortest accepted password, in characters.
const MIN_PASSWORD_CHARS: usize = 6;

/// What a purge removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Expired pending registrations deleted.
    pub registrations: usize,
    /// Expired verification codes deleted.
    pub verification_codes: usize,
}

/// Drives registrations from application to approval.
#[derive(Clone)]
pub struct RegistrationEngine {
    store: Arc<dyn Store>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RegistrationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationEngine").finish_non_exhaustive()
    }
}

impl RegistrationEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, ledger: Ledger, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Submit an application.
    ///
    /// A rejected or expired-and-unverified application holding the same
    /// email or username is cleared to make room.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidInput` for malformed fields and
    /// `CreditsError::AlreadyExists` if the email or username is taken.
    pub fn apply(&self, email: &str, username: &str, password: &str) -> Result<UserRegistration> {
        let email = normalize_email(email)?;
        let username = username.trim();
        if !USERNAME_CHARS.contains(&username.chars().count())
            || username.chars().any(char::is_whitespace)
        {
            return Err(CreditsError::InvalidInput(format!(
                "username must be {} to {} characters without spaces",
                USERNAME_CHARS.start(),
                USERNAME_CHARS.end()
            )));
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(CreditsError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }

        let now = self.clock.now();
        if let Some(existing) = self.store.find_registration_by_email(&email)? {
            self.clear_stale(&existing, "email", &email)?;
        }
        if let Some(existing) = self.store.find_registration_by_username(username)? {
            self.clear_stale(&existing, "username", username)?;
        }

        let registration = UserRegistration::pending(email, username, password, now);
        self.store.insert_registration(&registration)?;

        tracing::info!(
            registration_id = %registration.id,
            username = %registration.username,
            "Registration submitted"
        );
        Ok(registration)
    }

    /// Delete `existing` if it no longer holds its keys, else fail.
    fn clear_stale(&self, existing: &UserRegistration, field: &str, value: &str) -> Result<()> {
        let stale = match existing.status {
            RegistrationStatus::Rejected => true,
            RegistrationStatus::Pending => existing.is_expired_at(self.clock.now()),
            RegistrationStatus::Verified | RegistrationStatus::Registered => false,
        };
        if !stale {
            return Err(CreditsError::AlreadyExists {
                entity: "registration",
                id: format!("{field} {value}"),
            });
        }

        match self.store.delete_registration(&existing.id) {
            Ok(()) | Err(StoreError::NotFound { .. }) => {
                tracing::debug!(registration_id = %existing.id, "Stale registration cleared");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Confirm an email with its single-use token.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound` for unknown or used tokens and
    /// `CreditsError::Expired` past the application deadline.
    pub fn verify(&self, token: &str) -> Result<UserRegistration> {
        let registration = self
            .store
            .find_registration_by_token(token)?
            .ok_or_else(|| CreditsError::not_found("verification token", "<redacted>"))?;
        if registration.is_expired_at(self.clock.now()) {
            return Err(CreditsError::expired(
                "registration",
                registration.id.to_string(),
            ));
        }

        let verified = self.advance(&registration, RegistrationStatus::Verified)?;
        tracing::info!(registration_id = %verified.id, "Registration verified");
        Ok(verified)
    }

    /// Approve a verified application, creating the user's ledger account.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidState` unless the application is
    /// verified, and `CreditsError::PartialFailure` if it was marked
    /// registered but the account could not be created.
    pub fn approve(&self, id: &RegistrationId) -> Result<UserRegistration> {
        let registration = self.require(id)?;
        let mut approved = registration.clone();
        let user_id = UserId::generate();
        approved.user_id = Some(user_id);
        let approved = self.advance(&approved, RegistrationStatus::Registered)?;

        if let Err(e) = self.ledger.get_or_create_account(&user_id) {
            tracing::error!(
                registration_id = %id,
                user_id = %user_id,
                error = %e,
                "Registration approved but account creation failed"
            );
            return Err(CreditsError::PartialFailure {
                operation: "approve_registration",
                reference: id.to_string(),
                message: e.to_string(),
            });
        }

        tracing::info!(
            registration_id = %id,
            user_id = %user_id,
            username = %approved.username,
            "Registration approved"
        );
        Ok(approved)
    }

    /// Reject a pending or verified application.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidState` for registered or already rejected
    /// applications.
    pub fn reject(&self, id: &RegistrationId) -> Result<UserRegistration> {
        let registration = self.require(id)?;
        let rejected = self.advance(&registration, RegistrationStatus::Rejected)?;
        tracing::info!(registration_id = %id, "Registration rejected");
        Ok(rejected)
    }

    /// Applications awaiting email verification, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Storage` on persistence failure.
    pub fn list_pending(&self, page: PageRequest) -> Result<Paged<UserRegistration>> {
        self.list_by_status(RegistrationStatus::Pending, page)
    }

    /// Applications in `status`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Storage` on persistence failure.
    pub fn list_by_status(
        &self,
        status: RegistrationStatus,
        page: PageRequest,
    ) -> Result<Paged<UserRegistration>> {
        Ok(Paged {
            items: self
                .store
                .list_registrations_by_status(status, page.limit(), page.offset())?,
            total: self.store.count_registrations_by_status(status)?,
            page: page.page(),
            page_size: page.page_size(),
        })
    }

    /// Issue a fresh code for `email`, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidInput` for malformed emails.
    pub fn issue_code(&self, email: &str, purpose: VerificationPurpose) -> Result<VerificationCode> {
        let email = normalize_email(email)?;
        let now = self.clock.now();
        let code = VerificationCode {
            email,
            purpose,
            code: generate_verification_code(),
            used: false,
            expires_at: now + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES),
            created_at: now,
        };
        self.store.put_verification_code(&code)?;
        tracing::info!(purpose = purpose.as_str(), "Verification code issued");
        Ok(code)
    }

    /// Consume a verification code.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound` if no unused code exists,
    /// `CreditsError::Expired` past its window and
    /// `CreditsError::InvalidInput` for a wrong code.
    pub fn consume_code(&self, email: &str, purpose: VerificationPurpose, code: &str) -> Result<()> {
        let email = normalize_email(email)?;
        let stored = self
            .store
            .get_verification_code(&email, purpose)?
            .filter(|stored| !stored.used)
            .ok_or_else(|| CreditsError::not_found("verification code", email.as_str()))?;
        if stored.is_expired_at(self.clock.now()) {
            return Err(CreditsError::expired("verification code", email));
        }
        if stored.code != code.trim() {
            return Err(CreditsError::InvalidInput("verification code mismatch".into()));
        }

        match self
            .store
            .mark_verification_code_used(&email, purpose, &stored.code)
        {
            Ok(()) => Ok(()),
            // Consumed or replaced concurrently.
            Err(StoreError::Conflict { .. } | StoreError::NotFound { .. }) => {
                Err(CreditsError::not_found("verification code", email))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove expired pending applications and expired codes.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Storage` on persistence failure.
    pub fn purge_expired(&self) -> Result<PurgeReport> {
        let now = self.clock.now();
        let report = PurgeReport {
            registrations: self.store.delete_expired_registrations(now)?,
            verification_codes: self.store.delete_expired_verification_codes(now)?,
        };
        if report.registrations > 0 || report.verification_codes > 0 {
            tracing::info!(
                registrations = report.registrations,
                verification_codes = report.verification_codes,
                "Expired registration data purged"
            );
        }
        Ok(report)
    }

    fn require(&self, id: &RegistrationId) -> Result<UserRegistration> {
        self.store
            .get_registration(id)?
            .ok_or_else(|| CreditsError::not_found("registration", id.to_string()))
    }

    /// Move `registration` to `next` if its table allows, clearing the token.
    fn advance(
        &self,
        registration: &UserRegistration,
        next: RegistrationStatus,
    ) -> Result<UserRegistration> {
        let current = registration.status;
        if !current.can_transition_to(next) {
            return Err(CreditsError::invalid_state(
                "registration",
                registration.id.to_string(),
                current,
            ));
        }

        let updated = UserRegistration {
            status: next,
            token: None,
            updated_at: self.clock.now(),
            ..registration.clone()
        };
        match self.store.transition_registration(current, &updated) {
            Ok(()) => Ok(updated),
            Err(StoreError::Conflict { .. }) => {
                let winner = self.require(&registration.id)?;
                Err(CreditsError::invalid_state(
                    "registration",
                    registration.id.to_string(),
                    winner.status,
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
        && !email.chars().any(char::is_whitespace);
    if !valid {
        return Err(CreditsError::InvalidInput(format!(
            "invalid email address: {email:?}"
        )));
    }
    Ok(email)
}

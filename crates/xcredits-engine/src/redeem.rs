//! Redemption engine: batch code generation and single-code redemption.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use xcredits_core::{
    generate_redeem_code, CreditsError, PageRequest, Paged, RedeemCode, RedeemCodeUsage, Result,
    TransactionSource, UsageId, UserId,
};
use xcredits_store::{Store, StoreError};

use crate::clock::Clock;
use crate::ledger::{Ledger, MAX_CAS_ATTEMPTS};

/// Most codes one generate call may create.
pub const MAX_CODES_PER_BATCH: u32 = 1000;

/// Longest accepted code description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Fresh strings tried per code before giving up on collisions.
const MAX_GENERATE_ATTEMPTS: usize = 8;

/// Admin request to generate a batch of codes.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateCodes {
    /// Number of codes to create.
    pub count: u32,
    /// Credits each redemption grants.
    pub credits: i64,
    /// Redemptions allowed per code.
    #[serde(default = "one_use")]
    pub max_uses: u32,
    /// Free-text note shown to admins.
    #[serde(default)]
    pub description: String,
    /// Optional deadline.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

const fn one_use() -> u32 {
    1
}

impl GenerateCodes {
    fn validate(&self) -> Result<()> {
        if self.count == 0 || self.count > MAX_CODES_PER_BATCH {
            return Err(CreditsError::InvalidInput(format!(
                "count must be between 1 and {MAX_CODES_PER_BATCH}"
            )));
        }
        if self.credits < 1 {
            return Err(CreditsError::InvalidInput("credits must be at least 1".into()));
        }
        if self.max_uses < 1 {
            return Err(CreditsError::InvalidInput("max_uses must be at least 1".into()));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(CreditsError::InvalidInput(format!(
                "description must be at most {MAX_DESCRIPTION_CHARS} characters"
            )));
        }
        Ok(())
    }
}

/// Validates and consumes redeem codes.
#[derive(Clone)]
pub struct RedeemEngine {
    store: Arc<dyn Store>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RedeemEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedeemEngine").finish_non_exhaustive()
    }
}

impl RedeemEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, ledger: Ledger, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Generate `request.count` new codes.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidInput` if the request is out of range.
    pub fn generate(&self, admin: &UserId, request: &GenerateCodes) -> Result<Vec<RedeemCode>> {
        request.validate()?;
        let now = self.clock.now();

        let mut codes = Vec::with_capacity(request.count as usize);
        for _ in 0..request.count {
            codes.push(self.insert_fresh_code(admin, request, now)?);
        }

        tracing::info!(
            admin = %admin,
            count = codes.len(),
            credits = request.credits,
            max_uses = request.max_uses,
            "Redeem codes generated"
        );
        Ok(codes)
    }

    fn insert_fresh_code(
        &self,
        admin: &UserId,
        request: &GenerateCodes,
        now: DateTime<Utc>,
    ) -> Result<RedeemCode> {
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let code = RedeemCode {
                code: generate_redeem_code(),
                credits: request.credits,
                max_uses: request.max_uses,
                used_count: 0,
                enabled: true,
                expires_at: request.expires_at,
                created_by: *admin,
                description: request.description.clone(),
                created_at: now,
                updated_at: now,
                version: 0,
            };
            match self.store.insert_redeem_code(&code) {
                Ok(()) => return Ok(code),
                Err(StoreError::AlreadyExists { id, .. }) => {
                    tracing::debug!(code = %id, "Redeem code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CreditsError::Storage(
            "could not generate a unique redeem code".into(),
        ))
    }

    /// Redeem `code` for `user_id`, returning the credits granted.
    ///
    /// The use count is claimed first with a conditional update; the credit
    /// follows. A credit failure after the claim is reported as
    /// `CreditsError::PartialFailure`.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound` for unknown codes and
    /// `CreditsError::CodeUnusable` for disabled, expired or exhausted ones.
    pub fn redeem(&self, user_id: &UserId, code: &str) -> Result<i64> {
        let code = code.trim().to_ascii_uppercase();
        let usage = self.claim_use(user_id, &code)?;

        if let Err(e) = self.ledger.credit(
            user_id,
            usage.credits,
            TransactionSource::Redeem,
            &code,
            &format!("Redeem code {code}"),
        ) {
            tracing::error!(
                user_id = %user_id,
                code = %code,
                usage_id = %usage.id,
                credits = usage.credits,
                error = %e,
                "Redeem code consumed but credit failed"
            );
            return Err(CreditsError::PartialFailure {
                operation: "redeem",
                reference: format!("{code}/{}", usage.id),
                message: e.to_string(),
            });
        }

        tracing::info!(
            user_id = %user_id,
            code = %code,
            credits = usage.credits,
            "Redeem code used"
        );
        Ok(usage.credits)
    }

    /// Atomically bump the use count and record the usage.
    ///
    /// The write is conditional on the version read, so a concurrent disable
    /// forces a re-read instead of being overwritten.
    fn claim_use(&self, user_id: &UserId, code: &str) -> Result<RedeemCodeUsage> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .get_redeem_code(code)?
                .ok_or_else(|| CreditsError::not_found("redeem code", code))?;

            let now = self.clock.now();
            if let Some(reason) = current.unusable_reason(now) {
                return Err(CreditsError::CodeUnusable {
                    code: code.to_owned(),
                    reason,
                });
            }

            let usage = RedeemCodeUsage {
                id: UsageId::generate(),
                code: code.to_owned(),
                user_id: *user_id,
                credits: current.credits,
                used_at: now,
            };
            match self.store.update_redeem_code(
                current.version,
                &current.consumed(now),
                Some(&usage),
            ) {
                Ok(()) => return Ok(usage),
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(code, attempt, "Redeem code conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CreditsError::Storage(format!("contention on redeem code {code}")))
    }

    /// Enable or disable a code.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound` for unknown codes.
    pub fn set_enabled(&self, code: &str, enabled: bool) -> Result<RedeemCode> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .get_redeem_code(code)?
                .ok_or_else(|| CreditsError::not_found("redeem code", code))?;
            let updated = current.with_enabled(enabled, self.clock.now());
            match self
                .store
                .update_redeem_code(current.version, &updated, None)
            {
                Ok(()) => {
                    tracing::info!(code, enabled, "Redeem code updated");
                    return Ok(updated);
                }
                Err(StoreError::Conflict { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Err(CreditsError::Storage(format!("contention on redeem code {code}")))
    }

    /// All codes, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Storage` on persistence failure.
    pub fn list_codes(&self, page: PageRequest) -> Result<Paged<RedeemCode>> {
        Ok(Paged {
            items: self.store.list_redeem_codes(page.limit(), page.offset())?,
            total: self.store.count_redeem_codes()?,
            page: page.page(),
            page_size: page.page_size(),
        })
    }

    /// Redemptions of `code`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound` for unknown codes.
    pub fn usages(&self, code: &str, page: PageRequest) -> Result<Paged<RedeemCodeUsage>> {
        if self.store.get_redeem_code(code)?.is_none() {
            return Err(CreditsError::not_found("redeem code", code));
        }
        Ok(Paged {
            items: self
                .store
                .list_redeem_code_usages(code, page.limit(), page.offset())?,
            total: self.store.count_redeem_code_usages(code)?,
            page: page.page(),
            page_size: page.page_size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use xcredits_store::MemoryStore;

    fn engine() -> (RedeemEngine, Ledger, Arc<ManualClock>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(Arc::clone(&store));
        let clock = Arc::new(ManualClock::default());
        (
            RedeemEngine::new(store, ledger.clone(), clock.clone()),
            ledger,
            clock,
        )
    }

    fn request(count: u32, credits: i64, max_uses: u32) -> GenerateCodes {
        GenerateCodes {
            count,
            credits,
            max_uses,
            description: String::new(),
            expires_at: None,
        }
    }

    #[test]
    fn generated_codes_are_unique_and_prefixed() {
        let (engine, _, _) = engine();
        let codes = engine
            .generate(&UserId::system(), &request(50, 10, 1))
            .unwrap();
        let mut strings: Vec<_> = codes.iter().map(|c| c.code.clone()).collect();
        strings.sort();
        strings.dedup();
        assert_eq!(strings.len(), 50);
        assert!(strings.iter().all(|c| c.starts_with("XC")));
    }

    #[test]
    fn generate_validates_ranges() {
        let (engine, _, _) = engine();
        let admin = UserId::system();
        assert!(engine.generate(&admin, &request(0, 10, 1)).is_err());
        assert!(engine.generate(&admin, &request(1001, 10, 1)).is_err());
        assert!(engine.generate(&admin, &request(1, 0, 1)).is_err());
        assert!(engine.generate(&admin, &request(1, 10, 0)).is_err());
        let long = GenerateCodes {
            description: "x".repeat(MAX_DESCRIPTION_CHARS + 1),
            ..request(1, 10, 1)
        };
        assert!(engine.generate(&admin, &long).is_err());
    }

    #[test]
    fn redeem_credits_and_exhausts() {
        let (engine, ledger, _) = engine();
        let code = engine
            .generate(&UserId::system(), &request(1, 10, 1))
            .unwrap()
            .remove(0);
        let user = UserId::generate();

        assert_eq!(engine.redeem(&user, &code.code).unwrap(), 10);
        assert_eq!(ledger.balance(&user).unwrap().balance, 10);
        assert!(matches!(
            engine.redeem(&user, &code.code),
            Err(CreditsError::CodeUnusable {
                reason: "exhausted",
                ..
            })
        ));
    }

    #[test]
    fn same_user_may_redeem_until_exhausted() {
        let (engine, ledger, _) = engine();
        let code = engine
            .generate(&UserId::system(), &request(1, 4, 3))
            .unwrap()
            .remove(0);
        let user = UserId::generate();

        for _ in 0..3 {
            engine.redeem(&user, &code.code).unwrap();
        }
        assert_eq!(ledger.balance(&user).unwrap().balance, 12);
        assert!(engine.redeem(&user, &code.code).is_err());

        let usages = engine.usages(&code.code, PageRequest::default()).unwrap();
        assert_eq!(usages.total, 3);
        assert!(usages.items.iter().all(|u| u.user_id == user));
    }

    #[test]
    fn unknown_disabled_and_expired_codes() {
        let (engine, _, clock) = engine();
        let user = UserId::generate();
        assert!(matches!(
            engine.redeem(&user, "XCNOPE"),
            Err(CreditsError::NotFound { .. })
        ));

        let expiring = GenerateCodes {
            expires_at: Some(clock.now() + Duration::days(1)),
            ..request(2, 5, 10)
        };
        let codes = engine.generate(&UserId::system(), &expiring).unwrap();

        engine.set_enabled(&codes[0].code, false).unwrap();
        assert!(matches!(
            engine.redeem(&user, &codes[0].code),
            Err(CreditsError::CodeUnusable {
                reason: "disabled",
                ..
            })
        ));

        clock.advance(Duration::days(2));
        assert!(matches!(
            engine.redeem(&user, &codes[1].code),
            Err(CreditsError::CodeUnusable {
                reason: "expired",
                ..
            })
        ));
    }

    #[test]
    fn redeem_normalizes_input() {
        let (engine, _, _) = engine();
        let code = engine
            .generate(&UserId::system(), &request(1, 1, 1))
            .unwrap()
            .remove(0);
        let typed = format!("  {}  ", code.code.to_ascii_lowercase());
        assert_eq!(engine.redeem(&UserId::generate(), &typed).unwrap(), 1);
    }
}

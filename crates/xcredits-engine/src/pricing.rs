//! Pricing resolver and rule administration.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use xcredits_core::{
    ancestor_prefixes, normalize_path, CreditsError, PageRequest, Paged, PricingRule, Result,
    UserId,
};
use xcredits_store::Store;

use crate::clock::Clock;

/// Admin input for creating or replacing a rule.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleInput {
    /// Path the rule is keyed by.
    pub path: String,
    /// Whether the path is a folder.
    #[serde(default)]
    pub is_folder: bool,
    /// Credits required (0 = free).
    pub credits: i64,
    /// Whether descendants inherit the rule.
    #[serde(default)]
    pub inheritable: bool,
    /// Whether the rule is in force.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

const fn enabled_by_default() -> bool {
    true
}

/// Resolves the price of a path from exact and inherited rules.
#[derive(Clone)]
pub struct PricingResolver {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for PricingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PricingResolver").finish_non_exhaustive()
    }
}

impl PricingResolver {
    /// Create a resolver over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Credits required to download `path`; 0 when no rule applies.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidInput` for relative paths and
    /// `CreditsError::Storage` on persistence failure.
    pub fn resolve(&self, path: &str) -> Result<i64> {
        Ok(self.effective_rule(path)?.map_or(0, |rule| rule.credits))
    }

    /// The rule that decides the price of `path`, if any.
    ///
    /// An active exact rule wins regardless of its inheritable flag. Otherwise
    /// the longest active, inheritable folder rule whose path is a string
    /// prefix of `path` applies.
    ///
    /// # Errors
    ///
    /// Same as [`PricingResolver::resolve`].
    pub fn effective_rule(&self, path: &str) -> Result<Option<PricingRule>> {
        let path = normalize_path(path)?;

        if let Some(rule) = self.store.get_pricing_rule(&path)? {
            if rule.is_active() {
                return Ok(Some(rule));
            }
        }

        let prefixes = ancestor_prefixes(&path);
        Ok(self
            .store
            .get_pricing_rules(&prefixes)?
            .into_iter()
            .flatten()
            .find(PricingRule::applies_to_descendants))
    }

    /// Create or replace the rule at `input.path`.
    ///
    /// Replacing keeps the original creator and creation time and revives a
    /// soft-deleted rule.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidInput` for negative credits or a relative
    /// path.
    pub fn set_rule(&self, admin: &UserId, input: RuleInput) -> Result<PricingRule> {
        if input.credits < 0 {
            return Err(CreditsError::InvalidInput(
                "credits must not be negative".into(),
            ));
        }
        let path = normalize_path(&input.path)?;
        let now = self.clock.now();

        let (created_by, created_at) = match self.store.get_pricing_rule(&path)? {
            Some(existing) => (existing.created_by, existing.created_at),
            None => (*admin, now),
        };
        let rule = PricingRule {
            path,
            is_folder: input.is_folder,
            credits: input.credits,
            inheritable: input.inheritable,
            enabled: input.enabled,
            created_by,
            created_at,
            updated_at: now,
            deleted_at: None,
        };
        self.store.put_pricing_rule(&rule)?;

        tracing::info!(
            admin = %admin,
            path = %rule.path,
            credits = rule.credits,
            inheritable = rule.inheritable,
            "Pricing rule saved"
        );
        Ok(rule)
    }

    /// The effective rule for `path`.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound` if no rule applies.
    pub fn get_rule(&self, path: &str) -> Result<PricingRule> {
        self.effective_rule(path)?
            .ok_or_else(|| CreditsError::not_found("pricing rule", path))
    }

    /// Soft-delete the rule stored at exactly `path`.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound` if there is no undeleted rule there.
    pub fn delete_rule(&self, path: &str) -> Result<PricingRule> {
        let path = normalize_path(path)?;
        let mut rule = self
            .store
            .get_pricing_rule(&path)?
            .filter(|rule| rule.deleted_at.is_none())
            .ok_or_else(|| CreditsError::not_found("pricing rule", path.as_str()))?;

        let now = self.clock.now();
        rule.deleted_at = Some(now);
        rule.updated_at = now;
        self.store.put_pricing_rule(&rule)?;

        tracing::info!(path = %rule.path, "Pricing rule deleted");
        Ok(rule)
    }

    /// Undeleted rules, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Storage` on persistence failure.
    pub fn list_rules(&self, page: PageRequest) -> Result<Paged<PricingRule>> {
        Ok(Paged {
            items: self.store.list_pricing_rules(page.limit(), page.offset())?,
            total: self.store.count_pricing_rules()?,
            page: page.page(),
            page_size: page.page_size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use xcredits_store::MemoryStore;

    fn resolver() -> PricingResolver {
        PricingResolver::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    fn folder(path: &str, credits: i64, inheritable: bool) -> RuleInput {
        RuleInput {
            path: path.into(),
            is_folder: true,
            credits,
            inheritable,
            enabled: true,
        }
    }

    #[test]
    fn longest_inheritable_prefix_wins() {
        let pricing = resolver();
        let admin = UserId::system();
        pricing.set_rule(&admin, folder("/a", 5, true)).unwrap();
        pricing.set_rule(&admin, folder("/a/b", 2, false)).unwrap();

        assert_eq!(pricing.resolve("/a/b/c").unwrap(), 5);
        assert_eq!(pricing.resolve("/a/b").unwrap(), 2);
        assert_eq!(pricing.resolve("/x").unwrap(), 0);
    }

    #[test]
    fn deeper_inheritable_rule_overrides_shallower() {
        let pricing = resolver();
        let admin = UserId::system();
        pricing.set_rule(&admin, folder("/", 1, true)).unwrap();
        pricing.set_rule(&admin, folder("/movies", 8, true)).unwrap();

        assert_eq!(pricing.resolve("/movies/x.mkv").unwrap(), 8);
        assert_eq!(pricing.resolve("/music/y.mp3").unwrap(), 1);
    }

    #[test]
    fn exact_zero_rule_makes_path_free() {
        let pricing = resolver();
        let admin = UserId::system();
        pricing.set_rule(&admin, folder("/a", 5, true)).unwrap();
        pricing
            .set_rule(
                &admin,
                RuleInput {
                    path: "/a/free.txt".into(),
                    is_folder: false,
                    credits: 0,
                    inheritable: false,
                    enabled: true,
                },
            )
            .unwrap();

        assert_eq!(pricing.resolve("/a/free.txt").unwrap(), 0);
        assert_eq!(pricing.resolve("/a/other.txt").unwrap(), 5);
    }

    #[test]
    fn disabled_and_deleted_rules_do_not_resolve() {
        let pricing = resolver();
        let admin = UserId::system();
        pricing.set_rule(&admin, folder("/a", 5, true)).unwrap();
        pricing
            .set_rule(
                &admin,
                RuleInput {
                    enabled: false,
                    ..folder("/a/b", 9, true)
                },
            )
            .unwrap();
        assert_eq!(pricing.resolve("/a/b/c").unwrap(), 5);

        pricing.delete_rule("/a").unwrap();
        assert_eq!(pricing.resolve("/a/b/c").unwrap(), 0);
        assert!(matches!(
            pricing.delete_rule("/a"),
            Err(CreditsError::NotFound { .. })
        ));
    }

    #[test]
    fn set_rule_revives_and_keeps_creator() {
        let pricing = resolver();
        let creator = UserId::generate();
        let first = pricing.set_rule(&creator, folder("/a/", 5, true)).unwrap();
        assert_eq!(first.path, "/a");
        pricing.delete_rule("/a").unwrap();

        let revived = pricing
            .set_rule(&UserId::generate(), folder("/a", 6, true))
            .unwrap();
        assert_eq!(revived.created_by, creator);
        assert!(revived.deleted_at.is_none());
        assert_eq!(pricing.list_rules(PageRequest::default()).unwrap().total, 1);
    }

    #[test]
    fn get_rule_reports_inherited_rule() {
        let pricing = resolver();
        pricing
            .set_rule(&UserId::system(), folder("/a", 5, true))
            .unwrap();
        assert_eq!(pricing.get_rule("/a/b/c").unwrap().path, "/a");
        assert!(matches!(
            pricing.get_rule("/z"),
            Err(CreditsError::NotFound { .. })
        ));
    }

    #[test]
    fn folder_rule_matches_by_string_prefix() {
        let pricing = resolver();
        pricing
            .set_rule(&UserId::system(), folder("/a", 5, true))
            .unwrap();
        assert_eq!(pricing.resolve("/ab/c").unwrap(), 5);
    }

    #[test]
    fn overlong_path_is_rejected_before_lookup() {
        let pricing = resolver();
        let path = format!("/{}", "x".repeat(xcredits_core::MAX_PATH_CHARS));
        assert!(matches!(
            pricing.resolve(&path),
            Err(CreditsError::InvalidInput(_))
        ));
    }

    #[test]
    fn negative_credits_are_rejected() {
        let pricing = resolver();
        assert!(matches!(
            pricing.set_rule(&UserId::system(), folder("/a", -1, true)),
            Err(CreditsError::InvalidInput(_))
        ));
    }
}

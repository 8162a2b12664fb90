//! Path pricing rules for xcredits.
//!
//! A rule prices either one exact path or, when it is an inheritable folder
//! rule, every descendant path that has no more specific rule of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CreditsError, Result, UserId};

/// A pricing rule keyed by exact path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    /// Normalized path of the file or folder.
    pub path: String,

    /// Whether the rule describes a folder.
    pub is_folder: bool,

    /// Credits required to download. Zero means free.
    pub credits: i64,

    /// Whether descendants use this rule absent a more specific one.
    pub inheritable: bool,

    /// Disabled rules never resolve.
    pub enabled: bool,

    /// The admin who created the rule.
    pub created_by: UserId,

    /// When the rule was created.
    pub created_at: DateTime<Utc>,

    /// When the rule was last updated.
    pub updated_at: DateTime<Utc>,

    /// Set when the rule was soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PricingRule {
    /// Whether the rule participates in resolution.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && self.deleted_at.is_none()
    }

    /// Whether the rule can price descendants of its path.
    #[must_use]
    pub fn applies_to_descendants(&self) -> bool {
        self.is_active() && self.is_folder && self.inheritable
    }
}

/// Longest accepted path, in characters.
///
/// Resolution reads one candidate rule per character, so this also bounds
/// the lookups behind every price check.
pub const MAX_PATH_CHARS: usize = 1024;

/// Normalize a path for use as a rule key.
///
/// Paths must be absolute. A trailing slash is dropped, except for the root.
///
/// # Errors
///
/// Returns `CreditsError::InvalidInput` for empty, relative or overlong paths.
pub fn normalize_path(path: &str) -> Result<String> {
    let trimmed = path.trim();
    if !trimmed.starts_with('/') {
        return Err(CreditsError::InvalidInput(format!(
            "path must be absolute: {path:?}"
        )));
    }
    if trimmed.chars().count() > MAX_PATH_CHARS {
        return Err(CreditsError::InvalidInput(format!(
            "path must be at most {MAX_PATH_CHARS} characters"
        )));
    }
    if trimmed.len() > 1 {
        if let Some(stripped) = trimmed.strip_suffix('/') {
            return Ok(stripped.to_string());
        }
    }
    Ok(trimmed.to_string())
}

/// All proper string prefixes of `path`, longest first.
///
/// Prefixes are cut on character boundaries so that "longest" is measured in
/// characters. Ancestor rules are looked up in this order; the first active,
/// inheritable folder rule found is the most specific one.
#[must_use]
pub fn ancestor_prefixes(path: &str) -> Vec<&str> {
    let mut prefixes: Vec<&str> = path
        .char_indices()
        .skip(1)
        .map(|(idx, _)| &path[..idx])
        .collect();
    prefixes.reverse();
    prefixes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(enabled: bool, is_folder: bool, inheritable: bool) -> PricingRule {
        let now = Utc::now();
        PricingRule {
            path: "/a".into(),
            is_folder,
            credits: 5,
            inheritable,
            enabled,
            created_by: UserId::system(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn normalize_strips_trailing_slash() {
        assert_eq!(normalize_path("/a/b/").unwrap(), "/a/b");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert!(normalize_path("a/b").is_err());
        assert!(normalize_path("").is_err());
    }

    #[test]
    fn normalize_rejects_overlong_paths() {
        let longest = format!("/{}", "电".repeat(MAX_PATH_CHARS - 1));
        assert!(normalize_path(&longest).is_ok());
        let overlong = format!("{longest}x");
        assert!(matches!(
            normalize_path(&overlong),
            Err(CreditsError::InvalidInput(_))
        ));
    }

    #[test]
    fn prefixes_are_longest_first() {
        assert_eq!(ancestor_prefixes("/a/b"), vec!["/a/", "/a", "/"]);
        assert!(ancestor_prefixes("/").is_empty());
    }

    #[test]
    fn prefixes_respect_char_boundaries() {
        // Multi-byte characters are never split.
        assert_eq!(ancestor_prefixes("/电影"), vec!["/电", "/"]);
    }

    #[test]
    fn descendant_rules_need_folder_inheritable_active() {
        assert!(rule(true, true, true).applies_to_descendants());
        assert!(!rule(false, true, true).applies_to_descendants());
        assert!(!rule(true, false, true).applies_to_descendants());
        assert!(!rule(true, true, false).applies_to_descendants());

        let mut deleted = rule(true, true, true);
        deleted.deleted_at = Some(Utc::now());
        assert!(!deleted.applies_to_descendants());
    }
}

//! Pagination helpers.

use serde::{Deserialize, Serialize};

/// Largest page size the service returns.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when the caller does not pass one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// A 1-based page request. Always clamped: `page >= 1`, `page_size` in `[1, 100]`.
///
/// Deserialized requests go through the same clamp as [`PageRequest::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPageRequest")]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

#[derive(Deserialize)]
struct RawPageRequest {
    page: u32,
    page_size: u32,
}

impl From<RawPageRequest> for PageRequest {
    fn from(raw: RawPageRequest) -> Self {
        Self::new(raw.page, raw.page_size)
    }
}

impl PageRequest {
    /// Build a clamped page request.
    #[must_use]
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// 1-based page number.
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// Items per page.
    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of items to skip.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page as usize).saturating_sub(1) * self.page_size as usize
    }

    /// Number of items to take.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.page_size as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total number of items across all pages.
    pub total: u64,
    /// The page that was returned.
    pub page: u32,
    /// The page size that was applied.
    pub page_size: u32,
}

impl<T> Paged<T> {
    /// Map the items while keeping paging metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_values() {
        assert_eq!(PageRequest::new(0, 0), PageRequest { page: 1, page_size: 1 });
        assert_eq!(PageRequest::new(3, 500).page_size(), MAX_PAGE_SIZE);
    }

    #[test]
    fn deserialized_requests_are_clamped() {
        let page: PageRequest =
            serde_json::from_str(r#"{"page": 0, "page_size": 10000}"#).unwrap();
        assert_eq!(page.page(), 1);
        assert_eq!(page.page_size(), MAX_PAGE_SIZE);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn offset_is_zero_based() {
        let page = PageRequest::new(3, 20);
        assert_eq!(page.offset(), 40);
        assert_eq!(page.limit(), 20);
    }
}

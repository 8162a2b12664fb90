//! HTTP request handlers.

pub mod admin;
pub mod credits;
pub mod downloads;
pub mod health;
pub mod orders;
pub mod redeem;
pub mod registration;
pub mod webhooks;

use serde::Deserialize;
use xcredits_core::{PageRequest, DEFAULT_PAGE_SIZE};

/// `?page=&page_size=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// 1-based page number (default: 1).
    pub page: Option<u32>,
    /// Items per page (default: 20, max: 100).
    pub page_size: Option<u32>,
}

impl PageQuery {
    /// The clamped page request.
    #[must_use]
    pub fn request(&self) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

/// `?path=` query parameter.
#[derive(Debug, Deserialize)]
pub struct PathQuery {
    /// Virtual file path.
    pub path: String,
}

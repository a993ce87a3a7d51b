//! Page arithmetic for every list endpoint.

use serde::{Deserialize, Serialize};

/// Maximum rows per page
pub const MAX_PAGE_SIZE: u32 = 100;

/// Rows per page when the request does not say
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Page number (1-indexed)
    pub page: u32,
    /// Rows per page (max 100)
    pub page_size: u32,
}

impl Pagination {
    /// Create pagination with validation.
    ///
    /// - Page is clamped to minimum of 1
    /// - Page size is clamped to 1..=100
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Build from optional query-string values, falling back to `default_size`.
    pub fn from_query(page: Option<u32>, page_size: Option<u32>, default_size: u32) -> Self {
        Self::new(page.unwrap_or(1), page_size.unwrap_or(default_size))
    }

    /// SQL OFFSET value.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    /// SQL LIMIT value.
    pub fn limit(&self) -> u32 {
        self.page_size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of rows plus the size of the whole result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }

    /// `ceil(total / page_size)`; zero rows means zero pages.
    pub fn total_pages(&self) -> u64 {
        let size = self.page_size.max(1) as u64;
        self.total.div_ceil(size)
    }

    pub fn has_next(&self) -> bool {
        (self.page as u64) < self.total_pages()
    }
}

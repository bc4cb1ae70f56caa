//! Pagination types for list endpoints.
//!
//! Provides consistent page-based pagination across all list endpoints.

use serde::{Deserialize, Serialize};

/// Query parameters for paginated list endpoints.
#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    /// Page number, starting at 1
    #[serde(default)]
    pub page: Option<i64>,
    /// Items per page (default: 20, max: 100)
    #[serde(default)]
    pub per_page: Option<i64>,
}

impl PageQuery {
    /// Get the page number, minimum 1
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Get the page size, clamped to valid range
    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }

    /// Rows to skip for the current page
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}

/// Page metadata echoed back to the caller.
#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub page: i64,
    pub per_page: i64,
    /// Total number of items (across all pages)
    pub total: i64,
}

/// Paginated response wrapper for list endpoints.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    /// The items in this page
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Paginated<T> {
    /// Create a new paginated response
    pub fn new(items: Vec<T>, total: i64, query: &PageQuery) -> Self {
        Self {
            items,
            pagination: PageInfo {
                page: query.page(),
                per_page: query.per_page(),
                total,
            },
        }
    }
}

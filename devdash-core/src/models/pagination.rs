//! Pagination types shared by every list endpoint

use serde::{Deserialize, Serialize};

/// Maximum items per page
pub const MAX_LIMIT: u32 = 100;

/// Default items per page
pub const DEFAULT_LIMIT: u32 = 50;

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Page number (1-indexed)
    pub page: u32,
    /// Items per page (max 100)
    pub limit: u32,
}

impl Pagination {
    /// Create pagination with clamping.
    ///
    /// - Page is clamped to minimum of 1
    /// - Limit is clamped to 1..=100
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Build from optional query values, applying defaults.
    pub fn from_options(page: Option<u32>, limit: Option<u32>) -> Self {
        Self::new(page.unwrap_or(1), limit.unwrap_or(DEFAULT_LIMIT))
    }

    /// Calculate SQL OFFSET value.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    /// Get LIMIT value.
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// A page of results plus the total count across all pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: Pagination) -> Self {
        Self {
            items,
            total,
            page: page.page,
            limit: page.limit,
        }
    }

    /// Total number of pages: `ceil(total / limit)`, zero when empty.
    pub fn total_pages(&self) -> u32 {
        let total = self.total.max(0) as u64;
        let limit = self.limit.max(1) as u64;
        total.div_ceil(limit) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Wire-format summary for the `pagination` field of list responses.
    pub fn page_info(&self) -> PageInfo {
        PageInfo {
            current_page: self.page,
            per_page: self.limit,
            total_records: self.total,
            total_pages: self.total_pages(),
            has_next: self.has_next(),
            has_prev: self.has_prev(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }
}

/// `pagination` object in list responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub current_page: u32,
    pub per_page: u32,
    pub total_records: i64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Query parameters for endpoints that only paginate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PaginationParams> for Pagination {
    fn from(params: PaginationParams) -> Self {
        Self::from_options(params.page, params.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged(total: i64, page: u32, limit: u32) -> Paginated<()> {
        Paginated {
            items: vec![],
            total,
            page,
            limit,
        }
    }

    #[test]
    fn offset_calculation() {
        assert_eq!(Pagination::new(1, 10).offset(), 0);
        assert_eq!(Pagination::new(2, 10).offset(), 10);
        assert_eq!(Pagination::new(3, 25).offset(), 50);
    }

    #[test]
    fn clamps_page_and_limit() {
        assert_eq!(Pagination::new(0, 10).page, 1);
        assert_eq!(Pagination::new(1, 0).limit, 1);
        assert_eq!(Pagination::new(1, 999).limit, 100);
    }

    #[test]
    fn defaults() {
        let p = Pagination::from_options(None, None);
        assert_eq!(p, Pagination { page: 1, limit: 50 });
    }

    #[test]
    fn total_pages_is_ceiling() {
        assert_eq!(paged(0, 1, 50).total_pages(), 0);
        assert_eq!(paged(1, 1, 50).total_pages(), 1);
        assert_eq!(paged(50, 1, 50).total_pages(), 1);
        assert_eq!(paged(51, 1, 50).total_pages(), 2);
        assert_eq!(paged(125, 1, 50).total_pages(), 3);
    }

    #[test]
    fn has_next_prev() {
        let p = paged(30, 1, 10);
        assert!(p.has_next());
        assert!(!p.has_prev());

        let p = paged(30, 3, 10);
        assert!(!p.has_next());
        assert!(p.has_prev());
    }

    #[test]
    fn page_info_shape() {
        let info = paged(120, 2, 50).page_info();
        assert_eq!(
            info,
            PageInfo {
                current_page: 2,
                per_page: 50,
                total_records: 120,
                total_pages: 3,
                has_next: true,
                has_prev: true,
            }
        );
    }
}

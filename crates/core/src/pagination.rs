//! Page-number pagination.
//!
//! Page numbers are 1-based. Page sizes are clamped to
//! [`MIN_PAGE_SIZE`]..=[`MAX_PAGE_SIZE`] so a listing can never turn into an
//! unbounded scan.

use serde::Serialize;

/// Smallest accepted page size.
pub const MIN_PAGE_SIZE: i64 = 1;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page size used when the client does not ask for one.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    /// Build a request from raw query values, clamping out-of-range input.
    pub fn new(page: Option<i64>, size: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            size: size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE),
        }
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.size)
    }

    /// Row limit for this page.
    pub fn limit(&self) -> i64 {
        self.size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Total number of pages for `total` rows. An empty result still has one page.
pub fn page_count(total: i64, size: i64) -> i64 {
    if total <= 0 {
        1
    } else {
        (total + size - 1) / size
    }
}

/// One page of results plus navigation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: i64,
    pub size: i64,
    pub pages: i64,
    pub next_url: Option<String>,
    pub prev_url: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Assemble a page. `link` renders the URL for a given page number.
    pub fn new(
        request: PageRequest,
        total: i64,
        results: Vec<T>,
        link: impl Fn(i64, i64) -> String,
    ) -> Self {
        let pages = page_count(total, request.size);
        let next_url = (request.page < pages).then(|| link(request.page + 1, request.size));
        let prev_url = (request.page > 1).then(|| link(request.page - 1, request.size));

        Self {
            count: total,
            page: request.page,
            size: request.size,
            pages,
            next_url,
            prev_url,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(page: i64, size: i64) -> String {
        format!("/jobs?page={page}&size={size}")
    }

    #[test]
    fn clamps_page_and_size() {
        assert_eq!(PageRequest::new(Some(0), Some(0)), PageRequest { page: 1, size: 1 });
        assert_eq!(PageRequest::new(Some(-3), Some(1000)).size, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(None, None).size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn offset_follows_page_number() {
        assert_eq!(PageRequest::new(Some(1), Some(10)).offset(), 0);
        assert_eq!(PageRequest::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(0, 10), 1);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(25, 10), 3);
    }

    #[test]
    fn middle_page_has_both_links() {
        let page = Page::new(PageRequest::new(Some(2), Some(10)), 25, vec![0; 10], link);
        assert_eq!(page.pages, 3);
        assert_eq!(page.results.len(), 10);
        assert_eq!(page.prev_url.as_deref(), Some("/jobs?page=1&size=10"));
        assert_eq!(page.next_url.as_deref(), Some("/jobs?page=3&size=10"));
    }

    #[test]
    fn last_page_has_no_next_link() {
        let page = Page::new(PageRequest::new(Some(3), Some(10)), 25, vec![0; 5], link);
        assert!(page.next_url.is_none());
        assert!(page.prev_url.is_some());
    }

    #[test]
    fn first_page_has_no_prev_link() {
        let page = Page::new(PageRequest::new(Some(1), Some(10)), 25, vec![0; 10], link);
        assert!(page.prev_url.is_none());
        assert!(page.next_url.is_some());
    }
}

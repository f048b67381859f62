//! Page requests and page metadata shared by every list endpoint
//!
//! Pages are 1-based. `limit` is clamped to `1..=MAX_LIMIT`.

use serde::{Deserialize, Serialize};

/// Upper bound on page size
pub const MAX_LIMIT: u32 = 100;

/// A requested page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Builds a page request from optional query values
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT),
        }
    }

    /// Row offset for SQL `OFFSET`
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    /// Page size for SQL `LIMIT`
    pub fn limit(&self) -> i64 {
        i64::from(self.limit)
    }

    /// Slices an already ordered collection
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as i64;
        let items = items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .collect();
        Page::new(items, *self, total)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None, 10)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Pagination metadata returned in the `meta` field of list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(request: PageRequest, total: i64) -> Self {
        let limit = i64::from(request.limit);
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

/// One page of results
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        Self {
            items,
            meta: PageMeta::new(request, total),
        }
    }

    /// Converts every item while keeping the metadata
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults_and_clamping() {
        let req = PageRequest::new(None, None, 10);
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, 10);

        let req = PageRequest::new(Some(0), Some(500), 10);
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, MAX_LIMIT);

        let req = PageRequest::new(Some(3), Some(20), 10);
        assert_eq!(req.offset(), 40);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let req = PageRequest::new(Some(1), Some(10), 10);
        assert_eq!(PageMeta::new(req, 0).total_pages, 0);
        assert_eq!(PageMeta::new(req, 10).total_pages, 1);
        assert_eq!(PageMeta::new(req, 11).total_pages, 2);
    }

    #[test]
    fn test_slice_takes_requested_window() {
        let req = PageRequest::new(Some(2), Some(2), 10);
        let page = req.slice(vec![1, 2, 3, 4, 5]);
        assert_eq!(page.items, vec![3, 4]);
        assert_eq!(page.meta.total, 5);
        assert_eq!(page.meta.total_pages, 3);
    }

    #[test]
    fn test_meta_serializes_camel_case() {
        let meta = PageMeta::new(PageRequest::default(), 25);
        let json = serde_json::to_value(meta).unwrap();
        assert_eq!(json["totalPages"], 3);
        assert_eq!(json["total"], 25);
    }
}

//! Offset pagination helpers shared by listing endpoints.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PAGE_LIMIT: u32 = 12;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("page must be at least 1")]
    InvalidPage,
    #[error("limit must be at least 1")]
    InvalidLimit,
}

/// Limits applied when a client omits or exceeds the page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PaginationSettings {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Resolve client-supplied values; oversized limits are clamped, zero is rejected.
    pub fn resolve(
        page: Option<u32>,
        limit: Option<u32>,
        settings: PaginationSettings,
    ) -> Result<Self, PaginationError> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(PaginationError::InvalidPage);
        }
        let limit = limit.unwrap_or(settings.default_limit);
        if limit == 0 {
            return Err(PaginationError::InvalidLimit);
        }
        Ok(Self {
            page,
            limit: limit.min(settings.max_limit),
        })
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// One page of results together with the unpaginated total.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn new(request: PageRequest, total: u64) -> Self {
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages: total.div_ceil(u64::from(request.limit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_applies_defaults_and_clamps() {
        let settings = PaginationSettings::default();
        assert_eq!(
            PageRequest::resolve(None, None, settings),
            Ok(PageRequest { page: 1, limit: 12 })
        );
        assert_eq!(
            PageRequest::resolve(Some(3), Some(500), settings),
            Ok(PageRequest {
                page: 3,
                limit: 100
            })
        );
    }

    #[test]
    fn resolve_rejects_zero_values() {
        let settings = PaginationSettings::default();
        assert_eq!(
            PageRequest::resolve(Some(0), None, settings),
            Err(PaginationError::InvalidPage)
        );
        assert_eq!(
            PageRequest::resolve(None, Some(0), settings),
            Err(PaginationError::InvalidLimit)
        );
    }

    #[test]
    fn meta_rounds_total_pages_up() {
        let request = PageRequest { page: 2, limit: 12 };
        assert_eq!(request.offset(), 12);
        assert_eq!(PageMeta::new(request, 25).total_pages, 3);
        assert_eq!(PageMeta::new(request, 24).total_pages, 2);
        assert_eq!(PageMeta::new(request, 0).total_pages, 0);
    }
}

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Requested page, 1-based. Doubles as the `?page&limit` query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> PageRequest {
        PageRequest { page, limit }
    }

    pub fn normalized(self) -> PageRequest {
        PageRequest {
            page: self.page.max(1),
            limit: match self.limit {
                0 => DEFAULT_PAGE_SIZE,
                limit => limit.min(MAX_PAGE_SIZE),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            current_page: 1,
            total_pages: 1,
            total_items: 0,
        }
    }
}

impl Pagination {
    /// The requested page is clamped into `1..=total_pages`, and an empty
    /// collection still has one (empty) page.
    pub fn new(requested_page: u32, limit: u32, total_items: u64) -> Pagination {
        let limit = u64::from(limit.max(1));
        let pages = total_items.div_ceil(limit).max(1);
        let total_pages = u32::try_from(pages).unwrap_or(u32::MAX);
        Pagination {
            current_page: requested_page.clamp(1, total_pages),
            total_pages,
            total_items,
        }
    }

    pub fn offset(&self, limit: u32) -> u64 {
        u64::from(self.current_page - 1) * u64::from(limit)
    }

    pub fn with_total(&self, limit: u32, total_items: u64) -> Pagination {
        Pagination::new(self.current_page, limit, total_items)
    }

    pub fn validate(&self, page_len: usize) -> Result<(), ValidationError> {
        if self.current_page == 0 || self.total_pages == 0 {
            return Err(ValidationError::new("pages are numbered from 1"));
        }
        if self.current_page > self.total_pages {
            return Err(ValidationError::new(format!(
                "current page {} is beyond the last page {}",
                self.current_page, self.total_pages
            )));
        }
        if page_len as u64 > self.total_items {
            return Err(ValidationError::new(format!(
                "page holds {} items but only {} exist",
                page_len, self.total_items
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, pagination: Pagination) -> Paginated<T> {
        Paginated { data, pagination }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pagination.validate(self.data.len())
    }
}

impl<T> Default for Paginated<T> {
    fn default() -> Self {
        Paginated {
            data: Vec::new(),
            pagination: Pagination::default(),
        }
    }
}

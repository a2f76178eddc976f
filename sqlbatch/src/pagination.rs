//! Offset pagination metadata for list queries built next to batch writes.

use sqlbatch_sql_builder::{limit_offset, SqlWriter};

/// Largest page size a [`PageRequest`] will carry.
pub const MAX_PAGE_SIZE: u64 = 1000;
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// A 1-based page request. Out-of-range values are clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    page_size: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// Append `LIMIT/OFFSET` for this page to `w`.
    pub fn write_limit_offset(&self, w: &mut SqlWriter) {
        limit_offset(w, self.page_size, self.offset());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
    pub offset: u64,
}

impl PageMeta {
    pub fn new(total: u64, req: &PageRequest) -> Self {
        let size = req.page_size();
        let total_pages = total / size + u64::from(total % size != 0);
        Self {
            page: req.page(),
            page_size: req.page_size(),
            total,
            total_pages,
            has_next: req.page() < total_pages,
            has_previous: req.page() > 1,
            offset: req.offset(),
        }
    }
}

/// One page of items plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, req: &PageRequest) -> Self {
        Self {
            items,
            meta: PageMeta::new(total, req),
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

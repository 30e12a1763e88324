//! Offset pagination shared by list endpoints and stores.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Requested window. Missing values fall back to offset 0 and limit 10.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema, utoipa::IntoParams))]
pub struct PageRequest {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Limit clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }
}

/// One page of results plus the size of the whole filtered set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    /// Cut a window out of an already sorted, already filtered list.
    pub fn from_sorted(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(request.offset())
            .take(request.limit())
            .collect();
        Self { items, total }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

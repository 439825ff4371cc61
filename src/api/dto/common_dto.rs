//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Pagination query parameters for list endpoints.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Page number (1-indexed). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 100). Defaults to 20.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// Pagination metadata included in list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaginationMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items.
    pub total: u32,
    /// Total number of pages.
    pub total_pages: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl PaginationParams {
    /// Clamps `per_page` to the allowed maximum of 100.
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, 100),
        }
    }

    /// Cuts one page out of `items`, returning it with its metadata.
    #[must_use]
    pub fn paginate<T>(&self, items: Vec<T>) -> (Vec<T>, PaginationMeta) {
        let Self { page, per_page } = self.clamped();
        let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
        let total_pages = total.div_ceil(per_page);
        let start = usize::try_from(page.saturating_sub(1).saturating_mul(per_page))
            .unwrap_or(usize::MAX);
        let data = items
            .into_iter()
            .skip(start)
            .take(usize::try_from(per_page).unwrap_or(usize::MAX))
            .collect();
        (
            data,
            PaginationMeta {
                page,
                per_page,
                total,
                total_pages,
            },
        )
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Listing parameters shared by every paginated endpoint.
///
/// A non-empty `next_marker` switches to cursor mode and `page` is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub next_marker: Option<String>,
    pub order_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    IdDesc,
    IdAsc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> AppResult<Self> {
        let normalized = raw
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase())
            .unwrap_or_default();
        match normalized.as_str() {
            "" | "id desc" => Ok(SortOrder::IdDesc),
            "id asc" | "id" => Ok(SortOrder::IdAsc),
            other => Err(AppError::bad_request(format!("unsupported order_by: {other}"))),
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::IdDesc => "DESC",
            SortOrder::IdAsc => "ASC",
        }
    }

    /// Comparison operator that selects rows after the cursor.
    pub fn cursor_operator(self) -> &'static str {
        match self {
            SortOrder::IdDesc => "<",
            SortOrder::IdAsc => ">",
        }
    }
}

/// Resolved form of [`Pagination`] ready to be pushed into a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: i64,
    pub order: SortOrder,
    pub cursor: Option<i64>,
    pub offset: i64,
    pub page: i64,
}

impl Pagination {
    pub fn window(&self) -> AppResult<PageWindow> {
        let limit = self
            .page_size
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        let order = SortOrder::parse(self.order_by.as_deref())?;

        let cursor = match self.next_marker.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(marker) => Some(
                marker
                    .parse::<i64>()
                    .map_err(|_| AppError::bad_request(format!("invalid next_marker: {marker}")))?,
            ),
        };

        let page = self.page.unwrap_or(0).max(0);
        let offset = if cursor.is_none() && page > 0 {
            (page - 1)
                .checked_mul(limit)
                .ok_or_else(|| AppError::bad_request(format!("page {page} is out of range")))?
        } else {
            0
        };

        Ok(PageWindow {
            limit,
            order,
            cursor,
            offset,
            page,
        })
    }
}

/// Rows addressable by their primary key, used to derive the next cursor.
pub trait Identified {
    fn id(&self) -> i64;
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult<T> {
    pub list: Vec<T>,
    pub has_more: bool,
    pub next_marker: String,
    pub page: i64,
    pub page_size: i64,
}

impl PageWindow {
    /// Number of rows to request: one past the page to detect `has_more`.
    pub fn fetch_limit(&self) -> i64 {
        self.limit + 1
    }

    pub fn finish<T: Identified>(&self, mut rows: Vec<T>) -> ListResult<T> {
        let has_more = rows.len() as i64 > self.limit;
        if has_more {
            rows.truncate(self.limit as usize);
        }
        let next_marker = if has_more {
            rows.last().map(|row| row.id().to_string()).unwrap_or_default()
        } else {
            String::new()
        };

        ListResult {
            list: rows,
            has_more,
            next_marker,
            page: self.page,
            page_size: self.limit,
        }
    }
}

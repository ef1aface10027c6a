//! Page arithmetic for the submission listing

use serde::{Deserialize, Serialize};

/// Rows per listing page
pub const PAGE_SIZE: i64 = 100;

/// Listing query string: `?page=N&year=YYYY`
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub year: Option<i32>,
}

/// Page position returned alongside listing rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    /// 1-based, clamped into range
    pub page: i64,
    pub total_pages: i64,
    pub total_results: i64,
    pub page_size: i64,
    #[serde(skip)]
    pub offset: i64,
}

/// Clamp `requested` into `[1, total_pages]` and derive the SQL offset
///
/// ```
/// use cfp_web::pagination::paginate;
///
/// let p = paginate(250, Some(99));
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 200);
/// ```
pub fn paginate(total_results: i64, requested: Option<i64>) -> Page {
    let total_pages = (total_results + PAGE_SIZE - 1) / PAGE_SIZE;
    let page = requested.unwrap_or(1).clamp(1, total_pages.max(1));

    Page {
        page,
        total_pages,
        total_results,
        page_size: PAGE_SIZE,
        offset: (page - 1) * PAGE_SIZE,
    }
}

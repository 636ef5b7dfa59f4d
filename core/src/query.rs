use crate::error::{Result, SearchError};
use crate::snippet::Snippet;
use crate::DocId;
use serde::Serialize;

/// Validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
}

impl Pagination {
    /// `page` must be ≥ 0 and `page_size` ≥ 1; sizes above `max_page_size` are clamped.
    pub fn new(page: i64, page_size: i64, max_page_size: usize) -> Result<Self> {
        if page < 0 || page_size < 1 {
            return Err(SearchError::InvalidPage { page, page_size });
        }
        let page = usize::try_from(page).map_err(|_| SearchError::InvalidPage { page, page_size })?;
        let size = usize::try_from(page_size).unwrap_or(usize::MAX).min(max_page_size.max(1));
        Ok(Self { page, page_size: size })
    }

    /// Half-open range of ranks covered by this page, clipped to `total`.
    pub fn bounds(&self, total: usize) -> (usize, usize) {
        let start = self.page.saturating_mul(self.page_size).min(total);
        let end = start.saturating_add(self.page_size).min(total);
        (start, end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub doc_id: DocId,
    pub url: String,
    pub title: String,
    pub score: f32,
    pub snippet: Snippet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub total_matches: usize,
    /// The query hit its deadline; results are empty rather than stale.
    pub timed_out: bool,
}

impl SearchPage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn timed_out() -> Self {
        Self { timed_out: true, ..Self::default() }
    }
}

//! Local pagination.

use crate::params::{QueryParams, LIMIT_KEY, OFFSET_KEY};
use serde::{Deserialize, Serialize};

/// One page of list results, shaped like a paginated REST response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// URL of the next page, if any.
    pub next: Option<String>,
    /// URL of the previous page, if any.
    pub previous: Option<String>,
    /// The documents in this page.
    pub results: Vec<T>,
    /// Total number of documents across all pages.
    pub count: usize,
}

impl<T> Page<T> {
    /// Creates an empty page.
    pub fn empty() -> Self {
        Self {
            next: None,
            previous: None,
            results: Vec::new(),
            count: 0,
        }
    }

    /// Maps the results, keeping cursors and count.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
            count: self.count,
        }
    }

    /// Returns true if the page holds no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Cuts the `[offset, offset + limit)` window out of `items`.
///
/// Cursors are rendered as `base_url?<params>` with `offset`/`limit`
/// replaced. Without a limit the whole list is one page.
pub fn paginate<T>(
    items: Vec<T>,
    offset: usize,
    limit: Option<usize>,
    base_url: &str,
    params: &QueryParams,
) -> Page<T> {
    let count = items.len();
    let Some(limit) = limit.filter(|l| *l > 0) else {
        return Page {
            next: None,
            previous: None,
            results: items.into_iter().skip(offset).collect(),
            count,
        };
    };

    let results = items.into_iter().skip(offset).take(limit).collect();
    let end = offset.saturating_add(limit);
    let next = (end < count).then(|| cursor(base_url, params, end, limit));
    let previous =
        (offset > 0).then(|| cursor(base_url, params, offset.saturating_sub(limit), limit));

    Page {
        next,
        previous,
        results,
        count,
    }
}

fn cursor(base_url: &str, params: &QueryParams, offset: usize, limit: usize) -> String {
    let mut params = params.clone();
    params.set(LIMIT_KEY, limit.to_string());
    params.set(OFFSET_KEY, offset.to_string());
    format!("{}?{}", base_url, params.to_query_string())
}

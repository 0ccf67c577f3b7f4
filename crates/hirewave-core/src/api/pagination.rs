//! List responses normalized into a single page type.
//!
//! List endpoints answer either with a bare JSON array or with a paginated
//! object (`{count, next, previous, results}`). Both shapes are folded into
//! `Page<T>` here so callers never inspect the raw response.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Page<T> {
    pub results: Vec<T>,
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            count: 0,
            next: None,
            previous: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListResponse<T> {
    Bare(Vec<T>),
    Paginated {
        #[serde(default = "Vec::new")]
        results: Vec<T>,
        count: Option<usize>,
        next: Option<String>,
        previous: Option<String>,
    },
}

impl<T> From<ListResponse<T>> for Page<T> {
    fn from(response: ListResponse<T>) -> Self {
        match response {
            ListResponse::Bare(results) => Page {
                count: results.len(),
                results,
                next: None,
                previous: None,
            },
            ListResponse::Paginated {
                results,
                count,
                next,
                previous,
            } => Page {
                count: count.unwrap_or(results.len()),
                results,
                next,
                previous,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_from(json: &str) -> Page<u32> {
        let response: ListResponse<u32> = serde_json::from_str(json).expect("Failed to parse list");
        response.into()
    }

    #[test]
    fn test_bare_array() {
        let page = page_from("[1, 2, 3]");
        assert_eq!(page.results, vec![1, 2, 3]);
        assert_eq!(page.count, 3);
        assert!(!page.has_next());
    }

    #[test]
    fn test_paginated_object() {
        let page = page_from(
            r#"{"count": 40, "next": "https://api.hirewave.online/api/jobs/?page=3", "previous": "https://api.hirewave.online/api/jobs/?page=1", "results": [4, 5]}"#,
        );
        assert_eq!(page.results, vec![4, 5]);
        assert_eq!(page.count, 40);
        assert!(page.has_next());
        assert!(page.has_previous());
    }

    #[test]
    fn test_object_without_results_is_empty() {
        let page = page_from(r#"{"detail": "nothing here"}"#);
        assert!(page.is_empty());
        assert_eq!(page.count, 0);
    }
}

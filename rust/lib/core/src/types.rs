use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Parameters for list operations.
///
/// Every field is optional; unset fields are left out of the query string
/// so the backend applies its own defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Maximum number of results to return.
    pub limit: Option<usize>,

    /// Offset for pagination.
    pub offset: Option<usize>,

    /// Free-text search.
    pub search: Option<String>,

    /// Sort field, `-` prefix for descending (`-created_at`).
    pub ordering: Option<String>,

    /// Resource-specific filters, sent verbatim.
    pub filters: BTreeMap<String, String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn ordering(mut self, field: impl Into<String>) -> Self {
        self.ordering = Some(field.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Flatten into query-string pairs. Blank search/ordering are omitted.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            pairs.push(("search".to_string(), search.to_string()));
        }
        if let Some(ordering) = self.ordering.as_deref().filter(|s| !s.trim().is_empty()) {
            pairs.push(("ordering".to_string(), ordering.to_string()));
        }
        for (key, value) in &self.filters {
            pairs.push((key.clone(), value.clone()));
        }
        pairs
    }
}

/// Uniform paginated collection: `{ count, next, previous, results }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: usize,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: Vec::new(),
        }
    }

    /// A single unpaginated page holding all rows.
    pub fn from_rows(rows: Vec<T>) -> Self {
        Self {
            count: rows.len(),
            next: None,
            previous: None,
            results: rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Backend record identifier.
///
/// The backend mixes numeric ids and string keys; both decode here and
/// both render as plain text in URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Num(i64),
    Text(String),
}

impl Id {
    /// Numeric value, if the id is a number or a numeric string.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Id::Num(n) => Some(*n),
            Id::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Num(n) => write!(f, "{}", n),
            Id::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Num(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Text(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_has_no_pairs() {
        assert!(ListQuery::new().to_pairs().is_empty());
    }

    #[test]
    fn query_pairs_in_stable_order() {
        let q = ListQuery::new()
            .limit(10)
            .offset(20)
            .search("acme")
            .ordering("-created_at")
            .filter("status", "open")
            .filter("assigned_to", "7");
        assert_eq!(
            q.to_pairs(),
            vec![
                ("limit".to_string(), "10".to_string()),
                ("offset".to_string(), "20".to_string()),
                ("search".to_string(), "acme".to_string()),
                ("ordering".to_string(), "-created_at".to_string()),
                ("assigned_to".to_string(), "7".to_string()),
                ("status".to_string(), "open".to_string()),
            ]
        );
    }

    #[test]
    fn blank_search_is_omitted() {
        let q = ListQuery::new().search("  ").ordering("");
        assert!(q.to_pairs().is_empty());
    }

    #[test]
    fn page_from_rows_counts() {
        let page = Page::from_rows(vec![1, 2, 3]);
        assert_eq!(page.count, 3);
        assert!(page.next.is_none());
        assert!(page.previous.is_none());
    }

    #[test]
    fn page_decodes_standard_shape() {
        let page: Page<u32> = serde_json::from_value(serde_json::json!({
            "count": 42,
            "next": "http://x/api/leads/?offset=10",
            "previous": null,
            "results": [1, 2],
        }))
        .unwrap();
        assert_eq!(page.count, 42);
        assert_eq!(page.results, vec![1, 2]);
        assert_eq!(page.next.as_deref(), Some("http://x/api/leads/?offset=10"));
    }

    #[test]
    fn id_accepts_number_and_string() {
        let n: Id = serde_json::from_value(serde_json::json!(12)).unwrap();
        let s: Id = serde_json::from_value(serde_json::json!("8d1f")).unwrap();
        assert_eq!(n, Id::Num(12));
        assert_eq!(s.to_string(), "8d1f");
        assert_eq!(Id::from("33").as_i64(), Some(33));
        assert_eq!(s.as_i64(), None);
    }
}

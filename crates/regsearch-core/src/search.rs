//! Search request handling

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query;
use crate::store::{IndexStore, ProjectedDocument};

/// Page size used when a request asks for zero results
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// A search as received from a caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Simple name/tag query (`q`)
    pub simple: String,
    /// Advanced field query (`a`)
    pub advanced: String,
    /// Fields to project (`f`, repeatable)
    pub fields: Vec<String>,
    pub offset: usize,
    /// Page size (`maxResults`); zero means the default
    pub max_results: usize,
}

impl SearchRequest {
    /// Build a request from URL query pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = SearchRequest::default();
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "q" => request.simple = value.to_string(),
                "a" => request.advanced = value.to_string(),
                "f" => request.fields.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(str::to_string),
                ),
                "offset" => request.offset = number("offset", value)?,
                "maxResults" => request.max_results = number("maxResults", value)?,
                _ => {}
            }
        }
        Ok(request)
    }

    /// Requested page size, falling back to `default` for zero
    pub fn limit(&self, default: usize) -> usize {
        if self.max_results == 0 {
            default
        } else {
            self.max_results
        }
    }
}

fn number(name: &str, value: &str) -> Result<usize> {
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| Error::invalid_query(format!("'{}' must be a non-negative integer", name)))
}

/// Search results returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Total number of matching documents
    pub total: u64,
    pub offset: usize,
    pub max_results: usize,
    pub hits: Vec<ProjectedDocument>,
}

/// Build the query for a request and run it against the store
pub async fn execute(
    store: &dyn IndexStore,
    request: &SearchRequest,
    default_max_results: usize,
) -> Result<SearchResponse> {
    let query = query::build(&request.simple, &request.advanced)?;
    let limit = request.limit(default_max_results);

    let page = store
        .search(&query, &request.fields, request.offset, limit)
        .await?;

    Ok(SearchResponse {
        total: page.total,
        offset: request.offset,
        max_results: limit,
        hits: page.hits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs() {
        let pairs = vec![
            ("q", "sql"),
            ("f", "Name"),
            ("f", "Tag,Label.family"),
            ("offset", "5"),
            ("maxResults", "0"),
            ("ignored", "x"),
        ];
        let req = SearchRequest::from_pairs(pairs).unwrap();
        assert_eq!(req.simple, "sql");
        assert_eq!(req.fields, vec!["Name", "Tag", "Label.family"]);
        assert_eq!(req.offset, 5);
        assert_eq!(req.limit(DEFAULT_MAX_RESULTS), 10);
    }

    #[test]
    fn test_from_pairs_bad_number() {
        assert!(SearchRequest::from_pairs(vec![("offset", "-1")]).is_err());
        assert!(SearchRequest::from_pairs(vec![("maxResults", "ten")]).is_err());
    }

    #[tokio::test]
    async fn test_execute_without_criteria() {
        let store = crate::store::MemoryIndex::new();
        let err = execute(&store, &SearchRequest::default(), DEFAULT_MAX_RESULTS)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSearchCriteria));
    }
}

//! Elasticsearch backend
//!
//! Each searchable table maps to an Elasticsearch index of the same name,
//! and each row to a document whose `_id` is the row's primary key.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use crate::{
    error::{SearchError, SearchResult},
    index::{Document, Hits, SearchIndex, page_offset},
};

/// Elasticsearch connection configuration
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster (e.g., "http://localhost:9200")
    pub url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl ElasticsearchConfig {
    /// Read the configuration from environment variables
    ///
    /// Returns `None` when `ELASTICSEARCH_URL` is unset or blank, which
    /// callers treat as "use the in-process index".
    ///
    /// # Environment Variables
    /// - `ELASTICSEARCH_URL`: Base URL of the cluster
    /// - `ELASTICSEARCH_TIMEOUT`: Request timeout in seconds (default: 10)
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("ELASTICSEARCH_URL").ok()?;
        let url = url.trim().trim_end_matches('/').to_string();
        if url.is_empty() {
            return None;
        }

        let timeout_secs = std::env::var("ELASTICSEARCH_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Some(Self { url, timeout_secs })
    }
}

/// Search index backed by an Elasticsearch cluster
#[derive(Debug, Clone)]
pub struct ElasticsearchIndex {
    client: Client,
    base_url: String,
}

impl ElasticsearchIndex {
    /// Build a client for the configured cluster
    pub fn new(config: &ElasticsearchConfig) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!("Elasticsearch client initialized with URL: {}", config.url);

        Ok(Self {
            client,
            base_url: config.url.clone(),
        })
    }

    fn doc_url(&self, table: &str, id: i64) -> String {
        format!("{}/{}/_doc/{}", self.base_url, table, id)
    }
}

/// Request body for a relevance query over every field of the index.
pub(crate) fn query_body(expression: &str, page: u32, per_page: u32) -> Value {
    json!({
        "query": {
            "multi_match": {
                "query": expression,
                "fields": ["*"]
            }
        },
        "from": page_offset(page, per_page),
        "size": per_page
    })
}

/// Read ids and the total count out of a `_search` response.
pub(crate) fn parse_hits(body: &Value) -> SearchResult<Hits> {
    let hits = body
        .get("hits")
        .ok_or_else(|| SearchError::Decode("missing `hits`".to_string()))?;

    // `total` is an object since 7.x and a bare number before that.
    let total = match hits.get("total") {
        Some(Value::Object(t)) => t.get("value").and_then(Value::as_u64),
        Some(other) => other.as_u64(),
        None => None,
    }
    .ok_or_else(|| SearchError::Decode("missing `hits.total`".to_string()))?;

    let ids = hits
        .get("hits")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::Decode("missing `hits.hits`".to_string()))?
        .iter()
        .map(|hit| {
            hit.get("_id")
                .and_then(Value::as_str)
                .and_then(|id| id.parse::<i64>().ok())
                .ok_or_else(|| SearchError::Decode(format!("bad document id in {}", hit)))
        })
        .collect::<SearchResult<Vec<i64>>>()?;

    Ok(Hits { ids, total })
}

async fn status_error(response: reqwest::Response) -> SearchError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    SearchError::Status { status, body }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn add(&self, table: &str, id: i64, document: &Document) -> SearchResult<()> {
        debug!("Indexing {}#{}", table, id);
        let response = self
            .client
            .put(self.doc_url(table, id))
            .json(document)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn remove(&self, table: &str, id: i64) -> SearchResult<()> {
        debug!("Removing {}#{} from index", table, id);
        let response = self.client.delete(self.doc_url(table, id)).send().await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(status_error(response).await),
        }
    }

    async fn query(
        &self,
        table: &str,
        expression: &str,
        page: u32,
        per_page: u32,
    ) -> SearchResult<Hits> {
        let response = self
            .client
            .post(format!("{}/{}/_search", self.base_url, table))
            .json(&query_body(expression, page, per_page))
            .send()
            .await?;

        // Nothing has been indexed into this table yet.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Hits::default());
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: Value = response.json().await?;
        parse_hits(&body)
    }

    fn backend(&self) -> &'static str {
        "elasticsearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_body_pages_from_one() {
        let body = query_body("hello world", 3, 10);
        assert_eq!(body["from"], 20);
        assert_eq!(body["size"], 10);
        assert_eq!(body["query"]["multi_match"]["query"], "hello world");
        assert_eq!(body["query"]["multi_match"]["fields"][0], "*");

        assert_eq!(query_body("x", 0, 10)["from"], 0);
    }

    #[test]
    fn parses_modern_and_legacy_totals() {
        let modern = json!({
            "hits": {
                "total": { "value": 12, "relation": "eq" },
                "hits": [ { "_id": "7" }, { "_id": "3" } ]
            }
        });
        assert_eq!(
            parse_hits(&modern).unwrap(),
            Hits { ids: vec![7, 3], total: 12 }
        );

        let legacy = json!({ "hits": { "total": 0, "hits": [] } });
        assert_eq!(parse_hits(&legacy).unwrap(), Hits::default());
    }

    #[test]
    fn rejects_non_numeric_ids() {
        let body = json!({ "hits": { "total": { "value": 1 }, "hits": [ { "_id": "abc" } ] } });
        assert!(matches!(parse_hits(&body), Err(SearchError::Decode(_))));
        assert!(matches!(parse_hits(&json!({})), Err(SearchError::Decode(_))));
    }
}

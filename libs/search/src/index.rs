//! The search index interface consumed by the synchronizer

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::SearchResult;

/// The indexed fields of one record.
pub type Document = Map<String, Value>;

/// One page of matches, most relevant first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hits {
    pub ids: Vec<i64>,
    /// Total number of matches across all pages.
    pub total: u64,
}

/// An external full-text index keyed by (table name, primary key).
///
/// Pages are 1-based; a page of 0 is treated as the first page.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or replace the document for `id`.
    async fn add(&self, table: &str, id: i64, document: &Document) -> SearchResult<()>;

    /// Remove the document for `id`. Removing an absent document succeeds.
    async fn remove(&self, table: &str, id: i64) -> SearchResult<()>;

    /// Match `expression` against every indexed field of `table`.
    async fn query(
        &self,
        table: &str,
        expression: &str,
        page: u32,
        per_page: u32,
    ) -> SearchResult<Hits>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Offset of the first hit on `page`.
pub(crate) fn page_offset(page: u32, per_page: u32) -> usize {
    (page.max(1) as usize - 1) * per_page as usize
}

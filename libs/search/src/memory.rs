//! In-process search index
//!
//! Used when no external search server is configured, and by tests. The
//! index lives only as long as the process, so callers rebuild it with
//! [`crate::SearchSync::reindex`] at startup.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::{
    error::SearchResult,
    index::{Document, Hits, SearchIndex, page_offset},
};

/// Term-frequency index held in memory
#[derive(Debug, Default)]
pub struct MemoryIndex {
    tables: RwLock<HashMap<String, BTreeMap<i64, Vec<String>>>>,
}

impl MemoryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents held for `table`
    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

/// Lowercased alphanumeric terms of a piece of text.
fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Flatten every string-ish value of the document into terms.
fn document_terms(document: &Document) -> Vec<String> {
    let mut out = Vec::new();
    for value in document.values() {
        match value {
            Value::String(s) => out.extend(terms(s)),
            Value::Number(n) => out.push(n.to_string()),
            Value::Array(items) => {
                for item in items {
                    if let Value::String(s) = item {
                        out.extend(terms(s));
                    }
                }
            }
            _ => {}
        }
    }
    out
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn add(&self, table: &str, id: i64, document: &Document) -> SearchResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(id, document_terms(document));
        Ok(())
    }

    async fn remove(&self, table: &str, id: i64) -> SearchResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(docs) = tables.get_mut(table) {
            docs.remove(&id);
        }
        Ok(())
    }

    async fn query(
        &self,
        table: &str,
        expression: &str,
        page: u32,
        per_page: u32,
    ) -> SearchResult<Hits> {
        let wanted: Vec<String> = terms(expression).collect();
        if wanted.is_empty() {
            return Ok(Hits::default());
        }

        let tables = self.tables.read().await;
        let Some(docs) = tables.get(table) else {
            return Ok(Hits::default());
        };

        // Score is the number of term occurrences; ties go to the lower id.
        let mut scored: Vec<(usize, i64)> = docs
            .iter()
            .filter_map(|(id, doc_terms)| {
                let score = doc_terms
                    .iter()
                    .filter(|t| wanted.iter().any(|w| w == *t))
                    .count();
                (score > 0).then_some((score, *id))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let total = scored.len() as u64;
        let ids = scored
            .into_iter()
            .skip(page_offset(page, per_page))
            .take(per_page as usize)
            .map(|(_, id)| id)
            .collect();

        Ok(Hits { ids, total })
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(body: &str) -> Document {
        json!({ "body": body }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn ranks_by_term_occurrences() {
        let index = MemoryIndex::new();
        index.add("post", 1, &doc("rust is fun")).await.unwrap();
        index.add("post", 2, &doc("Rust, rust and more RUST")).await.unwrap();
        index.add("post", 3, &doc("nothing to see")).await.unwrap();

        let hits = index.query("post", "rust", 1, 10).await.unwrap();
        assert_eq!(hits.ids, vec![2, 1]);
        assert_eq!(hits.total, 2);
    }

    #[tokio::test]
    async fn paginates_after_ranking() {
        let index = MemoryIndex::new();
        for id in 1..=5 {
            index.add("post", id, &doc("hello")).await.unwrap();
        }

        let second = index.query("post", "hello", 2, 2).await.unwrap();
        assert_eq!(second.ids, vec![3, 4]);
        assert_eq!(second.total, 5);

        let beyond = index.query("post", "hello", 9, 2).await.unwrap();
        assert!(beyond.ids.is_empty());
        assert_eq!(beyond.total, 5);
    }

    #[tokio::test]
    async fn tables_are_isolated_and_removal_is_idempotent() {
        let index = MemoryIndex::new();
        index.add("post", 1, &doc("hello")).await.unwrap();
        index.add("message", 1, &doc("hello")).await.unwrap();

        index.remove("post", 1).await.unwrap();
        index.remove("post", 1).await.unwrap();

        assert_eq!(index.query("post", "hello", 1, 10).await.unwrap().total, 0);
        assert_eq!(index.query("message", "hello", 1, 10).await.unwrap().total, 1);
        assert_eq!(index.len("post").await, 0);
    }

    #[tokio::test]
    async fn blank_expression_matches_nothing() {
        let index = MemoryIndex::new();
        index.add("post", 1, &doc("hello")).await.unwrap();
        assert_eq!(index.query("post", "  ?! ", 1, 10).await.unwrap(), Hits::default());
    }
}

//! Full-text search support for the blog backend
//!
//! The relational store stays the source of truth; the search index is a
//! derived copy kept in step with it at transaction boundaries. Callers
//! collect their searchable writes in a [`ChangeSet`], and
//! [`SearchSync::commit`] snapshots those writes, finalizes the database
//! transaction, and only then mirrors the snapshot into the index.

pub mod elasticsearch;
pub mod error;
pub mod index;
pub mod memory;
pub mod registry;
pub mod sync;

use async_trait::async_trait;
use serde::Serialize;

pub use elasticsearch::{ElasticsearchConfig, ElasticsearchIndex};
pub use error::{SearchError, SearchResult};
pub use index::{Document, Hits, SearchIndex};
pub use memory::MemoryIndex;
pub use registry::SearchRegistry;
pub use sync::{ChangeKind, ChangeSet, IndexSnapshot, SearchPage, SearchSync, SyncReport};

/// A persisted record whose designated fields are mirrored into the index.
pub trait Searchable: Serialize + Send + Sync {
    /// Index name; by convention the entity's table name.
    const TABLE: &'static str;
    /// Fields copied into the index document.
    const SEARCHABLE_FIELDS: &'static [&'static str];

    /// Primary key used as the index document id.
    fn id(&self) -> i64;
}

/// Row access the synchronizer needs for search hydration and reindexing.
#[async_trait]
pub trait SearchableStore<T: Searchable>: Send + Sync {
    /// Fetch the rows with the given ids, in any order. Missing ids are skipped.
    async fn fetch_by_ids(&self, ids: &[i64]) -> SearchResult<Vec<T>>;

    /// Fetch every persisted row.
    async fn fetch_all(&self) -> SearchResult<Vec<T>>;
}

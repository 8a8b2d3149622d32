//! Commit-boundary synchronization between the row store and the index
//!
//! The write path is:
//!
//! 1. callers record searchable writes in a [`ChangeSet`] while they run
//!    their statements inside a database transaction;
//! 2. [`SearchSync::before_commit`] snapshots the indexed fields while the
//!    rows are still in hand;
//! 3. the transaction is finalized;
//! 4. [`SearchSync::after_commit`] mirrors the snapshot into the index.
//!
//! [`SearchSync::commit`] runs the four steps in order. A failed commit
//! drops the snapshot, and index failures after a successful commit are
//! logged and counted instead of failing the already-durable write.

use serde::Serialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    Searchable, SearchableStore,
    error::{SearchError, SearchResult},
    index::{Document, SearchIndex},
    registry::SearchRegistry,
};

/// Kind of write recorded in a change set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
struct PendingChange {
    kind: ChangeKind,
    table: String,
    id: i64,
    row: Value,
}

/// Writes recorded during one transaction
#[derive(Debug, Default)]
pub struct ChangeSet {
    changes: Vec<PendingChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write of an already serialized row.
    pub fn track(&mut self, kind: ChangeKind, table: impl Into<String>, id: i64, row: Value) {
        self.changes.push(PendingChange {
            kind,
            table: table.into(),
            id,
            row,
        });
    }

    pub fn added<T: Searchable>(&mut self, entity: &T) -> SearchResult<()> {
        self.track_entity(ChangeKind::Add, entity)
    }

    pub fn updated<T: Searchable>(&mut self, entity: &T) -> SearchResult<()> {
        self.track_entity(ChangeKind::Update, entity)
    }

    pub fn deleted<T: Searchable>(&mut self, entity: &T) -> SearchResult<()> {
        self.track_entity(ChangeKind::Delete, entity)
    }

    fn track_entity<T: Searchable>(&mut self, kind: ChangeKind, entity: &T) -> SearchResult<()> {
        let row = serde_json::to_value(entity)?;
        self.track(kind, T::TABLE, entity.id(), row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &PendingChange> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }
}

/// Index mutations captured before commit, applied after it
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IndexSnapshot {
    upserts: Vec<(String, i64, Document)>,
    removals: Vec<(String, i64)>,
}

impl IndexSnapshot {
    pub fn upserts(&self) -> &[(String, i64, Document)] {
        &self.upserts
    }

    pub fn removals(&self) -> &[(String, i64)] {
        &self.removals
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }
}

/// Outcome of applying a snapshot
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub indexed: usize,
    pub removed: usize,
    pub failed: usize,
}

/// One page of search results, in relevance order
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> SearchPage<T> {
    fn empty(total: u64, page: u32, per_page: u32) -> Self {
        Self {
            items: Vec::new(),
            total,
            page,
            per_page,
        }
    }
}

/// Keeps a [`SearchIndex`] consistent with committed rows
#[derive(Clone)]
pub struct SearchSync {
    index: Arc<dyn SearchIndex>,
    registry: Arc<SearchRegistry>,
    failures: Arc<AtomicU64>,
}

impl SearchSync {
    pub fn new(index: Arc<dyn SearchIndex>, registry: SearchRegistry) -> Self {
        Self {
            index,
            registry: Arc::new(registry),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn registry(&self) -> &SearchRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &'static str {
        self.index.backend()
    }

    /// Index mutations that failed since the last successful reindex.
    pub fn failed_mutations(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// True when the index may be missing committed writes.
    pub fn is_degraded(&self) -> bool {
        self.failed_mutations() > 0
    }

    /// Snapshot the searchable part of `changes`.
    ///
    /// Adds and updates become upserts, deletes become removals, in that
    /// order. Rows of unregistered tables are skipped.
    pub fn before_commit(&self, changes: &ChangeSet) -> IndexSnapshot {
        let mut snapshot = IndexSnapshot::default();

        for change in changes
            .of_kind(ChangeKind::Add)
            .chain(changes.of_kind(ChangeKind::Update))
        {
            if let Some(document) = self.registry.extract(&change.table, &change.row) {
                snapshot
                    .upserts
                    .push((change.table.clone(), change.id, document));
            }
        }

        for change in changes.of_kind(ChangeKind::Delete) {
            if self.registry.is_searchable(&change.table) {
                snapshot.removals.push((change.table.clone(), change.id));
            }
        }

        snapshot
    }

    /// Apply a snapshot to the index. Never fails; failures are counted.
    pub async fn after_commit(&self, snapshot: IndexSnapshot) -> SyncReport {
        let mut report = SyncReport::default();

        for (table, id, document) in &snapshot.upserts {
            match self.index.add(table, *id, document).await {
                Ok(()) => report.indexed += 1,
                Err(e) => {
                    error!("Failed to index {}#{}: {}", table, id, e);
                    report.failed += 1;
                }
            }
        }

        for (table, id) in &snapshot.removals {
            match self.index.remove(table, *id).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    error!("Failed to remove {}#{} from index: {}", table, id, e);
                    report.failed += 1;
                }
            }
        }

        if report.failed > 0 {
            self.failures
                .fetch_add(report.failed as u64, Ordering::Relaxed);
            warn!(
                "Search index is degraded: {} mutations failed after commit",
                report.failed
            );
        }

        report
    }

    /// Snapshot `changes`, run `finalize`, and on success apply the snapshot.
    ///
    /// `finalize` is the store commit. Its error is returned untouched and
    /// the index is left as it was.
    pub async fn commit<F, E>(&self, changes: ChangeSet, finalize: F) -> Result<SyncReport, E>
    where
        F: Future<Output = Result<(), E>>,
    {
        let snapshot = self.before_commit(&changes);
        drop(changes);

        finalize.await?;

        if snapshot.is_empty() {
            return Ok(SyncReport::default());
        }
        Ok(self.after_commit(snapshot).await)
    }

    /// Rebuild the index for `T` from every persisted row.
    ///
    /// Clears the degraded flag when every row was indexed.
    pub async fn reindex<T, S>(&self, store: &S) -> SearchResult<usize>
    where
        T: Searchable,
        S: SearchableStore<T> + ?Sized,
    {
        if !self.registry.is_searchable(T::TABLE) {
            return Err(SearchError::NotSearchable(T::TABLE.to_string()));
        }

        let rows = store.fetch_all().await?;
        info!("Reindexing {} rows of {}", rows.len(), T::TABLE);

        let mut indexed = 0;
        for row in &rows {
            let value = serde_json::to_value(row)?;
            let document = self
                .registry
                .extract(T::TABLE, &value)
                .ok_or_else(|| SearchError::NotSearchable(T::TABLE.to_string()))?;
            self.index.add(T::TABLE, row.id(), &document).await?;
            indexed += 1;
        }

        self.failures.store(0, Ordering::Relaxed);
        Ok(indexed)
    }

    /// Relevance-ranked search over `T`.
    ///
    /// The index supplies ranked ids; rows are fetched from the store and put
    /// back into the index's order. Ids the store no longer has are dropped.
    pub async fn search<T, S>(
        &self,
        store: &S,
        expression: &str,
        page: u32,
        per_page: u32,
    ) -> SearchResult<SearchPage<T>>
    where
        T: Searchable,
        S: SearchableStore<T> + ?Sized,
    {
        let page = page.max(1);
        let hits = self.index.query(T::TABLE, expression, page, per_page).await?;

        if hits.total == 0 || hits.ids.is_empty() {
            return Ok(SearchPage::empty(hits.total, page, per_page));
        }

        let position: HashMap<i64, usize> = hits
            .ids
            .iter()
            .enumerate()
            .map(|(rank, id)| (*id, rank))
            .collect();

        let mut items: Vec<T> = store
            .fetch_by_ids(&hits.ids)
            .await?
            .into_iter()
            .filter(|row| position.contains_key(&row.id()))
            .collect();
        items.sort_by_key(|row| position[&row.id()]);

        if items.len() < hits.ids.len() {
            debug!(
                "{} of {} indexed {} ids no longer exist",
                hits.ids.len() - items.len(),
                hits.ids.len(),
                T::TABLE
            );
        }

        Ok(SearchPage {
            items,
            total: hits.total,
            page,
            per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{index::Hits, memory::MemoryIndex};
    use async_trait::async_trait;
    use std::{
        collections::BTreeMap,
        sync::{Mutex, atomic::AtomicUsize},
    };

    #[derive(Debug, Clone, Serialize, PartialEq)]
    struct Note {
        id: i64,
        body: String,
    }

    impl Searchable for Note {
        const TABLE: &'static str = "note";
        const SEARCHABLE_FIELDS: &'static [&'static str] = &["body"];

        fn id(&self) -> i64 {
            self.id
        }
    }

    fn note(id: i64, body: &str) -> Note {
        Note {
            id,
            body: body.to_string(),
        }
    }

    #[derive(Default)]
    struct NoteStore {
        rows: Mutex<BTreeMap<i64, Note>>,
        fetches: AtomicUsize,
    }

    impl NoteStore {
        fn insert(&self, n: Note) {
            self.rows.lock().unwrap().insert(n.id, n);
        }

        fn delete(&self, id: i64) {
            self.rows.lock().unwrap().remove(&id);
        }
    }

    #[async_trait]
    impl SearchableStore<Note> for NoteStore {
        async fn fetch_by_ids(&self, ids: &[i64]) -> SearchResult<Vec<Note>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            // Natural (id) order, not the caller's order.
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|n| ids.contains(&n.id))
                .cloned()
                .collect())
        }

        async fn fetch_all(&self) -> SearchResult<Vec<Note>> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl SearchIndex for FailingIndex {
        async fn add(&self, _: &str, _: i64, _: &Document) -> SearchResult<()> {
            Err(SearchError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        }

        async fn remove(&self, _: &str, _: i64) -> SearchResult<()> {
            Err(SearchError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        }

        async fn query(&self, _: &str, _: &str, _: u32, _: u32) -> SearchResult<Hits> {
            Ok(Hits::default())
        }

        fn backend(&self) -> &'static str {
            "failing"
        }
    }

    fn sync_over(index: Arc<dyn SearchIndex>) -> SearchSync {
        let mut registry = SearchRegistry::new();
        registry.register_entity::<Note>();
        SearchSync::new(index, registry)
    }

    async fn commit_insert(sync: &SearchSync, store: &NoteStore, n: Note) -> SyncReport {
        let mut changes = ChangeSet::new();
        changes.added(&n).unwrap();
        sync.commit(changes, async {
            store.insert(n.clone());
            Ok::<(), String>(())
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn committed_insert_is_searchable_and_delete_removes_it() {
        let sync = sync_over(Arc::new(MemoryIndex::new()));
        let store = NoteStore::default();

        let report = commit_insert(&sync, &store, note(1, "hello world")).await;
        assert_eq!(report.indexed, 1);

        let found = sync.search(&store, "hello", 1, 10).await.unwrap();
        assert_eq!(found.items, vec![note(1, "hello world")]);
        assert_eq!(found.total, 1);

        let mut changes = ChangeSet::new();
        changes.deleted(&note(1, "hello world")).unwrap();
        let report = sync
            .commit(changes, async {
                store.delete(1);
                Ok::<(), String>(())
            })
            .await
            .unwrap();
        assert_eq!(report.removed, 1);

        let found = sync.search(&store, "hello", 1, 10).await.unwrap();
        assert!(found.items.is_empty());
        assert_eq!(found.total, 0);
    }

    #[tokio::test]
    async fn failed_commit_leaves_index_untouched() {
        let index = Arc::new(MemoryIndex::new());
        let sync = sync_over(index.clone());

        let mut changes = ChangeSet::new();
        changes.added(&note(1, "hello world")).unwrap();
        let result = sync
            .commit(changes, async { Err::<(), _>("serialization failure") })
            .await;

        assert_eq!(result.unwrap_err(), "serialization failure");
        assert_eq!(index.len("note").await, 0);
    }

    #[tokio::test]
    async fn results_follow_index_relevance_not_store_order() {
        let sync = sync_over(Arc::new(MemoryIndex::new()));
        let store = NoteStore::default();

        commit_insert(&sync, &store, note(1, "rust")).await;
        commit_insert(&sync, &store, note(2, "rust rust rust")).await;
        commit_insert(&sync, &store, note(3, "rust rust")).await;

        let found = sync.search(&store, "rust", 1, 10).await.unwrap();
        let ids: Vec<i64> = found.items.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let second = sync.search(&store, "rust", 2, 2).await.unwrap();
        assert_eq!(second.items, vec![note(1, "rust")]);
        assert_eq!(second.total, 3);
    }

    #[tokio::test]
    async fn no_matches_skips_the_store() {
        let sync = sync_over(Arc::new(MemoryIndex::new()));
        let store = NoteStore::default();
        commit_insert(&sync, &store, note(1, "hello")).await;

        let found = sync.search(&store, "goodbye", 1, 10).await.unwrap();
        assert!(found.items.is_empty());
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn updates_replace_the_indexed_document() {
        let sync = sync_over(Arc::new(MemoryIndex::new()));
        let store = NoteStore::default();
        commit_insert(&sync, &store, note(1, "draft")).await;

        let edited = note(1, "final");
        let mut changes = ChangeSet::new();
        changes.updated(&edited).unwrap();
        sync.commit(changes, async {
            store.insert(edited.clone());
            Ok::<(), String>(())
        })
        .await
        .unwrap();

        assert_eq!(sync.search(&store, "draft", 1, 10).await.unwrap().total, 0);
        assert_eq!(sync.search(&store, "final", 1, 10).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn unregistered_tables_never_reach_the_index() {
        let sync = sync_over(Arc::new(MemoryIndex::new()));

        let mut changes = ChangeSet::new();
        changes.track(ChangeKind::Add, "token", 9, serde_json::json!({"id": 9}));
        changes.track(ChangeKind::Delete, "token", 9, serde_json::json!({"id": 9}));
        changes.added(&note(1, "hi")).unwrap();

        let snapshot = sync.before_commit(&changes);
        assert_eq!(snapshot.upserts().len(), 1);
        assert_eq!(snapshot.upserts()[0].0, "note");
        assert!(snapshot.removals().is_empty());
    }

    #[tokio::test]
    async fn index_failure_does_not_fail_the_commit() {
        let sync = sync_over(Arc::new(FailingIndex));
        let store = NoteStore::default();

        let report = commit_insert(&sync, &store, note(1, "hello")).await;
        assert_eq!(report.failed, 1);
        assert_eq!(store.rows.lock().unwrap().len(), 1);
        assert!(sync.is_degraded());
    }

    #[tokio::test]
    async fn reindex_rebuilds_and_clears_degradation() {
        let index = Arc::new(MemoryIndex::new());
        let sync = sync_over(index.clone());
        let store = NoteStore::default();
        store.insert(note(1, "alpha"));
        store.insert(note(2, "beta"));

        sync.failures.store(3, Ordering::Relaxed);
        assert_eq!(sync.reindex::<Note, _>(&store).await.unwrap(), 2);
        assert!(!sync.is_degraded());
        assert_eq!(index.len("note").await, 2);
        assert_eq!(sync.search(&store, "beta", 1, 10).await.unwrap().total, 1);
    }
}

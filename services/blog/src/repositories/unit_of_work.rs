//! Transaction handle that keeps the search index in step with commits

use common::{DatabaseError, DatabaseResult};
use search::{ChangeSet, SearchSync, SyncReport};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;

/// A database transaction plus the searchable writes made inside it
///
/// Repositories run their statements on [`UnitOfWork::connection`] and
/// record searchable rows in [`UnitOfWork::changes`]. [`UnitOfWork::commit`]
/// snapshots the recorded rows, commits, and only then updates the index.
/// Dropping the handle without committing rolls the transaction back and
/// leaves the index untouched.
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
    changes: ChangeSet,
    sync: SearchSync,
}

impl UnitOfWork {
    pub async fn begin(pool: &PgPool, sync: SearchSync) -> DatabaseResult<Self> {
        let tx = pool.begin().await.map_err(DatabaseError::Connection)?;
        Ok(Self {
            tx,
            changes: ChangeSet::new(),
            sync,
        })
    }

    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub fn changes(&mut self) -> &mut ChangeSet {
        &mut self.changes
    }

    pub async fn commit(self) -> DatabaseResult<SyncReport> {
        let UnitOfWork { tx, changes, sync } = self;
        debug!("Committing unit of work with {} tracked changes", changes.len());

        sync.commit(changes, async move {
            tx.commit().await.map_err(DatabaseError::from_query)
        })
        .await
    }

    pub async fn rollback(self) -> DatabaseResult<()> {
        self.tx.rollback().await.map_err(DatabaseError::from_query)
    }
}

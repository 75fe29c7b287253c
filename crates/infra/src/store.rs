//! Handle to one tenant's isolated store.
//!
//! ## Concurrency
//!
//! Every mutation runs through [`StoreHandle::write`], which takes the
//! store-wide write lock and opens a SQLite transaction. Mutations of one store
//! are therefore serialized, and a failed multi-step operation is rolled back
//! as a whole.
//!
//! Reads go straight to the pool and may run concurrently. The store is opened
//! in WAL mode, so a reader sees either the state before a commit or the fully
//! committed state, never an intermediate one.

use std::path::Path;
use std::sync::Arc;

use classwms_core::TenantId;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::catalog::{LocationRegistry, ProductCatalog, SupplierRegistry};
use crate::config::StoreConfig;
use crate::error::{map_sqlx_error, StoreResult};
use crate::ledger::InvoiceLedger;
use crate::reports::StockReport;
use crate::schema::SchemaManager;

/// Cheap-to-clone handle bound to exactly one tenant store.
///
/// Clones share the pool and the write lock.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    tenant_id: TenantId,
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl StoreHandle {
    /// Connect to the store file at `path` and ensure its schema.
    ///
    /// With `create == false` a missing file is an error rather than a new,
    /// empty store.
    pub(crate) async fn connect(
        config: &StoreConfig,
        tenant_id: TenantId,
        path: &Path,
        create: bool,
    ) -> StoreResult<Self> {
        let pool = connect_pool(config, path, create).await?;
        SchemaManager::ensure_schema(&pool).await?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                tenant_id,
                pool,
                write_lock: Arc::new(Mutex::new(())),
            }),
        })
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.inner.tenant_id
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Take the store-wide write lock and begin a transaction.
    ///
    /// Dropping the returned [`WriteTxn`] without committing rolls back.
    pub async fn write(&self) -> StoreResult<WriteTxn> {
        let guard = self.inner.write_lock.clone().lock_owned().await;
        let tx = self
            .inner
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_write", e))?;
        Ok(WriteTxn { tx, _guard: guard })
    }

    pub fn products(&self) -> ProductCatalog {
        ProductCatalog::new(self.clone())
    }

    pub fn locations(&self) -> LocationRegistry {
        LocationRegistry::new(self.clone())
    }

    pub fn suppliers(&self) -> SupplierRegistry {
        SupplierRegistry::new(self.clone())
    }

    pub fn ledger(&self) -> InvoiceLedger {
        InvoiceLedger::new(self.clone())
    }

    pub fn reports(&self) -> StockReport {
        StockReport::new(self.clone())
    }

    /// Close the pool; outstanding clones fail on their next query.
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }
}

/// An open write transaction holding the store's write lock.
///
/// Field order matters: the transaction is dropped (and rolled back) before
/// the lock is released.
pub struct WriteTxn {
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl WriteTxn {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_write", e))
    }

    pub async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback_write", e))
    }
}

pub(crate) async fn connect_pool(
    config: &StoreConfig,
    path: &Path,
    create: bool,
) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(|e| map_sqlx_error("connect_store", e))
}

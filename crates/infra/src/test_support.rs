//! Shared fixtures for store tests.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

use classwms_core::TenantId;

use crate::config::StoreConfig;
use crate::registry::TenantRegistry;
use crate::store::StoreHandle;

/// Single-connection in-memory database (each connection to `:memory:` is a
/// separate database, so the pool must never open a second one).
pub(crate) async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

/// A registry rooted in a throwaway directory.
pub(crate) struct TestStores {
    config: StoreConfig,
    registry: TenantRegistry,
    _dir: TempDir,
}

impl TestStores {
    pub(crate) async fn new() -> Self {
        classwms_observability::tracing::init_for_tests();

        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path());
        let registry = TenantRegistry::open(config.clone()).await.unwrap();
        Self {
            config,
            registry,
            _dir: dir,
        }
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    /// Register `id` and open its store.
    pub(crate) async fn tenant(&self, id: &str) -> StoreHandle {
        let tenant_id = TenantId::parse(id).unwrap();
        self.registry
            .register(&tenant_id, "Test Student", "B1")
            .await
            .unwrap();
        self.registry.open_store(&tenant_id).await.unwrap()
    }
}

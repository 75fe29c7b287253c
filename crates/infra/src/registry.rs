//! Tenant registry: one record per tenant plus one isolated store file each.
//!
//! ## Tenant Isolation
//!
//! Each tenant's data lives in its own SQLite file (see [`StoreConfig`]), so a
//! [`StoreHandle`] physically cannot reach another tenant's rows. The registry
//! keeps at most one open handle per tenant; every `open_store` call for the
//! same tenant returns a clone of it, which is what makes the per-store write
//! lock effective across callers.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use classwms_core::{text, DomainError, TenantId};

use crate::config::StoreConfig;
use crate::error::{is_unique_violation, map_sqlx_error, StoreError, StoreResult};
use crate::schema::SchemaManager;
use crate::store::{connect_pool, StoreHandle};

/// A registered tenant (student).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub display_name: String,
    pub class_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    tenant_id: String,
    display_name: String,
    class_name: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = DomainError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        Ok(Tenant {
            id: TenantId::parse(row.tenant_id)?,
            display_name: row.display_name,
            class_name: row.class_name,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
pub struct TenantRegistry {
    config: StoreConfig,
    pool: SqlitePool,
    open: Mutex<HashMap<TenantId, StoreHandle>>,
}

impl TenantRegistry {
    /// Open (creating if needed) the registry under `config.data_dir`.
    #[instrument(skip(config), fields(data_dir = %config.data_dir.display()), err)]
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let tenants_dir = config.tenants_dir();
        std::fs::create_dir_all(&tenants_dir).map_err(|e| StoreError::io(&tenants_dir, e))?;

        let pool = connect_pool(&config, &config.registry_path(), true).await?;
        SchemaManager::ensure_registry_schema(&pool).await?;

        Ok(Self {
            config,
            pool,
            open: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Register a tenant and provision its empty store.
    ///
    /// Atomic: if the store cannot be provisioned the tenant record is not
    /// kept. An existing tenant (or a leftover store file for that id) is
    /// `AlreadyExists` and stays untouched.
    #[instrument(skip(self, display_name, class_name), fields(tenant = %tenant_id), err)]
    pub async fn register(
        &self,
        tenant_id: &TenantId,
        display_name: &str,
        class_name: &str,
    ) -> StoreResult<Tenant> {
        let display_name = text::required("display name", display_name)?;
        let class_name = text::required("class name", class_name)?;

        // Held for the whole registration so two registrations of one id
        // cannot race on the store file.
        let mut open = self.open.lock().await;

        let path = self.config.store_path(tenant_id);
        if path.exists() {
            if !self.exists(tenant_id).await? {
                warn!(
                    tenant = %tenant_id,
                    path = %path.display(),
                    "store file exists without a registry record"
                );
                return Err(DomainError::already_exists(format!(
                    "store file {} for unregistered tenant {tenant_id}",
                    path.display()
                ))
                .into());
            }
            return Err(DomainError::already_exists(format!("tenant {tenant_id}")).into());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_register", e))?;

        let created_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, display_name, class_name, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(&display_name)
        .bind(&class_name)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::from(DomainError::already_exists(format!("tenant {tenant_id}")))
            } else {
                map_sqlx_error("insert_tenant", e)
            }
        })?;

        let store = match StoreHandle::connect(&self.config, tenant_id.clone(), &path, true).await {
            Ok(store) => store,
            Err(err) => {
                discard_store_file(&path);
                return Err(err);
            }
        };

        if let Err(err) = tx.commit().await {
            store.close().await;
            discard_store_file(&path);
            return Err(map_sqlx_error("commit_register", err));
        }

        open.insert(tenant_id.clone(), store);
        info!(tenant = %tenant_id, "tenant registered");

        Ok(Tenant {
            id: tenant_id.clone(),
            display_name,
            class_name,
            created_at,
        })
    }

    /// Login check: whether `tenant_id` is registered.
    #[instrument(skip(self), fields(tenant = %tenant_id), err)]
    pub async fn exists(&self, tenant_id: &TenantId) -> StoreResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM tenants WHERE tenant_id = ?1")
            .bind(tenant_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("tenant_exists", e))?;
        Ok(found.is_some())
    }

    #[instrument(skip(self), fields(tenant = %tenant_id), err)]
    pub async fn get(&self, tenant_id: &TenantId) -> StoreResult<Tenant> {
        let row: Option<TenantRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, display_name, class_name, created_at
            FROM tenants
            WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_tenant", e))?;

        let row = row.ok_or_else(|| DomainError::not_found(format!("tenant {tenant_id}")))?;
        Ok(row.try_into()?)
    }

    #[instrument(skip(self), err)]
    pub async fn list(&self) -> StoreResult<Vec<Tenant>> {
        let rows: Vec<TenantRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, display_name, class_name, created_at
            FROM tenants
            ORDER BY tenant_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_tenants", e))?;

        rows.into_iter()
            .map(|row| Tenant::try_from(row).map_err(StoreError::from))
            .collect()
    }

    /// Open the store of a registered tenant.
    ///
    /// `NotFound` if the tenant is unknown or its store was never provisioned.
    #[instrument(skip(self), fields(tenant = %tenant_id), err)]
    pub async fn open_store(&self, tenant_id: &TenantId) -> StoreResult<StoreHandle> {
        let mut open = self.open.lock().await;
        if let Some(store) = open.get(tenant_id) {
            return Ok(store.clone());
        }

        let path = self.config.store_path(tenant_id);
        let registered = self.exists(tenant_id).await?;
        if !registered && path.exists() {
            warn!(
                tenant = %tenant_id,
                path = %path.display(),
                "store file exists without a registry record"
            );
        }
        if !registered || !path.exists() {
            return Err(DomainError::not_found(format!("store for tenant {tenant_id}")).into());
        }

        let store = StoreHandle::connect(&self.config, tenant_id.clone(), &path, false).await?;
        open.insert(tenant_id.clone(), store.clone());
        Ok(store)
    }

    /// Close one tenant's store and drop it from the open set.
    ///
    /// Handles obtained earlier fail on their next query; the next
    /// `open_store` reconnects. Returns whether the store was open.
    #[instrument(skip(self), fields(tenant = %tenant_id))]
    pub async fn close_store(&self, tenant_id: &TenantId) -> bool {
        // Closed under the lock so a concurrent `open_store` cannot create a
        // second pool (and a second write lock) for the same file.
        let mut open = self.open.lock().await;
        match open.remove(tenant_id) {
            Some(store) => {
                store.close().await;
                info!(tenant = %tenant_id, "tenant store closed");
                true
            }
            None => false,
        }
    }

    /// Close every open store and the registry itself.
    pub async fn close(&self) {
        let mut open = self.open.lock().await;
        for (_, store) in open.drain() {
            store.close().await;
        }
        self.pool.close().await;
    }
}

fn discard_store_file(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        if let Err(err) = std::fs::remove_file(&file) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?file, "failed to discard store file: {err:?}");
            }
        }
    }
}

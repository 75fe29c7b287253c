//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

use classwms_core::TenantId;

use crate::error::{StoreError, StoreResult};

pub const ENV_DATA_DIR: &str = "CLASSWMS_DATA_DIR";
pub const ENV_MAX_CONNECTIONS: &str = "CLASSWMS_MAX_CONNECTIONS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CLASSWMS_BUSY_TIMEOUT_MS";

const REGISTRY_FILE: &str = "registry.db";
const TENANTS_DIR: &str = "tenants";

/// Where stores live on disk and how their pools are sized.
///
/// Layout under `data_dir`:
///
/// ```text
/// registry.db            tenant records
/// tenants/<tenant>.db    one isolated store per tenant
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Pool size per store (registry included).
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Build a config from `CLASSWMS_*` environment variables, falling back
    /// to defaults for unset values.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    StoreError::Config(format!("{ENV_MAX_CONNECTIONS} must be a positive integer, got {raw:?}"))
                })?;
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            let ms = raw.trim().parse::<u64>().map_err(|_| {
                StoreError::Config(format!("{ENV_BUSY_TIMEOUT_MS} must be milliseconds, got {raw:?}"))
            })?;
            config.busy_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILE)
    }

    pub fn tenants_dir(&self) -> PathBuf {
        self.data_dir.join(TENANTS_DIR)
    }

    pub fn store_path(&self, tenant_id: &TenantId) -> PathBuf {
        self.tenants_dir().join(format!("{tenant_id}.db"))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

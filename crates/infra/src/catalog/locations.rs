use tracing::{debug, instrument};

use classwms_core::{DomainError, LocationId};
use classwms_inventory::{Location, NewLocation};

use crate::error::{is_unique_violation, map_sqlx_error, StoreError, StoreResult};
use crate::store::StoreHandle;

#[derive(Debug, sqlx::FromRow)]
struct LocationRow {
    id: i64,
    location_code: String,
    zone: Option<String>,
    description: Option<String>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Location {
            id: LocationId::new(row.id),
            location_code: row.location_code,
            zone: row.zone,
            description: row.description,
        }
    }
}

/// Storage locations of one store.
#[derive(Debug, Clone)]
pub struct LocationRegistry {
    store: StoreHandle,
}

impl LocationRegistry {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Create a location; its code must be unique within the store.
    #[instrument(skip(self, location), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn create(&self, location: NewLocation) -> StoreResult<LocationId> {
        let location = location.validated()?;

        let mut txn = self.store.write().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO locations (location_code, zone, description)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&location.location_code)
        .bind(&location.zone)
        .bind(&location.description)
        .execute(txn.conn())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::from(DomainError::already_exists(format!(
                    "location code {}",
                    location.location_code
                )))
            } else {
                map_sqlx_error("insert_location", e)
            }
        })?;
        txn.commit().await?;

        let id = LocationId::new(result.last_insert_rowid());
        debug!(location_id = %id, code = %location.location_code, "location created");
        Ok(id)
    }

    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn get(&self, id: LocationId) -> StoreResult<Location> {
        let row: Option<LocationRow> = sqlx::query_as(
            "SELECT id, location_code, zone, description FROM locations WHERE id = ?1",
        )
        .bind(id.get())
        .fetch_optional(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("get_location", e))?;

        row.map(Location::from)
            .ok_or_else(|| DomainError::not_found(format!("location {id}")).into())
    }

    /// Lookup by code, for callers that only know the code.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn find_by_code(&self, location_code: &str) -> StoreResult<Option<Location>> {
        let row: Option<LocationRow> = sqlx::query_as(
            "SELECT id, location_code, zone, description FROM locations WHERE location_code = ?1",
        )
        .bind(location_code.trim())
        .fetch_optional(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("find_location_by_code", e))?;

        Ok(row.map(Location::from))
    }

    /// All locations ordered by code.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn list(&self) -> StoreResult<Vec<Location>> {
        let rows: Vec<LocationRow> = sqlx::query_as(
            "SELECT id, location_code, zone, description FROM locations ORDER BY location_code ASC",
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("list_locations", e))?;

        Ok(rows.into_iter().map(Location::from).collect())
    }

    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn delete(&self, id: LocationId) -> StoreResult<()> {
        let mut txn = self.store.write().await?;
        let result = sqlx::query("DELETE FROM locations WHERE id = ?1")
            .bind(id.get())
            .execute(txn.conn())
            .await
            .map_err(|e| map_sqlx_error("delete_location", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("location {id}")).into());
        }
        txn.commit().await
    }
}

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use classwms_core::{DomainError, SupplierId};
use classwms_parties::{ContactInfo, NewSupplier, Supplier};

use crate::error::{map_sqlx_error, StoreResult};
use crate::store::StoreHandle;

const SUPPLIER_COLUMNS: &str = "id, name, tax_id, address, phone, email, created_at";

#[derive(Debug, sqlx::FromRow)]
struct SupplierRow {
    id: i64,
    name: String,
    tax_id: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<SupplierRow> for Supplier {
    fn from(row: SupplierRow) -> Self {
        Supplier {
            id: SupplierId::new(row.id),
            name: row.name,
            tax_id: row.tax_id,
            contact: ContactInfo {
                email: row.email,
                phone: row.phone,
                address: row.address,
            },
            created_at: row.created_at,
        }
    }
}

/// Suppliers of one store.
#[derive(Debug, Clone)]
pub struct SupplierRegistry {
    store: StoreHandle,
}

impl SupplierRegistry {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    #[instrument(skip(self, supplier), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn create(&self, supplier: NewSupplier) -> StoreResult<SupplierId> {
        let supplier = supplier.validated()?;

        let mut txn = self.store.write().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO suppliers (name, tax_id, address, phone, email, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&supplier.name)
        .bind(&supplier.tax_id)
        .bind(&supplier.contact.address)
        .bind(&supplier.contact.phone)
        .bind(&supplier.contact.email)
        .bind(Utc::now())
        .execute(txn.conn())
        .await
        .map_err(|e| map_sqlx_error("insert_supplier", e))?;
        txn.commit().await?;

        let id = SupplierId::new(result.last_insert_rowid());
        debug!(supplier_id = %id, name = %supplier.name, "supplier created");
        Ok(id)
    }

    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn get(&self, id: SupplierId) -> StoreResult<Supplier> {
        let row: Option<SupplierRow> =
            sqlx::query_as(&format!("SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE id = ?1"))
                .bind(id.get())
                .fetch_optional(self.store.pool())
                .await
                .map_err(|e| map_sqlx_error("get_supplier", e))?;

        row.map(Supplier::from)
            .ok_or_else(|| DomainError::not_found(format!("supplier {id}")).into())
    }

    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn find_by_name(&self, name: &str) -> StoreResult<Vec<Supplier>> {
        let rows: Vec<SupplierRow> = sqlx::query_as(&format!(
            "SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE name = ?1 ORDER BY id ASC"
        ))
        .bind(name.trim())
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("find_suppliers_by_name", e))?;

        Ok(rows.into_iter().map(Supplier::from).collect())
    }

    /// All suppliers ordered by name.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn list(&self) -> StoreResult<Vec<Supplier>> {
        let rows: Vec<SupplierRow> = sqlx::query_as(&format!(
            "SELECT {SUPPLIER_COLUMNS} FROM suppliers ORDER BY name ASC, id ASC"
        ))
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("list_suppliers", e))?;

        Ok(rows.into_iter().map(Supplier::from).collect())
    }

    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn delete(&self, id: SupplierId) -> StoreResult<()> {
        let mut txn = self.store.write().await?;
        let result = sqlx::query("DELETE FROM suppliers WHERE id = ?1")
            .bind(id.get())
            .execute(txn.conn())
            .await
            .map_err(|e| map_sqlx_error("delete_supplier", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("supplier {id}")).into());
        }
        txn.commit().await
    }
}

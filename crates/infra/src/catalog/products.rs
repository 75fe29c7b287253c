use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, instrument};

use classwms_core::{DomainError, ProductId};
use classwms_inventory::{apply_stock_delta, NewProduct, Product, ProductDetails, ProductOrder};

use crate::error::{is_foreign_key_violation, map_sqlx_error, StoreError, StoreResult};
use crate::store::StoreHandle;

const PRODUCT_COLUMNS: &str =
    "id, name, description, category, barcode, quantity, created_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: i64,
    name: String,
    description: Option<String>,
    category: Option<String>,
    barcode: Option<String>,
    quantity: i64,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId::new(row.id),
            name: row.name,
            description: row.description,
            category: row.category,
            barcode: row.barcode,
            quantity: row.quantity,
            created_at: row.created_at,
        }
    }
}

/// Products and their stock levels.
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    store: StoreHandle,
}

impl ProductCatalog {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    #[instrument(skip(self, product), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn create(&self, product: NewProduct) -> StoreResult<ProductId> {
        let product = product.validated()?;

        let mut txn = self.store.write().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO products (name, description, category, barcode, quantity, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.barcode)
        .bind(product.quantity)
        .bind(Utc::now())
        .execute(txn.conn())
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        txn.commit().await?;

        let id = ProductId::new(result.last_insert_rowid());
        debug!(product_id = %id, name = %product.name, "product created");
        Ok(id)
    }

    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn get(&self, id: ProductId) -> StoreResult<Product> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"))
                .bind(id.get())
                .fetch_optional(self.store.pool())
                .await
                .map_err(|e| map_sqlx_error("get_product", e))?;

        row.map(Product::from)
            .ok_or_else(|| DomainError::not_found(format!("product {id}")).into())
    }

    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn list(&self, order: ProductOrder) -> StoreResult<Vec<Product>> {
        let order_by = match order {
            ProductOrder::Name => "name ASC, id ASC",
            ProductOrder::Recent => "created_at DESC, id DESC",
        };
        self.fetch(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY {order_by}"))
            .await
    }

    /// The `limit` most recently created products.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn recent(&self, limit: u32) -> StoreResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))
        .bind(i64::from(limit))
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("recent_products", e))?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Products whose name matches exactly; names are not unique.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn find_by_name(&self, name: &str) -> StoreResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE name = ?1 ORDER BY id ASC"
        ))
        .bind(name.trim())
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("find_products_by_name", e))?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Replace the descriptive fields of a product; stock is untouched.
    #[instrument(skip(self, details), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn update_details(&self, id: ProductId, details: ProductDetails) -> StoreResult<()> {
        let details = details.validated()?;

        let mut txn = self.store.write().await?;
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = ?1, description = ?2, category = ?3, barcode = ?4
            WHERE id = ?5
            "#,
        )
        .bind(&details.name)
        .bind(&details.description)
        .bind(&details.category)
        .bind(&details.barcode)
        .bind(id.get())
        .execute(txn.conn())
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("product {id}")).into());
        }
        txn.commit().await
    }

    /// Delete a product by id.
    ///
    /// Products referenced by committed documents cannot be deleted.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn delete(&self, id: ProductId) -> StoreResult<()> {
        let mut txn = self.store.write().await?;
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id.get())
            .execute(txn.conn())
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::from(DomainError::conflict(format!(
                        "product {id} is referenced by documents"
                    )))
                } else {
                    map_sqlx_error("delete_product", e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("product {id}")).into());
        }
        txn.commit().await
    }

    /// Apply `delta` to a product's stock and return the new quantity.
    ///
    /// Fails with `NegativeStock` if the result would be below zero; the
    /// stored quantity is then unchanged.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn adjust_quantity(&self, id: ProductId, delta: i64) -> StoreResult<i64> {
        let mut txn = self.store.write().await?;
        let quantity = adjust_quantity_in(txn.conn(), id, delta).await?;
        txn.commit().await?;
        Ok(quantity)
    }

    async fn fetch(&self, sql: &str) -> StoreResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(sql)
            .fetch_all(self.store.pool())
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;
        Ok(rows.into_iter().map(Product::from).collect())
    }
}

/// The single stock-mutating primitive, run inside the caller's write
/// transaction.
pub(crate) async fn adjust_quantity_in(
    conn: &mut SqliteConnection,
    id: ProductId,
    delta: i64,
) -> StoreResult<i64> {
    let available: Option<i64> = sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?1")
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_quantity", e))?;
    let available = available.ok_or_else(|| DomainError::not_found(format!("product {id}")))?;

    let next = apply_stock_delta(id, available, delta)?;

    sqlx::query("UPDATE products SET quantity = ?1 WHERE id = ?2")
        .bind(next)
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("update_quantity", e))?;

    debug!(product_id = %id, available, delta, next, "stock adjusted");
    Ok(next)
}

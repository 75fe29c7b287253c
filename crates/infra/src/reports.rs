//! Read-only stock aggregates for dashboard-style views.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use classwms_inventory::{CategoryStock, Product};

use crate::catalog::ProductRow;
use crate::error::{map_sqlx_error, StoreResult};
use crate::store::StoreHandle;

/// Record counts and total units held by one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockSummary {
    pub product_count: i64,
    pub location_count: i64,
    pub supplier_count: i64,
    pub document_count: i64,
    pub total_quantity: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    category: String,
    quantity: i64,
}

#[derive(Debug, Clone)]
pub struct StockReport {
    store: StoreHandle,
}

impl StockReport {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn summary(&self) -> StoreResult<StockSummary> {
        sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM products)                  AS product_count,
                (SELECT COUNT(*) FROM locations)                 AS location_count,
                (SELECT COUNT(*) FROM suppliers)                 AS supplier_count,
                (SELECT COUNT(*) FROM invoices)                  AS document_count,
                (SELECT COALESCE(SUM(quantity), 0) FROM products) AS total_quantity
            "#,
        )
        .fetch_one(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("stock_summary", e))
    }

    /// Products with stock on hand, largest quantity first.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn in_stock(&self) -> StoreResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, category, barcode, quantity, created_at
            FROM products
            WHERE quantity > 0
            ORDER BY quantity DESC, name ASC, id ASC
            "#,
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("in_stock_products", e))?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Units in stock per category; uncategorized products group under `""`.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn stock_by_category(&self) -> StoreResult<Vec<CategoryStock>> {
        let rows: Vec<CategoryRow> = sqlx::query_as(
            r#"
            SELECT COALESCE(category, '') AS category, SUM(quantity) AS quantity
            FROM products
            WHERE quantity > 0
            GROUP BY COALESCE(category, '')
            ORDER BY category ASC
            "#,
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("stock_by_category", e))?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryStock {
                category: row.category,
                quantity: row.quantity,
            })
            .collect())
    }
}

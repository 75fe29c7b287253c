//! Idempotent schema setup for the registry and for tenant stores.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so applying the schema to an
//! up-to-date database is a no-op. There is no migration versioning.

use sqlx::SqlitePool;
use tracing::instrument;

use crate::error::{map_sqlx_error, StoreResult};

const REGISTRY_SCHEMA: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS tenants (
        tenant_id     TEXT PRIMARY KEY,
        display_name  TEXT NOT NULL,
        class_name    TEXT NOT NULL,
        created_at    TEXT NOT NULL
    )
    "#];

const TENANT_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        name         TEXT NOT NULL,
        description  TEXT NULL,
        category     TEXT NULL,
        barcode      TEXT NULL,
        quantity     INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
        created_at   TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        location_code  TEXT NOT NULL UNIQUE,
        zone           TEXT NULL,
        description    TEXT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        type              TEXT NULL,
        product_id        INTEGER NULL,
        location_id       INTEGER NULL,
        quantity          INTEGER NULL,
        notes             TEXT NULL,
        transaction_date  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS suppliers (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        tax_id      TEXT NULL,
        address     TEXT NULL,
        phone       TEXT NULL,
        email       TEXT NULL,
        created_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS invoices (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        doc_number     TEXT NOT NULL,
        doc_type       TEXT NOT NULL,
        doc_date       TEXT NOT NULL,
        customer_name  TEXT NOT NULL,
        tax_id         TEXT NULL,
        address        TEXT NULL,
        created_at     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS invoice_lines (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id  INTEGER NOT NULL REFERENCES invoices (id),
        product_id  INTEGER NOT NULL REFERENCES products (id),
        quantity    INTEGER NOT NULL CHECK (quantity > 0)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_products_name ON products (name)",
    "CREATE INDEX IF NOT EXISTS idx_invoices_doc_date ON invoices (doc_date, id)",
    "CREATE INDEX IF NOT EXISTS idx_invoice_lines_invoice ON invoice_lines (invoice_id)",
    "CREATE INDEX IF NOT EXISTS idx_invoice_lines_product ON invoice_lines (product_id)",
];

/// Names of the tables every tenant store carries.
pub const TENANT_TABLES: [&str; 6] = [
    "products",
    "locations",
    "transactions",
    "suppliers",
    "invoices",
    "invoice_lines",
];

/// Applies schemas; safe to call on every open.
pub struct SchemaManager;

impl SchemaManager {
    /// Ensure a tenant store carries all of its tables and indexes.
    #[instrument(skip(pool), err)]
    pub async fn ensure_schema(pool: &SqlitePool) -> StoreResult<()> {
        apply(pool, TENANT_SCHEMA).await
    }

    /// Ensure the registry carries its `tenants` table.
    #[instrument(skip(pool), err)]
    pub async fn ensure_registry_schema(pool: &SqlitePool) -> StoreResult<()> {
        apply(pool, REGISTRY_SCHEMA).await
    }
}

async fn apply(pool: &SqlitePool, statements: &[&str]) -> StoreResult<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| map_sqlx_error("begin_schema", e))?;

    for statement in statements {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
    }

    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_schema", e))?;
    Ok(())
}

//! Infrastructure layer: per-tenant SQLite stores and the operations over them.
//!
//! - [`TenantRegistry`] provisions and opens one isolated store per tenant.
//! - [`StoreHandle`] is the explicit context every store operation runs against.
//! - [`ProductCatalog`], [`LocationRegistry`], [`SupplierRegistry`] cover the
//!   reference data; [`InvoiceLedger`] commits documents against stock;
//!   [`StockReport`] answers the read-only dashboard queries.

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod registry;
pub mod reports;
pub mod schema;
pub mod store;

#[cfg(test)]
mod test_support;

pub use catalog::{LocationRegistry, ProductCatalog, SupplierRegistry};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use ledger::InvoiceLedger;
pub use registry::{Tenant, TenantRegistry};
pub use reports::{StockReport, StockSummary};
pub use schema::SchemaManager;
pub use store::{StoreHandle, WriteTxn};

//! CRUD over the reference data of one store.
//!
//! All three registries follow the same shape: `create` validates and inserts
//! under the store's write lock, reads go straight to the pool, deletion is
//! keyed by id. Callers that only know a name resolve it first with the
//! `find_*` lookups.

mod locations;
mod products;
mod suppliers;

pub use locations::LocationRegistry;
pub use products::ProductCatalog;
pub use suppliers::SupplierRegistry;

pub(crate) use products::{adjust_quantity_in, ProductRow};

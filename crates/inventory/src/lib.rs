//! Inventory domain module: products and storage locations.
//!
//! This crate contains business rules for the stock catalog, implemented purely
//! as deterministic domain logic (no IO, no storage).

pub mod location;
pub mod product;

pub use location::{Location, NewLocation};
pub use product::{
    apply_stock_delta, CategoryStock, NewProduct, Product, ProductDetails, ProductOrder,
};

//! `classwms-core`: domain foundation shared by every store component.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod text;

pub use error::{DomainError, DomainResult};
pub use id::{InvoiceId, LocationId, ProductId, SupplierId, TenantId};

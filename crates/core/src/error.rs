//! Domain error model.

use thiserror::Error;

use crate::id::ProductId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
///
/// Every variant identifies the offending value where one exists, so a
/// presentation layer can render a precise message without re-querying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required field was missing or a value was malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A uniqueness constraint was violated (tenant id, location code).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is blocked by existing data (e.g. a referenced product).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A document header is missing its document number or customer name.
    #[error("invalid document header: {0}")]
    InvalidHeader(String),

    /// A document request carried no line with a positive quantity.
    #[error("document has no lines with a positive quantity")]
    EmptyLines,

    /// A document line asks for more than the product has in stock.
    #[error("insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    /// A document line references a product that does not exist.
    #[error("unknown product {product_id}")]
    UnknownProduct { product_id: ProductId },

    /// A direct quantity adjustment would drive stock below zero.
    #[error("stock for product {product_id} cannot go negative (have {available}, delta {delta})")]
    NegativeStock {
        product_id: ProductId,
        available: i64,
        delta: i64,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_header(msg: impl Into<String>) -> Self {
        Self::InvalidHeader(msg.into())
    }

    /// Product id carried by stock-related errors, if any.
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            Self::InsufficientStock { product_id }
            | Self::UnknownProduct { product_id }
            | Self::NegativeStock { product_id, .. } => Some(*product_id),
            _ => None,
        }
    }
}

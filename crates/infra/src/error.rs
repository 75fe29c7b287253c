//! Store error model.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped by [`map_sqlx_error`] as follows:
//!
//! | SQLx error                     | StoreError                              |
//! |--------------------------------|-----------------------------------------|
//! | unique constraint violation    | `Domain(AlreadyExists)`                 |
//! | foreign key violation          | `Domain(Conflict)`                      |
//! | check constraint violation     | `Domain(Validation)`                    |
//! | `RowNotFound`                  | `Domain(NotFound)`                      |
//! | anything else                  | `Database`                              |
//!
//! Call sites that know which value caused a constraint failure (a location
//! code, a product id) build the domain error themselves and only fall back to
//! this mapping for everything else.

use std::path::PathBuf;

use classwms_core::DomainError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A domain failure; the store is unchanged.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Unexpected database failure.
    #[error("database error in {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Filesystem failure while preparing store directories.
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// The domain error behind this failure, if it is one.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            StoreError::Domain(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

pub(crate) fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{}: {}", operation, db_err.message());
            if db_err.is_unique_violation() {
                DomainError::already_exists(msg).into()
            } else if db_err.is_foreign_key_violation() {
                DomainError::conflict(msg).into()
            } else if db_err.is_check_violation() {
                DomainError::validation(msg).into()
            } else {
                StoreError::Database {
                    operation,
                    source: sqlx::Error::Database(db_err),
                }
            }
        }
        sqlx::Error::RowNotFound => DomainError::not_found(operation).into(),
        other => StoreError::Database {
            operation,
            source: other,
        },
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

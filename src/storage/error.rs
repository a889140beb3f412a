//! Error types for the storage layer

use thiserror::Error;

use crate::error::{ClassifiedError, ErrorCategory};

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record matched a claim; the pool is exhausted
    #[error("No {resource} available")]
    NotAvailable { resource: &'static str },

    /// A uniqueness constraint rejected the write
    #[error("Duplicate {kind} id: {id}")]
    Duplicate { kind: &'static str, id: String },

    /// A previous holder panicked while holding the connection
    #[error("Storage lock poisoned")]
    Lock,

    /// Underlying SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure while opening the database
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_available(&self) -> bool {
        matches!(self, Self::NotAvailable { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

impl ClassifiedError for StoreError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotAvailable { .. } | Self::Duplicate { .. })
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAvailable { .. } => ErrorCategory::ResourceExhausted,
            _ => ErrorCategory::Storage,
        }
    }
}

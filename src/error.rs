//! Unified error handling for the minion crate
//!
//! Domain errors live next to their components and all implement
//! [`ClassifiedError`], so the scan retry policy can work on categories
//! instead of concrete types.
//!
//! # Architecture
//!
//! - [`ClassifiedError`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - The failure taxonomy the scan retry policy works on
//! - [`Error`] - Setup failures (store, configuration)
//!
//! # Usage
//!
//! ```rust,ignore
//! use minion::error::{ClassifiedError, ErrorCategory};
//! use minion::scanner::ScanError;
//!
//! fn handle_error(err: ScanError) {
//!     match err.category() {
//!         ErrorCategory::ResourceExhausted => println!("Busy, try later"),
//!         _ if err.is_recoverable() => println!("Retrying: {err}"),
//!         _ => eprintln!("Fatal error: {err}"),
//!     }
//! }
//! ```

use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::pool::PoolError;
pub use crate::remote::RemoteError;
pub use crate::scanner::ScanError;
pub use crate::storage::StoreError;

/// Common trait for all minion error types
pub trait ClassifiedError: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// No identity or egress available; retry later
    ResourceExhausted,
    /// Egress-level failure; retire the egress and substitute
    Transport,
    /// Identity-level failure; retire the identity
    Credential,
    /// Transient protocol failure; retry once with the same session
    TransientProtocol,
    /// Resource or object store unreachable
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Stable label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::ResourceExhausted => "resource_exhausted",
            Self::Transport => "transport",
            Self::Credential => "credential",
            Self::TransientProtocol => "transient_protocol",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Failures of the crate's own setup paths
///
/// Request-path failures stay in their domain types ([`ScanError`] and
/// friends); this covers what can go wrong while wiring the service up.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource or object store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl ClassifiedError for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_recoverable(),
            Self::Config(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Store(e) => e.category(),
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

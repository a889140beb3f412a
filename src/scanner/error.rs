//! Scan outcome errors

use thiserror::Error;

use crate::error::{ClassifiedError, ErrorCategory};
use crate::pool::PoolError;
use crate::remote::RemoteError;
use crate::storage::StoreError;

/// Text reported to callers when no session could be had
pub const BUSY_MESSAGE: &str = "All our minions are busy";

/// Text reported to callers for every other failure
pub const FAILED_MESSAGE: &str = "Scan failed";

/// Why a scan request did not produce results
#[derive(Error, Debug)]
pub enum ScanError {
    /// Neither a parked session nor fresh resources were available
    #[error("All our minions are busy")]
    Busy,

    /// The remote service failed and the retry policy gave up
    #[error("Remote failure: {0}")]
    Remote(#[from] RemoteError),

    /// The resource store could not be reached
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl From<PoolError> for ScanError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Store(e) => Self::Store(e),
            PoolError::Timeout(_) | PoolError::Exhausted { .. } | PoolError::Closed => Self::Busy,
        }
    }
}

impl ScanError {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Caller-facing classification: exhausted pool vs failed request
    pub fn public_message(&self) -> &'static str {
        if self.is_busy() {
            BUSY_MESSAGE
        } else {
            FAILED_MESSAGE
        }
    }

    /// Short label used for metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Remote(_) => "remote_error",
            Self::Store(_) => "store_error",
        }
    }
}

impl ClassifiedError for ScanError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Busy => true,
            Self::Remote(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Busy => ErrorCategory::ResourceExhausted,
            Self::Remote(e) => e.category(),
            Self::Store(e) => e.category(),
        }
    }
}

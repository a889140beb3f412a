//! Error signals reported by the remote client

use thiserror::Error;

use crate::error::{ClassifiedError, ErrorCategory};

/// Failures a [`RemoteClient`](super::RemoteClient) can report
///
/// Every variant maps to exactly one [`ErrorCategory`], which drives the
/// scan retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Cached auth token was refused; a forced login may recover
    #[error("Invalid auth token")]
    InvalidAuthToken,

    /// The egress point stopped routing traffic
    #[error("Egress point is dead")]
    EgressDead,

    /// The remote rejected the credential itself
    #[error("Credential rejected")]
    CredentialRejected,

    /// The account behind the identity is banned
    #[error("Account banned")]
    AccountBanned,

    /// The account has not been activated yet
    #[error("Account not yet active")]
    AccountNotActive,

    /// The remote answered with nothing usable
    #[error("Empty response")]
    EmptyResponse,

    /// Transient platform request failure
    #[error("Invalid platform request")]
    InvalidPlatformRequest,

    /// The per-request deadline elapsed before the remote answered
    #[error("Request deadline exceeded after {0} ms")]
    DeadlineExceeded(u64),

    /// Anything else the client could not make sense of
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ClassifiedError for RemoteError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::TransientProtocol
        ) || matches!(self, Self::InvalidAuthToken)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::EgressDead | Self::DeadlineExceeded(_) => ErrorCategory::Transport,
            Self::CredentialRejected
            | Self::AccountBanned
            | Self::AccountNotActive
            | Self::EmptyResponse => ErrorCategory::Credential,
            Self::InvalidPlatformRequest => ErrorCategory::TransientProtocol,
            Self::InvalidAuthToken | Self::Protocol(_) => ErrorCategory::Other,
        }
    }
}

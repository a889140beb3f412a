//! Retry decision table
//!
//! | Category             | First failure       | Repeated failure |
//! |----------------------|---------------------|------------------|
//! | `Transport`          | kill egress, swap   | kill egress      |
//! | `Credential`         | ban identity        | -                |
//! | `TransientProtocol`  | retry query         | give up          |
//! | anything else        | give up             | -                |
//!
//! Each category gets at most one retry per request.

use crate::error::ErrorCategory;

/// What the orchestrator does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Kill the egress, claim a substitute and redo login + query
    SubstituteEgress,
    /// Kill the egress and abandon the request
    KillEgress,
    /// Ban the identity and abandon the request
    BanIdentity,
    /// Redo the query with the same session
    RetryQuery,
    /// Abandon the request; the session goes back to the pool
    GiveUp,
}

impl Decision {
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::SubstituteEgress | Self::RetryQuery)
    }
}

/// Per-request record of which categories already had their retry
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryBudget {
    transport_used: bool,
    transient_used: bool,
}

impl RetryBudget {
    /// Decide how to react to a failure of `category`, spending the
    /// category's retry if one is granted
    pub fn decide(&mut self, category: ErrorCategory) -> Decision {
        match category {
            ErrorCategory::Transport if !self.transport_used => {
                self.transport_used = true;
                Decision::SubstituteEgress
            }
            ErrorCategory::Transport => Decision::KillEgress,
            ErrorCategory::Credential => Decision::BanIdentity,
            ErrorCategory::TransientProtocol if !self.transient_used => {
                self.transient_used = true;
                Decision::RetryQuery
            }
            _ => Decision::GiveUp,
        }
    }
}

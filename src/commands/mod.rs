pub mod admin;
pub mod serve;

// Re-export command functions for convenience
pub use admin::{
    egress_add, egress_drop_all, egress_remove_dead, identity_add, identity_banned, purge,
    reconcile, stats,
};
pub use serve::serve;

//! Integration tests module
//!
//! End-to-end tests for the minion scanner, including:
//! - Exclusive resource checkout and cooldown
//! - Transport, credential and transient failure handling
//! - Object persistence and area queries
//! - Full request flow through the router

pub mod pool_test;
pub mod retry_scenarios;
pub mod store_test;

//! Persistence layer for the fleet motion engine.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Repository implementations
//!
//! Every table here is keyed by the opaque string ids the domain layer
//! mints (`trip_{deviceId}_{unixMillis}_{uuidSuffix}` and its stop
//! counterpart) rather than database-generated UUIDs, so that a write
//! retried after a crash is idempotent on the id itself.

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;

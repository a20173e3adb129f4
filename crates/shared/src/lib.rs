//! Shared utilities for the fleet motion engine.
//!
//! This crate provides common functionality used across all other crates:
//! - Opaque ID minting for trips and stops
//! - Common validation logic for position samples
//! - Cursor-based pagination for history queries

pub mod ids;
pub mod pagination;
pub mod validation;

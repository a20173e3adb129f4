//! Domain layer for the fleet motion engine.
//!
//! This crate contains:
//! - Domain models (PositionSample, MotionStateSnapshot, TrackerState, Trip, Stop)
//! - Pure detection/analysis services (geometry, segment validation, the
//!   motion state machine, odometer math, quality analysis)
//!
//! Nothing in this crate performs I/O: no async runtime, no database, no
//! network client. Every operation is a deterministic function over its
//! inputs, callable without a tokio runtime.

pub mod models;
pub mod services;

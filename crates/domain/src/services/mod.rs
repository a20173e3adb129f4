//! Domain services for the fleet motion engine.
//!
//! Each module is a pure function library operating on domain models — no
//! I/O, no async runtime. The process-level wiring (hot store, bus,
//! persistence) lives in the API crate and calls into these.

pub mod geometry;
pub mod motion_state_machine;
pub mod odometer;
pub mod quality_analyzer;
pub mod segment_validator;

pub use geometry::{haversine_distance_m, implied_speed_kmh, BoundingBox};
pub use motion_state_machine::{
    process_sample, ClosedStop, ClosedTrip, DetectionConfig, MotionActions,
};
pub use odometer::{odometer_delta_m, trip_distance_at_close};
pub use quality_analyzer::{analyze as analyze_trip_quality, QualityInput};
pub use segment_validator::{
    update_trip_context, validate_segment, SegmentAnomalyReason, SegmentValidation,
    MAX_IMPLIED_SPEED_KMH,
};

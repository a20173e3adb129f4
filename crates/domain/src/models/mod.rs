//! Domain model types: the pure data shapes shared by every component.

pub mod events;
pub mod motion_state;
pub mod position_sample;
pub mod quality;
pub mod stop;
pub mod tracker_state;
pub mod trip;

pub use events::{
    channels, GeoPoint, GeoPointKind, IgnitionChanged, OdometerSummary, PositionRejected,
    StopCompleted, StopStarted, TrackerStateChanged, TripCompleted, TripStarted,
};
pub use motion_state::{
    ActiveStopContext, ActiveTripContext, BufferedPosition, DetectionMethod, LastSample,
    MotionState, MotionStateSnapshot, NoiseContext, SpeedAverages, StopReason,
    TripQualityCounters, POSITION_BUFFER_CAPACITY,
};
pub use position_sample::PositionSample;
pub use quality::{TripQuality, TripQualityFlag};
pub use stop::{GetStopsResponse, Stop, StopPagination};
pub use tracker_state::{PowerType, TrackerHealth, TrackerState};
pub use trip::{GetTripsResponse, Trip, TripPagination};

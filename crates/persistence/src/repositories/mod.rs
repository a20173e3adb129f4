//! Repository implementations for database operations.

pub mod stop;
pub mod tracker_state;
pub mod trip;

pub use stop::{StopQuery, StopRepository, StopStartedInput};
pub use tracker_state::TrackerStateRepository;
pub use trip::{TripCompletedInput, TripQuery, TripRepository, TripStartedInput};

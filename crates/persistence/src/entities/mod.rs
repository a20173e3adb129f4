//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod stop;
pub mod tracker_state;
pub mod trip;

pub use stop::StopEntity;
pub use tracker_state::TrackerStateEntity;
pub use trip::TripEntity;

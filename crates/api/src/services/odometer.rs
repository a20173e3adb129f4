//! Tracker state service (C6): the I/O layer around the odometer
//! accumulator. The pure math lives in `domain::services::odometer`; this
//! wraps it with the hot store read/write and the "every 100 positions or
//! once an hour" persistence cadence down to Postgres.

use thiserror::Error;

use domain::models::TrackerState;
use domain::services::odometer::{odometer_delta_m, trip_distance_at_close};
use persistence::repositories::tracker_state::TrackerStateRepository;

use super::hot_store::{HotStore, HotStoreError};

#[derive(Debug, Error)]
pub enum OdometerError {
    #[error(transparent)]
    HotStore(#[from] HotStoreError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct OdometerService {
    hot_store: HotStore,
    repo: TrackerStateRepository,
}

impl OdometerService {
    pub fn new(hot_store: HotStore, repo: TrackerStateRepository) -> Self {
        Self { hot_store, repo }
    }

    /// Loads a device's tracker state: hot store first, falling back to
    /// Postgres, and finally to a fresh state for a device never seen.
    pub async fn load(&self, device_id: &str) -> Result<TrackerState, OdometerError> {
        if let Some(state) = self.hot_store.get_tracker_state(device_id).await? {
            return Ok(state);
        }
        if let Some(entity) = self.repo.find_by_device(device_id).await? {
            let state = entity.into_domain();
            self.hot_store.put_tracker_state(&state).await?;
            return Ok(state);
        }
        Ok(TrackerState::new(device_id))
    }

    /// Applies one processed sample to the tracker state: advances the
    /// odometer from the last known position, records ignition/power
    /// diagnostics, and persists to Postgres once the cadence says to.
    pub async fn apply_sample(
        &self,
        state: &mut TrackerState,
        latitude: f64,
        longitude: f64,
        timestamp_millis: i64,
        ignition: bool,
        overnight_gap: bool,
    ) -> Result<(), OdometerError> {
        if let (Some(prev_lat), Some(prev_lon), Some(prev_ts)) =
            (state.last_latitude, state.last_longitude, state.last_seen_at)
        {
            let delta =
                odometer_delta_m(prev_lat, prev_lon, prev_ts, latitude, longitude, timestamp_millis);
            state.total_odometer += delta;
        }

        if overnight_gap {
            state.record_overnight_gap(timestamp_millis);
        }

        state.last_latitude = Some(latitude);
        state.last_longitude = Some(longitude);
        state.last_seen_at = Some(timestamp_millis);
        state.first_seen_at = state.first_seen_at.or(Some(timestamp_millis));
        state.last_ignition = Some(ignition);
        state.positions_since_persist += 1;

        self.hot_store.put_tracker_state(state).await?;

        if state.should_persist(timestamp_millis) {
            self.repo.upsert(state).await?;
            state.mark_persisted(timestamp_millis);
            self.hot_store.put_tracker_state(state).await?;
        }

        Ok(())
    }

    /// Final trip distance: the odometer delta accrued since the trip's
    /// start snapshot, falling back to the trip's own running total when no
    /// snapshot was taken.
    pub fn trip_distance(&self, state: &TrackerState, fallback_trip_distance: f64) -> f64 {
        trip_distance_at_close(
            state.total_odometer,
            state.trip_odometer_start,
            fallback_trip_distance,
        )
    }

    /// Applies an operator-initiated odometer correction (the "Set
    /// odometer" operation), returning `(previous, new, offset)`.
    pub async fn set_displayed_odometer(
        &self,
        device_id: &str,
        initial_odometer: f64,
    ) -> Result<(f64, f64, f64), OdometerError> {
        let mut state = self.load(device_id).await?;
        let result = state.set_displayed_odometer(initial_odometer);
        self.repo.upsert(&state).await?;
        self.hot_store.put_tracker_state(&state).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_distance_delegates_to_domain_math() {
        let mut state = TrackerState::new("D1");
        state.total_odometer = 5_000.0;
        state.trip_odometer_start = Some(4_000.0);
        let fallback_unused = 999.0;
        assert_eq!(
            trip_distance_at_close(state.total_odometer, state.trip_odometer_start, fallback_unused),
            1_000.0
        );
    }
}

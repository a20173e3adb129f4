//! Stop writer (C8): persists stop lifecycle writes and builds the events
//! to publish alongside them.

use domain::models::{ActiveStopContext, GeoPoint, MotionState, StopCompleted, StopStarted};
use domain::services::motion_state_machine::ClosedStop;
use persistence::entities::StopEntity;
use persistence::repositories::stop::{StopRepository, StopStartedInput};

fn millis_to_rfc3339(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339()
}

#[derive(Clone)]
pub struct StopWriter {
    repo: StopRepository,
}

impl StopWriter {
    pub fn new(repo: StopRepository) -> Self {
        Self { repo }
    }

    pub async fn handle_started(
        &self,
        device_id: &str,
        stop: &ActiveStopContext,
        current_state: MotionState,
        odometer_total: f64,
    ) -> Result<(StopEntity, StopStarted), sqlx::Error> {
        let entity = self
            .repo
            .insert_started(StopStartedInput {
                id: stop.stop_id.clone(),
                trip_id: stop.trip_id.clone(),
                device_id: device_id.to_string(),
                start_time: stop.start_time,
                latitude: stop.start_lat,
                longitude: stop.start_lon,
                reason: stop.reason.as_str().to_string(),
                metadata: stop.metadata.clone(),
            })
            .await?;

        let event = StopStarted {
            stop_id: stop.stop_id.clone(),
            trip_id: stop.trip_id.clone(),
            device_id: device_id.to_string(),
            start_time: millis_to_rfc3339(stop.start_time),
            location: GeoPoint::new(stop.start_lat, stop.start_lon),
            reason: stop.reason,
            current_state,
            odometer: odometer_total,
            metadata: stop.metadata.clone(),
        };

        Ok((entity, event))
    }

    /// Closes out the stop on `stop:completed`. `discard` is set when the
    /// stop's parent trip failed to clear the persistence bar in the same
    /// sample: the stop is dropped along with it rather than completed
    /// (Open Question: a stop's lifecycle follows its parent trip's persist
    /// decision).
    pub async fn handle_completed(
        &self,
        device_id: &str,
        closed: &ClosedStop,
        current_state: MotionState,
        discard: bool,
    ) -> Result<Option<StopCompleted>, sqlx::Error> {
        if discard {
            self.repo.discard(&closed.stop_id, device_id).await?;
            return Ok(None);
        }

        let duration_secs = ((closed.end_time - closed.start_time) as f64 / 1000.0).max(0.0) as i64;

        let completed = self
            .repo
            .complete_stop(&closed.stop_id, closed.end_time, duration_secs)
            .await?;

        if completed.is_none() {
            return Ok(None);
        }

        Ok(Some(StopCompleted {
            stop_id: closed.stop_id.clone(),
            trip_id: closed.trip_id.clone(),
            device_id: device_id.to_string(),
            start_time: millis_to_rfc3339(closed.start_time),
            location: GeoPoint::new(closed.start_lat, closed.start_lon),
            reason: closed.reason,
            end_time: millis_to_rfc3339(closed.end_time),
            duration: duration_secs,
            current_state,
            metadata: closed.metadata.clone(),
        }))
    }
}

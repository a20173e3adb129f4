//! Ingest pipeline: the per-sample pipeline tying the hot store (C5), the
//! motion state machine (C3), the tracker state service (C6), the
//! persistence writers (C8), and the event bus (C7) together.
//!
//! Must be driven from inside the per-device dispatcher (C4): nothing here
//! is safe to call concurrently for the same device, since it reads,
//! mutates, and writes back that device's hot state.

use serde::Serialize;
use tracing::{info, warn};

use domain::models::{
    channels, GeoPoint, IgnitionChanged, MotionStateSnapshot, OdometerSummary, PositionRejected,
    PositionSample, TrackerState, TrackerStateChanged,
};
use domain::services::motion_state_machine::{process_sample, DetectionConfig};
use shared::validation::{
    validate_accuracy, validate_bearing, validate_latitude, validate_longitude, validate_speed,
    validate_timestamp, DEFAULT_POSITION_MAX_AGE_HOURS,
};

use super::bus::EventBus;
use super::hot_store::HotStore;
use super::odometer::OdometerService;
use super::stop_writer::StopWriter;
use super::trip_writer::TripWriter;

#[derive(Clone)]
pub struct IngestPipeline {
    hot_store: HotStore,
    bus: EventBus,
    odometer: OdometerService,
    trip_writer: TripWriter,
    stop_writer: StopWriter,
    config: DetectionConfig,
}

impl IngestPipeline {
    pub fn new(
        hot_store: HotStore,
        bus: EventBus,
        odometer: OdometerService,
        trip_writer: TripWriter,
        stop_writer: StopWriter,
        config: DetectionConfig,
    ) -> Self {
        Self {
            hot_store,
            bus,
            odometer,
            trip_writer,
            stop_writer,
            config,
        }
    }

    async fn publish<T: Serialize>(&self, channel: &str, payload: &T) {
        if let Err(err) = self.bus.publish(channel, payload).await {
            warn!(error = %err, channel, "failed to publish event");
        }
    }

    async fn reject(&self, device_id: Option<&str>, reason: String, original_event: serde_json::Value) {
        warn!(device_id = device_id.unwrap_or("unknown"), reason = %reason, "rejecting position sample");
        let event = PositionRejected {
            device_id: device_id.unwrap_or("unknown").to_string(),
            reason,
            rejected_at: chrono::Utc::now().timestamp_millis(),
            original_event,
        };
        self.publish(channels::POSITION_REJECTED, &event).await;
    }

    /// Parses and field-validates a raw `position:new` payload. Returns
    /// `None` (after publishing `position:rejected`) when the payload is
    /// malformed or fails a sanity check — callers should stop there.
    async fn parse_and_validate(&self, raw_payload: &str) -> Option<PositionSample> {
        let value: serde_json::Value = match serde_json::from_str(raw_payload) {
            Ok(v) => v,
            Err(err) => {
                self.reject(
                    None,
                    format!("MALFORMED_PAYLOAD: {err}"),
                    serde_json::Value::String(raw_payload.to_string()),
                )
                .await;
                return None;
            }
        };

        let sample: PositionSample = match serde_json::from_value(value.clone()) {
            Ok(s) => s,
            Err(err) => {
                self.reject(None, format!("MALFORMED_PAYLOAD: {err}"), value).await;
                return None;
            }
        };

        macro_rules! reject_on_err {
            ($check:expr) => {
                if let Err(e) = $check {
                    let reason = e.message.map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string());
                    self.reject(Some(&sample.device_id), reason, value).await;
                    return None;
                }
            };
        }

        reject_on_err!(validate_latitude(sample.latitude));
        reject_on_err!(validate_longitude(sample.longitude));
        reject_on_err!(validate_speed(sample.speed));
        if let Some(accuracy) = sample.accuracy {
            reject_on_err!(validate_accuracy(accuracy));
        }
        if let Some(heading) = sample.heading {
            reject_on_err!(validate_bearing(heading));
        }
        reject_on_err!(validate_timestamp(sample.timestamp, DEFAULT_POSITION_MAX_AGE_HOURS));

        Some(sample)
    }

    /// Entry point for a raw `position:new` bus message.
    pub async fn process_raw(&self, raw_payload: &str) {
        if let Some(sample) = self.parse_and_validate(raw_payload).await {
            self.process_sample(sample).await;
        }
    }

    /// Runs one already-validated sample through detection, persistence, and
    /// event publication.
    pub async fn process_sample(&self, sample: PositionSample) {
        let device_id = sample.device_id.clone();

        match self
            .hot_store
            .check_and_advance_throttle(&device_id, sample.timestamp)
            .await
        {
            Ok(false) => return,
            Ok(true) => {}
            Err(err) => {
                warn!(error = %err, device_id = %device_id, "throttle check failed, processing anyway");
            }
        }

        let mut snapshot = match self.hot_store.get_motion_state(&device_id).await {
            Ok(Some(s)) => s,
            Ok(None) => MotionStateSnapshot::new(&device_id, sample.timestamp),
            Err(err) => {
                warn!(error = %err, device_id = %device_id, "hot store read failed, starting from a fresh snapshot");
                MotionStateSnapshot::new(&device_id, sample.timestamp)
            }
        };

        let mut tracker_state = match self.odometer.load(&device_id).await {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, device_id = %device_id, "tracker state load failed, starting from a fresh state");
                TrackerState::new(&device_id)
            }
        };

        let prev_motion_state = snapshot.state;
        let last_known_ignition = tracker_state.last_ignition;
        let effective_ignition = sample.effective_ignition(last_known_ignition);
        let odometer_before_sample = tracker_state.total_odometer;

        let actions = process_sample(
            &mut snapshot,
            &sample,
            last_known_ignition,
            odometer_before_sample,
            &self.config,
        );

        if let Err(err) = self
            .odometer
            .apply_sample(
                &mut tracker_state,
                sample.latitude,
                sample.longitude,
                sample.timestamp,
                effective_ignition,
                actions.overnight_gap,
            )
            .await
        {
            warn!(error = %err, device_id = %device_id, "failed to update tracker state");
        }

        if actions.started_trip.is_some() {
            // Matches the odometer baseline handed to `process_sample` above,
            // not the post-delta total: the trip's distance at close time is
            // measured from the instant it opened.
            tracker_state.trip_odometer_start = Some(odometer_before_sample);
            tracker_state.total_trips_count += 1;
        }

        if let Some(trip) = &actions.started_trip {
            match self
                .trip_writer
                .handle_started(&device_id, trip, snapshot.state)
                .await
            {
                Ok((_, event)) => self.publish(channels::TRIP_STARTED, &event).await,
                Err(err) => warn!(
                    error = %err, device_id = %device_id, trip_id = %trip.trip_id,
                    "failed to persist trip:started"
                ),
            }
        }

        let mut discarded_trip_id: Option<String> = None;
        if let Some(closed) = &actions.closed_trip {
            let final_distance = self.odometer.trip_distance(&tracker_state, closed.distance_m);
            tracker_state.trip_odometer_start = None;
            if !closed.persist {
                discarded_trip_id = Some(closed.trip_id.clone());
            }
            match self
                .trip_writer
                .handle_completed(
                    &device_id,
                    closed,
                    final_distance,
                    tracker_state.displayed_odometer(),
                    snapshot.state,
                )
                .await
            {
                Ok(Some(event)) => self.publish(channels::TRIP_COMPLETED, &event).await,
                Ok(None) => {}
                Err(err) => warn!(
                    error = %err, device_id = %device_id, trip_id = %closed.trip_id,
                    "failed to close trip"
                ),
            }
        }

        if let Some(stop) = &actions.started_stop {
            tracker_state.total_stops_count += 1;
            match self
                .stop_writer
                .handle_started(&device_id, stop, snapshot.state, tracker_state.displayed_odometer())
                .await
            {
                Ok((_, event)) => self.publish(channels::STOP_STARTED, &event).await,
                Err(err) => warn!(
                    error = %err, device_id = %device_id, stop_id = %stop.stop_id,
                    "failed to persist stop:started"
                ),
            }
        }

        if let Some(closed) = &actions.closed_stop {
            let discard = discarded_trip_id
                .as_deref()
                .zip(closed.trip_id.as_deref())
                .is_some_and(|(discarded, stop_trip)| discarded == stop_trip);
            match self
                .stop_writer
                .handle_completed(&device_id, closed, snapshot.state, discard)
                .await
            {
                Ok(Some(event)) => self.publish(channels::STOP_COMPLETED, &event).await,
                Ok(None) => {}
                Err(err) => warn!(
                    error = %err, device_id = %device_id, stop_id = %closed.stop_id,
                    "failed to close stop"
                ),
            }
        }

        if let Some(ignition) = actions.ignition_changed {
            let event = IgnitionChanged {
                device_id: device_id.clone(),
                timestamp: sample.timestamp,
                ignition,
                latitude: Some(sample.latitude),
                longitude: Some(sample.longitude),
            };
            self.publish(channels::IGNITION_CHANGED, &event).await;
        }

        if snapshot.state != prev_motion_state {
            let event = TrackerStateChanged {
                tracker_id: device_id.clone(),
                device_id: device_id.clone(),
                previous_state: prev_motion_state,
                current_state: snapshot.state,
                timestamp: sample.timestamp,
                reason: "motion_state_transition".to_string(),
                odometer: OdometerSummary {
                    total: tracker_state.displayed_odometer(),
                    total_km: tracker_state.displayed_odometer() / 1000.0,
                    current_trip: snapshot.active_trip.as_ref().map(|t| t.distance),
                    current_trip_km: snapshot.active_trip.as_ref().map(|t| t.distance / 1000.0),
                },
                last_position: Some(GeoPoint::new(sample.latitude, sample.longitude)),
                current_trip: snapshot.active_trip.as_ref().map(|t| t.trip_id.clone()),
            };
            self.publish(channels::TRACKER_STATE_CHANGED, &event).await;
        }

        if let Err(err) = self.hot_store.put_tracker_state(&tracker_state).await {
            warn!(error = %err, device_id = %device_id, "failed to persist tracker state");
        }
        if let Err(err) = self.hot_store.put_motion_state(&snapshot).await {
            warn!(error = %err, device_id = %device_id, "failed to persist motion state snapshot");
        }

        info!(device_id = %device_id, state = %snapshot.state, "sample processed");
    }
}

//! Motion state machine (C3): classifies each incoming sample into
//! STOPPED/IDLE/MOVING, drives trip and stop lifecycle transitions, and
//! accumulates trip distance via the segment validator.
//!
//! This module is pure and synchronous: it takes the device's previous
//! snapshot and a new sample, and returns the next snapshot plus the list of
//! side-effecting actions the caller (C4's dispatcher) should carry out.
//! Nothing here touches the hot store, the bus, or the database.

use serde_json::Value;

use crate::models::{
    ActiveStopContext, ActiveTripContext, BufferedPosition, DetectionMethod, LastSample,
    MotionState, MotionStateSnapshot, NoiseContext, PositionSample, StopReason,
    TripQualityCounters,
};

use super::segment_validator::{update_trip_context, validate_segment};

/// Overridable detection thresholds (§4.2). All defaults match the spec's
/// published values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    pub min_moving_speed_kmh: f64,
    pub min_trip_distance_m: f64,
    pub min_trip_duration_secs: i64,
    pub min_stop_duration_secs: i64,
    pub max_gap_duration_secs: i64,
    pub max_overnight_gap_duration_secs: i64,
    pub orphan_trip_timeout_secs: i64,
    pub max_idle_duration_secs: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_moving_speed_kmh: 5.0,
            min_trip_distance_m: 100.0,
            min_trip_duration_secs: 60,
            min_stop_duration_secs: 300,
            max_gap_duration_secs: 600,
            max_overnight_gap_duration_secs: 1800,
            orphan_trip_timeout_secs: 1800,
            max_idle_duration_secs: 1800,
        }
    }
}

/// A trip carried forward from before this sample, captured for the writer
/// to close out. Distinct from `ActiveTripContext` in that its fields are
/// frozen at the moment of closure.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrip {
    pub trip_id: String,
    pub start_time: i64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_time: i64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub distance_m: f64,
    pub max_speed_kmh: f64,
    pub avg_speed_kmh: f64,
    pub stops_count: u32,
    pub detection_method: DetectionMethod,
    pub metadata: Value,
    pub noise_context: NoiseContext,
    pub quality_counters: TripQualityCounters,
    pub odometer_start: f64,
    /// Whether this trip clears the persistence bar (duration + distance) or
    /// should be silently discarded.
    pub persist: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedStop {
    pub stop_id: String,
    pub trip_id: Option<String>,
    pub start_time: i64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_time: i64,
    pub reason: StopReason,
    pub metadata: Value,
}

/// Side effects the caller must carry out after a sample is processed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MotionActions {
    pub started_trip: Option<ActiveTripContext>,
    pub closed_trip: Option<ClosedTrip>,
    pub started_stop: Option<ActiveStopContext>,
    pub closed_stop: Option<ClosedStop>,
    /// Set when this sample's effective ignition differs from the prior one.
    pub ignition_changed: Option<bool>,
    /// Set when the gap handler detected a gap longer than
    /// `max_overnight_gap_duration_secs`.
    pub overnight_gap: bool,
}

/// Classifies a single sample into STOPPED/IDLE/MOVING given its ignition and
/// speed context. `current_state` is consulted only to resolve the
/// anti-flap case where speed and the 30s average disagree.
fn classify(
    ignition: bool,
    speed_kmh: f64,
    speed_avg_30s_kmh: f64,
    current_state: MotionState,
    config: &DetectionConfig,
) -> MotionState {
    if !ignition {
        return MotionState::Stopped;
    }
    let instant_moving = speed_kmh >= config.min_moving_speed_kmh;
    let average_moving = speed_avg_30s_kmh >= config.min_moving_speed_kmh;
    match (instant_moving, average_moving) {
        (true, true) => MotionState::Moving,
        (false, false) => MotionState::Idle,
        _ => {
            if matches!(current_state, MotionState::Moving | MotionState::Idle) {
                current_state
            } else {
                MotionState::Idle
            }
        }
    }
}

fn mint_trip_id(device_id: &str) -> String {
    shared::ids::mint_trip_id(device_id)
}

fn mint_stop_id(device_id: &str) -> String {
    shared::ids::mint_stop_id(device_id)
}

fn start_trip(
    device_id: &str,
    sample: &PositionSample,
    detection_method: DetectionMethod,
    odometer_start: f64,
) -> ActiveTripContext {
    ActiveTripContext {
        trip_id: mint_trip_id(device_id),
        start_time: sample.timestamp,
        start_lat: sample.latitude,
        start_lon: sample.longitude,
        distance: 0.0,
        max_speed: sample.speed,
        stops_count: 0,
        confirmed: false,
        metadata: sample.metadata.clone(),
        noise_context: NoiseContext::new(sample.latitude, sample.longitude),
        quality_counters: TripQualityCounters::default(),
        detection_method,
        odometer_start,
    }
}

fn start_stop(
    device_id: &str,
    sample: &PositionSample,
    trip_id: Option<String>,
    reason: StopReason,
) -> ActiveStopContext {
    ActiveStopContext {
        stop_id: mint_stop_id(device_id),
        trip_id,
        start_time: sample.timestamp,
        start_lat: sample.latitude,
        start_lon: sample.longitude,
        reason,
        metadata: sample.metadata.clone(),
    }
}

fn close_trip(
    trip: ActiveTripContext,
    end_time: i64,
    end_lat: f64,
    end_lon: f64,
    config: &DetectionConfig,
) -> ClosedTrip {
    let duration_secs = ((end_time - trip.start_time) as f64 / 1000.0).max(0.0) as i64;
    let avg_speed_kmh = trip.noise_context.avg_speed();
    let persist = duration_secs >= config.min_trip_duration_secs
        && trip.distance >= config.min_trip_distance_m;
    ClosedTrip {
        trip_id: trip.trip_id,
        start_time: trip.start_time,
        start_lat: trip.start_lat,
        start_lon: trip.start_lon,
        end_time,
        end_lat,
        end_lon,
        distance_m: trip.distance,
        max_speed_kmh: trip.max_speed,
        avg_speed_kmh,
        stops_count: trip.stops_count,
        detection_method: trip.detection_method,
        metadata: trip.metadata,
        noise_context: trip.noise_context,
        quality_counters: trip.quality_counters,
        odometer_start: trip.odometer_start,
        persist,
    }
}

fn close_stop(stop: ActiveStopContext, end_time: i64) -> ClosedStop {
    ClosedStop {
        stop_id: stop.stop_id,
        trip_id: stop.trip_id,
        start_time: stop.start_time,
        start_lat: stop.start_lat,
        start_lon: stop.start_lon,
        end_time,
        reason: stop.reason,
        metadata: stop.metadata,
    }
}

/// Applies `sample` to `snapshot`, returning the actions the caller should
/// carry out. `snapshot` is mutated in place to the post-sample state.
pub fn process_sample(
    snapshot: &mut MotionStateSnapshot,
    sample: &PositionSample,
    last_known_ignition: Option<bool>,
    odometer_total: f64,
    config: &DetectionConfig,
) -> MotionActions {
    let mut actions = MotionActions::default();
    let effective_ignition = sample.effective_ignition(last_known_ignition);

    if let Some(last) = snapshot.last_sample {
        if last.ignition != effective_ignition {
            actions.ignition_changed = Some(effective_ignition);
        }

        let gap_secs = (sample.timestamp - last.timestamp) / 1000;
        if gap_secs > config.max_gap_duration_secs {
            handle_gap(snapshot, sample, gap_secs, config, &mut actions);
        }
    }

    accumulate_distance(snapshot, sample, &mut actions);

    snapshot.push_position(BufferedPosition {
        timestamp: sample.timestamp,
        latitude: sample.latitude,
        longitude: sample.longitude,
        speed: sample.speed,
    });
    snapshot.recompute_speed_averages(sample.timestamp);

    let new_state = classify(
        effective_ignition,
        sample.speed,
        snapshot.speed_averages.avg_30s,
        snapshot.state,
        config,
    );

    apply_transition(snapshot, sample, new_state, config, &mut actions, odometer_total);

    snapshot.last_sample = Some(LastSample {
        timestamp: sample.timestamp,
        latitude: sample.latitude,
        longitude: sample.longitude,
        speed: sample.speed,
        ignition: effective_ignition,
    });
    snapshot.bump_version();

    actions
}

fn accumulate_distance(
    snapshot: &mut MotionStateSnapshot,
    sample: &PositionSample,
    _actions: &mut MotionActions,
) {
    let Some(last) = snapshot.last_sample else {
        return;
    };
    let Some(trip) = snapshot.active_trip.as_mut() else {
        return;
    };

    let prior_sample = PositionSample {
        device_id: sample.device_id.clone(),
        timestamp: last.timestamp,
        latitude: last.latitude,
        longitude: last.longitude,
        speed: last.speed,
        ignition: Some(last.ignition),
        heading: None,
        altitude: None,
        accuracy: None,
        satellites: None,
        metadata: Value::Null,
    };

    let validation = validate_segment(&prior_sample, sample, Some(&trip.noise_context));
    update_trip_context(&mut trip.noise_context, sample);

    trip.distance += validation.adjusted_distance_m;
    trip.max_speed = trip.max_speed.max(sample.speed);
    trip.quality_counters.segments_total += 1;
    trip.quality_counters.original_distance += validation.original_distance_m;
    if validation.adjusted_distance_m < validation.original_distance_m {
        trip.quality_counters.segments_adjusted += 1;
    }
    if validation.reason
        == Some(super::segment_validator::SegmentAnomalyReason::GpsNoise)
    {
        trip.quality_counters.gps_noise_segments += 1;
    }
}

fn handle_gap(
    snapshot: &mut MotionStateSnapshot,
    sample: &PositionSample,
    gap_secs: i64,
    config: &DetectionConfig,
    actions: &mut MotionActions,
) {
    let is_overnight_gap = gap_secs >= config.max_overnight_gap_duration_secs;
    actions.overnight_gap = is_overnight_gap;

    if let Some(stop) = snapshot.active_stop.take() {
        actions.closed_stop = Some(close_stop(stop, sample.timestamp));
    }

    let should_close_trip = gap_secs >= config.min_stop_duration_secs || is_overnight_gap;
    if should_close_trip {
        if let Some(trip) = snapshot.active_trip.take() {
            actions.closed_trip = Some(close_trip(
                trip,
                sample.timestamp,
                sample.latitude,
                sample.longitude,
                config,
            ));
        }
    }

    // Restart hot state as if `sample` were the first sample seen, carrying
    // the trip forward only when the gap didn't close it.
    snapshot.state = MotionState::Unknown;
    snapshot.state_since = sample.timestamp;
    snapshot.last_sample = None;
}

#[allow(clippy::too_many_arguments)]
fn apply_transition(
    snapshot: &mut MotionStateSnapshot,
    sample: &PositionSample,
    new_state: MotionState,
    config: &DetectionConfig,
    actions: &mut MotionActions,
    odometer_total: f64,
) {
    let prev_state = snapshot.state;

    if prev_state == MotionState::Unknown {
        // First sample (or first sample after a gap reset).
        match new_state {
            MotionState::Moving => {
                let trip = if let Some(existing) = snapshot.active_trip.take() {
                    existing
                } else {
                    start_trip(&sample.device_id, sample, DetectionMethod::Motion, odometer_total)
                };
                actions.started_trip = Some(trip.clone());
                snapshot.active_trip = Some(trip);
            }
            MotionState::Stopped | MotionState::Idle => {
                if snapshot.active_stop.is_none() {
                    let reason = if new_state == MotionState::Stopped {
                        StopReason::IgnitionOff
                    } else {
                        StopReason::NoMovement
                    };
                    let trip_id = snapshot.active_trip.as_ref().map(|t| t.trip_id.clone());
                    let stop = start_stop(&sample.device_id, sample, trip_id, reason);
                    actions.started_stop = Some(stop.clone());
                    snapshot.active_stop = Some(stop);
                }
            }
            MotionState::Unknown => {}
        }
        snapshot.state = new_state;
        snapshot.state_since = sample.timestamp;
        return;
    }

    if prev_state == new_state {
        if new_state == MotionState::Idle {
            maybe_close_idle_trip(snapshot, sample, config, actions);
        }
        return;
    }

    match (prev_state, new_state) {
        (MotionState::Stopped, MotionState::Moving) | (MotionState::Idle, MotionState::Moving) => {
            let stop_duration_secs = snapshot
                .active_stop
                .as_ref()
                .map(|s| (sample.timestamp - s.start_time) / 1000)
                .unwrap_or(0);

            if let Some(stop) = snapshot.active_stop.take() {
                actions.closed_stop = Some(close_stop(stop, sample.timestamp));
            }

            if let Some(trip) = snapshot.active_trip.take() {
                if stop_duration_secs >= config.min_stop_duration_secs {
                    actions.closed_trip = Some(close_trip(
                        trip,
                        sample.timestamp,
                        sample.latitude,
                        sample.longitude,
                        config,
                    ));
                    let new_trip =
                        start_trip(&sample.device_id, sample, DetectionMethod::Motion, odometer_total);
                    actions.started_trip = Some(new_trip.clone());
                    snapshot.active_trip = Some(new_trip);
                } else {
                    snapshot.active_trip = Some(trip);
                }
            } else {
                let new_trip =
                    start_trip(&sample.device_id, sample, DetectionMethod::Motion, odometer_total);
                actions.started_trip = Some(new_trip.clone());
                snapshot.active_trip = Some(new_trip);
            }
        }
        (MotionState::Moving, MotionState::Stopped) => {
            let trip_id = snapshot.active_trip.as_ref().map(|t| t.trip_id.clone());
            let stop = start_stop(&sample.device_id, sample, trip_id, StopReason::IgnitionOff);
            actions.started_stop = Some(stop.clone());
            snapshot.active_stop = Some(stop);
        }
        (MotionState::Moving, MotionState::Idle) => {
            let trip_id = snapshot.active_trip.as_ref().map(|t| t.trip_id.clone());
            let stop = start_stop(&sample.device_id, sample, trip_id, StopReason::NoMovement);
            actions.started_stop = Some(stop.clone());
            snapshot.active_stop = Some(stop);
        }
        (MotionState::Idle, MotionState::Stopped) => {
            if let Some(stop) = snapshot.active_stop.take() {
                actions.closed_stop = Some(close_stop(stop, sample.timestamp));
            }
            let trip_id = snapshot.active_trip.as_ref().map(|t| t.trip_id.clone());
            let stop = start_stop(&sample.device_id, sample, trip_id, StopReason::IgnitionOff);
            actions.started_stop = Some(stop.clone());
            snapshot.active_stop = Some(stop);
        }
        (MotionState::Stopped, MotionState::Idle) => {
            if let Some(stop) = snapshot.active_stop.take() {
                actions.closed_stop = Some(close_stop(stop, sample.timestamp));
            }
            let trip_id = snapshot.active_trip.as_ref().map(|t| t.trip_id.clone());
            let stop = start_stop(&sample.device_id, sample, trip_id, StopReason::NoMovement);
            actions.started_stop = Some(stop.clone());
            snapshot.active_stop = Some(stop);
        }
        _ => {}
    }

    snapshot.state = new_state;
    snapshot.state_since = sample.timestamp;
}

/// An IDLE state sustained past `max_idle_duration_secs` closes the active
/// trip, but leaves the stop open.
fn maybe_close_idle_trip(
    snapshot: &mut MotionStateSnapshot,
    sample: &PositionSample,
    config: &DetectionConfig,
    actions: &mut MotionActions,
) {
    let idle_duration_secs = (sample.timestamp - snapshot.state_since) / 1000;
    if idle_duration_secs < config.max_idle_duration_secs {
        return;
    }
    if let Some(trip) = snapshot.active_trip.take() {
        actions.closed_trip = Some(close_trip(
            trip,
            sample.timestamp,
            sample.latitude,
            sample.longitude,
            config,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(ts: i64, lat: f64, lon: f64, speed: f64, ignition: bool) -> PositionSample {
        PositionSample {
            device_id: "D1".into(),
            timestamp: ts,
            latitude: lat,
            longitude: lon,
            speed,
            ignition: Some(ignition),
            heading: None,
            altitude: None,
            accuracy: None,
            satellites: None,
            metadata: json!({}),
        }
    }

    #[test]
    fn first_moving_sample_opens_a_trip() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        let config = DetectionConfig::default();
        let actions =
            process_sample(&mut snapshot, &sample(0, -31.42, -64.18, 40.0, true), None, 0.0, &config);
        assert!(actions.started_trip.is_some());
        assert_eq!(snapshot.state, MotionState::Moving);
    }

    #[test]
    fn first_stationary_sample_opens_a_stop() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        let config = DetectionConfig::default();
        let actions =
            process_sample(&mut snapshot, &sample(0, -31.42, -64.18, 0.0, false), None, 0.0, &config);
        assert!(actions.started_stop.is_some());
        assert_eq!(snapshot.state, MotionState::Stopped);
    }

    #[test]
    fn happy_path_trip_accumulates_distance_and_closes_on_long_stop() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        let config = DetectionConfig::default();
        let mut lat = -31.42;
        let lon = -64.18;
        for i in 0i64..15 {
            let ts = i * 5_000;
            lat -= 0.0003;
            process_sample(&mut snapshot, &sample(ts, lat, lon, 45.0, true), None, 0.0, &config);
        }
        assert_eq!(snapshot.state, MotionState::Moving);
        let trip = snapshot.active_trip.as_ref().unwrap();
        assert!(trip.distance > 0.0);

        // Ignition off for long enough to clear the min-stop-duration bar.
        let stop_ts = 14 * 5_000 + 400_000;
        let actions = process_sample(
            &mut snapshot,
            &sample(stop_ts, lat, lon, 0.0, false),
            None,
            0.0,
            &config,
        );
        assert!(actions.started_stop.is_some());

        let resume_ts = stop_ts + 400_000;
        let actions = process_sample(
            &mut snapshot,
            &sample(resume_ts, lat, lon, 40.0, true),
            None,
            0.0,
            &config,
        );
        assert!(actions.closed_trip.is_some());
        assert!(actions.closed_trip.unwrap().persist);
        assert!(actions.started_trip.is_some());
    }

    #[test]
    fn short_stop_continues_the_same_trip() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        let config = DetectionConfig::default();
        process_sample(&mut snapshot, &sample(0, -31.42, -64.18, 40.0, true), None, 0.0, &config);
        let trip_id = snapshot.active_trip.as_ref().unwrap().trip_id.clone();

        process_sample(
            &mut snapshot,
            &sample(10_000, -31.42, -64.18, 0.0, false),
            None,
            0.0,
            &config,
        );
        // Ignition back on 120s later: below the 300s min stop duration.
        let actions = process_sample(
            &mut snapshot,
            &sample(130_000, -31.42, -64.18, 40.0, true),
            None,
            0.0,
            &config,
        );

        assert!(actions.closed_trip.is_none());
        assert_eq!(snapshot.active_trip.as_ref().unwrap().trip_id, trip_id);
    }

    #[test]
    fn ignition_change_is_reported() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        let config = DetectionConfig::default();
        process_sample(&mut snapshot, &sample(0, -31.42, -64.18, 0.0, true), None, 0.0, &config);
        let actions = process_sample(
            &mut snapshot,
            &sample(5_000, -31.42, -64.18, 0.0, false),
            None,
            0.0,
            &config,
        );
        assert_eq!(actions.ignition_changed, Some(false));
    }

    #[test]
    fn long_gap_closes_trip_and_resets_to_unknown() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        let config = DetectionConfig::default();
        process_sample(&mut snapshot, &sample(0, -31.42, -64.18, 40.0, true), None, 0.0, &config);

        // Gap far exceeding max_gap_duration and min_stop_duration.
        let gap_ts = 3_600_000;
        let actions = process_sample(
            &mut snapshot,
            &sample(gap_ts, -31.50, -64.30, 0.0, true),
            None,
            0.0,
            &config,
        );
        assert!(actions.closed_trip.is_some());
    }

    #[test]
    fn overnight_gap_is_flagged() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        let config = DetectionConfig::default();
        process_sample(&mut snapshot, &sample(0, -31.42, -64.18, 0.0, false), None, 0.0, &config);

        let gap_ts = 7_200_000;
        let actions = process_sample(
            &mut snapshot,
            &sample(gap_ts, -31.42, -64.18, 0.0, false),
            None,
            0.0,
            &config,
        );
        assert!(actions.overnight_gap);
    }

    #[test]
    fn sustained_idle_closes_trip_but_keeps_stop_open() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        let config = DetectionConfig::default();
        // Build up a moving trip first so speed_avg_30s is read as moving.
        process_sample(&mut snapshot, &sample(0, -31.42, -64.18, 40.0, true), None, 0.0, &config);
        process_sample(
            &mut snapshot,
            &sample(5_000, -31.421, -64.18, 40.0, true),
            None,
            0.0,
            &config,
        );
        // Drop to idle speed with ignition still on.
        process_sample(
            &mut snapshot,
            &sample(40_000, -31.421, -64.18, 0.0, true),
            None,
            0.0,
            &config,
        );
        assert_eq!(snapshot.state, MotionState::Idle);

        let sustained_ts = 40_000 + (config.max_idle_duration_secs * 1000) + 1_000;
        let actions = process_sample(
            &mut snapshot,
            &sample(sustained_ts, -31.421, -64.18, 0.0, true),
            None,
            0.0,
            &config,
        );
        assert!(actions.closed_trip.is_some());
        assert!(snapshot.active_stop.is_some());
    }
}

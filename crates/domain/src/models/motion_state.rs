//! Per-device hot motion state: the live state machine snapshot kept in the
//! hot state store (C5) and mutated by the motion state machine (C3).

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capacity of the rolling position buffer carried on [`MotionStateSnapshot`].
pub const POSITION_BUFFER_CAPACITY: usize = 300;

/// The live motion classification of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MotionState {
    /// Only ever a prior state; never assigned as the result of classification.
    Unknown,
    Stopped,
    Idle,
    Moving,
}

impl MotionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::Unknown => "UNKNOWN",
            MotionState::Stopped => "STOPPED",
            MotionState::Idle => "IDLE",
            MotionState::Moving => "MOVING",
        }
    }
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MotionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNKNOWN" => Ok(MotionState::Unknown),
            "STOPPED" => Ok(MotionState::Stopped),
            "IDLE" => Ok(MotionState::Idle),
            "MOVING" => Ok(MotionState::Moving),
            _ => Err(format!(
                "Invalid motion state: {s}. Must be one of: UNKNOWN, STOPPED, IDLE, MOVING"
            )),
        }
    }
}

/// Reason a stop was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    IgnitionOff,
    NoMovement,
    Parking,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::IgnitionOff => "ignition_off",
            StopReason::NoMovement => "no_movement",
            StopReason::Parking => "parking",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StopReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignition_off" => Ok(StopReason::IgnitionOff),
            "no_movement" => Ok(StopReason::NoMovement),
            "parking" => Ok(StopReason::Parking),
            _ => Err(format!(
                "Invalid stop reason: {s}. Must be one of: ignition_off, no_movement, parking"
            )),
        }
    }
}

/// How a trip's start was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Ignition,
    Motion,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Ignition => "ignition",
            DetectionMethod::Motion => "motion",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignition" => Ok(DetectionMethod::Ignition),
            "motion" => Ok(DetectionMethod::Motion),
            _ => Err(format!(
                "Invalid detection method: {s}. Must be one of: ignition, motion"
            )),
        }
    }
}

/// A single entry of the rolling position buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferedPosition {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
}

/// The last sample processed for a device, cached so the next sample can be
/// diffed against it without a store round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastSample {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub ignition: bool,
}

/// Sliding speed averages over three windows, recomputed from the position
/// buffer on every sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedAverages {
    pub avg_30s: f64,
    pub avg_60s: f64,
    pub avg_300s: f64,
}

/// Accumulating noise-detection context carried while a trip is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseContext {
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub max_distance_from_origin: f64,
    pub bbox_min_lat: f64,
    pub bbox_max_lat: f64,
    pub bbox_min_lon: f64,
    pub bbox_max_lon: f64,
    pub speed_sum: f64,
    pub position_count: u64,
}

impl NoiseContext {
    pub fn new(origin_lat: f64, origin_lon: f64) -> Self {
        Self {
            origin_lat,
            origin_lon,
            max_distance_from_origin: 0.0,
            bbox_min_lat: origin_lat,
            bbox_max_lat: origin_lat,
            bbox_min_lon: origin_lon,
            bbox_max_lon: origin_lon,
            speed_sum: 0.0,
            position_count: 0,
        }
    }

    pub fn avg_speed(&self) -> f64 {
        if self.position_count == 0 {
            0.0
        } else {
            self.speed_sum / self.position_count as f64
        }
    }
}

/// Per-trip quality counters accumulated segment by segment, consumed by the
/// quality analyzer (C10) on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TripQualityCounters {
    pub segments_total: u64,
    pub segments_adjusted: u64,
    pub gps_noise_segments: u64,
    pub original_distance: f64,
}

/// Hot context for the trip currently open on a device, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTripContext {
    pub trip_id: String,
    pub start_time: i64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub distance: f64,
    pub max_speed: f64,
    pub stops_count: u32,
    /// Whether the trip has passed the min-duration/min-distance bar yet.
    /// Purely advisory until close time, which re-evaluates from scratch.
    pub confirmed: bool,
    pub metadata: Value,
    pub noise_context: NoiseContext,
    pub quality_counters: TripQualityCounters,
    pub detection_method: DetectionMethod,
    /// Odometer snapshot taken at trip start (C6 tripOdometerStart).
    pub odometer_start: f64,
}

/// Hot context for the stop currently open on a device, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStopContext {
    pub stop_id: String,
    pub trip_id: Option<String>,
    pub start_time: i64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub reason: StopReason,
    pub metadata: Value,
}

/// The full hot-state snapshot for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionStateSnapshot {
    pub device_id: String,
    pub state: MotionState,
    pub state_since: i64,
    pub last_sample: Option<LastSample>,
    pub position_buffer: VecDeque<BufferedPosition>,
    pub speed_averages: SpeedAverages,
    /// Strictly increasing per device; every mutation bumps it.
    pub version: u64,
    pub active_trip: Option<ActiveTripContext>,
    pub active_stop: Option<ActiveStopContext>,
}

impl MotionStateSnapshot {
    /// A freshly-created snapshot for a device that has never been seen.
    pub fn new(device_id: impl Into<String>, now_millis: i64) -> Self {
        Self {
            device_id: device_id.into(),
            state: MotionState::Unknown,
            state_since: now_millis,
            last_sample: None,
            position_buffer: VecDeque::with_capacity(POSITION_BUFFER_CAPACITY),
            speed_averages: SpeedAverages::default(),
            version: 0,
            active_trip: None,
            active_stop: None,
        }
    }

    /// Appends a position to the rolling buffer, evicting the oldest entry
    /// once capacity is reached.
    pub fn push_position(&mut self, position: BufferedPosition) {
        if self.position_buffer.len() >= POSITION_BUFFER_CAPACITY {
            self.position_buffer.pop_front();
        }
        self.position_buffer.push_back(position);
    }

    /// Recomputes the three sliding speed averages from the position buffer
    /// relative to `now_millis`.
    pub fn recompute_speed_averages(&mut self, now_millis: i64) {
        self.speed_averages = SpeedAverages {
            avg_30s: self.windowed_avg_speed(now_millis, 30_000),
            avg_60s: self.windowed_avg_speed(now_millis, 60_000),
            avg_300s: self.windowed_avg_speed(now_millis, 300_000),
        };
    }

    fn windowed_avg_speed(&self, now_millis: i64, window_millis: i64) -> f64 {
        let cutoff = now_millis - window_millis;
        let (sum, count) = self
            .position_buffer
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .fold((0.0, 0u64), |(sum, count), p| (sum + p.speed, count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_state_round_trips_through_str() {
        for state in [
            MotionState::Unknown,
            MotionState::Stopped,
            MotionState::Idle,
            MotionState::Moving,
        ] {
            let parsed: MotionState = state.as_str().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn motion_state_from_str_rejects_unknown_strings() {
        assert!("moving".parse::<MotionState>().is_err());
        assert!("".parse::<MotionState>().is_err());
    }

    #[test]
    fn stop_reason_round_trips() {
        for reason in [
            StopReason::IgnitionOff,
            StopReason::NoMovement,
            StopReason::Parking,
        ] {
            assert_eq!(reason.as_str().parse::<StopReason>().unwrap(), reason);
        }
    }

    #[test]
    fn position_buffer_evicts_oldest_beyond_capacity() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        for i in 0..(POSITION_BUFFER_CAPACITY as i64 + 10) {
            snapshot.push_position(BufferedPosition {
                timestamp: i,
                latitude: 0.0,
                longitude: 0.0,
                speed: 0.0,
            });
        }
        assert_eq!(snapshot.position_buffer.len(), POSITION_BUFFER_CAPACITY);
        assert_eq!(snapshot.position_buffer.front().unwrap().timestamp, 10);
    }

    #[test]
    fn windowed_avg_speed_only_considers_recent_entries() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        snapshot.push_position(BufferedPosition {
            timestamp: 0,
            latitude: 0.0,
            longitude: 0.0,
            speed: 100.0,
        });
        snapshot.push_position(BufferedPosition {
            timestamp: 29_000,
            latitude: 0.0,
            longitude: 0.0,
            speed: 10.0,
        });
        snapshot.recompute_speed_averages(30_000);
        // Both samples are within the 30s window at t=30000 (cutoff=0).
        assert_eq!(snapshot.speed_averages.avg_30s, 55.0);
    }

    #[test]
    fn bump_version_is_monotonic() {
        let mut snapshot = MotionStateSnapshot::new("D1", 0);
        assert_eq!(snapshot.version, 0);
        snapshot.bump_version();
        snapshot.bump_version();
        assert_eq!(snapshot.version, 2);
    }
}

//! Tracker state: the persistent mirror of a device's odometer, last-known
//! position, and power diagnostics (C6).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Inferred power wiring of a tracker, derived from overnight-gap frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerType {
    /// Wired to permanent (battery) power; overnight gaps are rare.
    Permanent,
    /// Wired to the ignition line; loses power whenever ignition is off.
    Switched,
    Unknown,
}

impl PowerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerType::Permanent => "permanent",
            PowerType::Switched => "switched",
            PowerType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PowerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PowerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permanent" => Ok(PowerType::Permanent),
            "switched" => Ok(PowerType::Switched),
            "unknown" => Ok(PowerType::Unknown),
            _ => Err(format!(
                "Invalid power type: {s}. Must be one of: permanent, switched, unknown"
            )),
        }
    }
}

/// Reachability classification used by the read API's tracker status
/// endpoint, derived from `lastSeenAt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerHealth {
    Online,
    Stale,
    Offline,
}

impl TrackerHealth {
    /// `online` if seen within 5 minutes, `stale` if within 24 hours, else
    /// `offline`.
    pub fn from_last_seen_ago(last_seen_ago: chrono::Duration) -> Self {
        if last_seen_ago <= chrono::Duration::minutes(5) {
            TrackerHealth::Online
        } else if last_seen_ago <= chrono::Duration::hours(24) {
            TrackerHealth::Stale
        } else {
            TrackerHealth::Offline
        }
    }
}

/// Persistent mirror of a device's cumulative state: odometer, last position,
/// counters, and power diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    pub device_id: String,
    /// GPS-derived cumulative distance in meters. Monotonically non-decreasing.
    pub total_odometer: f64,
    /// Operator-applied additive delta so the displayed odometer matches the
    /// vehicle dashboard.
    pub odometer_offset: f64,
    /// Snapshot of `total_odometer` taken when the current trip started, if any.
    pub trip_odometer_start: Option<f64>,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub last_seen_at: Option<i64>,
    pub first_seen_at: Option<i64>,
    pub last_ignition: Option<bool>,
    pub total_trips_count: u64,
    pub total_driving_time_secs: i64,
    pub total_idle_time_secs: i64,
    pub total_stops_count: u64,
    pub overnight_gap_count: u32,
    pub last_overnight_gap_at: Option<i64>,
    pub power_type: PowerType,
    /// Count of positions accumulated since the odometer was last persisted;
    /// drives the "every 100 positions OR once per hour" persistence cadence.
    pub positions_since_persist: u32,
    pub last_persisted_at: Option<i64>,
}

impl TrackerState {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            total_odometer: 0.0,
            odometer_offset: 0.0,
            trip_odometer_start: None,
            last_latitude: None,
            last_longitude: None,
            last_seen_at: None,
            first_seen_at: None,
            last_ignition: None,
            total_trips_count: 0,
            total_driving_time_secs: 0,
            total_idle_time_secs: 0,
            total_stops_count: 0,
            overnight_gap_count: 0,
            last_overnight_gap_at: None,
            power_type: PowerType::Unknown,
            positions_since_persist: 0,
            last_persisted_at: None,
        }
    }

    /// The odometer value reported to operators: the GPS-derived accumulator
    /// plus the operator-applied offset.
    pub fn displayed_odometer(&self) -> f64 {
        self.total_odometer + self.odometer_offset
    }

    /// Sets the displayed odometer to `initial_odometer` by recomputing the
    /// offset; the monotonic GPS accumulator itself is never rewritten.
    pub fn set_displayed_odometer(&mut self, initial_odometer: f64) -> (f64, f64, f64) {
        let previous = self.displayed_odometer();
        self.odometer_offset = initial_odometer - self.total_odometer;
        (previous, self.displayed_odometer(), self.odometer_offset)
    }

    /// Resets the GPS-derived accumulator to zero and clears the offset with
    /// it, so the displayed odometer starts over cleanly rather than
    /// re-applying a stale offset against the new baseline.
    pub fn reset_odometer(&mut self) {
        self.total_odometer = 0.0;
        self.odometer_offset = 0.0;
    }

    /// Records an overnight gap and updates the inferred power type once at
    /// least 3 have been observed.
    pub fn record_overnight_gap(&mut self, at_millis: i64) {
        self.overnight_gap_count += 1;
        self.last_overnight_gap_at = Some(at_millis);
        if self.overnight_gap_count >= 3 {
            self.power_type = PowerType::Switched;
        }
    }

    /// Whether the odometer should be persisted now, per the "every 100
    /// positions or once an hour" cadence.
    pub fn should_persist(&self, now_millis: i64) -> bool {
        if self.positions_since_persist >= 100 {
            return true;
        }
        match self.last_persisted_at {
            None => true,
            Some(last) => now_millis - last >= 3_600_000,
        }
    }

    pub fn mark_persisted(&mut self, now_millis: i64) {
        self.positions_since_persist = 0;
        self.last_persisted_at = Some(now_millis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displayed_odometer_adds_offset() {
        let mut ts = TrackerState::new("D1");
        ts.total_odometer = 1000.0;
        ts.odometer_offset = 250.0;
        assert_eq!(ts.displayed_odometer(), 1250.0);
    }

    #[test]
    fn set_displayed_odometer_preserves_gps_accumulator() {
        let mut ts = TrackerState::new("D1");
        ts.total_odometer = 5000.0;
        let (previous, new, offset) = ts.set_displayed_odometer(10_000.0);
        assert_eq!(previous, 5000.0);
        assert_eq!(new, 10_000.0);
        assert_eq!(offset, 5000.0);
        assert_eq!(ts.total_odometer, 5000.0);
    }

    #[test]
    fn reset_odometer_zeroes_both_accumulator_and_offset() {
        let mut ts = TrackerState::new("D1");
        ts.total_odometer = 5000.0;
        ts.odometer_offset = 1200.0;
        ts.reset_odometer();
        assert_eq!(ts.total_odometer, 0.0);
        assert_eq!(ts.odometer_offset, 0.0);
        assert_eq!(ts.displayed_odometer(), 0.0);
    }

    #[test]
    fn power_type_inferred_switched_after_three_overnight_gaps() {
        let mut ts = TrackerState::new("D1");
        ts.record_overnight_gap(1);
        assert_eq!(ts.power_type, PowerType::Unknown);
        ts.record_overnight_gap(2);
        assert_eq!(ts.power_type, PowerType::Unknown);
        ts.record_overnight_gap(3);
        assert_eq!(ts.power_type, PowerType::Switched);
    }

    #[test]
    fn should_persist_after_100_positions_or_one_hour() {
        let mut ts = TrackerState::new("D1");
        ts.last_persisted_at = Some(0);
        assert!(!ts.should_persist(1000));
        ts.positions_since_persist = 100;
        assert!(ts.should_persist(1000));

        ts.positions_since_persist = 0;
        assert!(ts.should_persist(3_600_001));
    }

    #[test]
    fn should_persist_true_when_never_persisted() {
        let ts = TrackerState::new("D1");
        assert!(ts.should_persist(0));
    }

    #[test]
    fn tracker_health_thresholds() {
        assert_eq!(
            TrackerHealth::from_last_seen_ago(chrono::Duration::minutes(1)),
            TrackerHealth::Online
        );
        assert_eq!(
            TrackerHealth::from_last_seen_ago(chrono::Duration::hours(1)),
            TrackerHealth::Stale
        );
        assert_eq!(
            TrackerHealth::from_last_seen_ago(chrono::Duration::hours(25)),
            TrackerHealth::Offline
        );
    }
}

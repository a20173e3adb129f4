//! Odometer math (C6): the pure calculations behind the tracker-state
//! accumulator. I/O — reading/writing the hot store and persistence layer —
//! lives in the API crate; this module only computes deltas.

use super::geometry::{haversine_distance_m, implied_speed_kmh};
use super::segment_validator::MAX_IMPLIED_SPEED_KMH;

/// Distance to add to the odometer between two consecutive known positions.
/// Mirrors the segment validator's impossible-speed guard, but operates on
/// the tracker's last-known position rather than the active trip's prior
/// sample — the two can diverge when a trip just opened.
pub fn odometer_delta_m(
    prev_lat: f64,
    prev_lon: f64,
    prev_ts_millis: i64,
    cur_lat: f64,
    cur_lon: f64,
    cur_ts_millis: i64,
) -> f64 {
    let delta_secs = (cur_ts_millis - prev_ts_millis) as f64 / 1000.0;
    if delta_secs <= 0.0 {
        return 0.0;
    }
    let distance_m = haversine_distance_m(prev_lat, prev_lon, cur_lat, cur_lon);
    match implied_speed_kmh(distance_m, delta_secs) {
        Some(speed) if speed > MAX_IMPLIED_SPEED_KMH => 0.0,
        _ => distance_m,
    }
}

/// Final trip distance at close time: the odometer delta accrued since the
/// trip's start snapshot, falling back to the trip's own running total when
/// no snapshot was taken (e.g. the tracker state was missing at trip start).
pub fn trip_distance_at_close(
    total_odometer: f64,
    trip_odometer_start: Option<f64>,
    fallback_trip_distance: f64,
) -> f64 {
    match trip_odometer_start {
        Some(start) => (total_odometer - start).max(0.0),
        None => fallback_trip_distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odometer_delta_accumulates_ordinary_movement() {
        let delta = odometer_delta_m(-31.42, -64.18, 0, -31.4215, -64.18, 5000);
        assert!(delta > 0.0);
    }

    #[test]
    fn odometer_delta_discards_impossible_jump() {
        let delta = odometer_delta_m(-31.0, -64.0, 0, -30.55, -64.0, 1000);
        assert_eq!(delta, 0.0);
    }

    #[test]
    fn odometer_delta_discards_non_positive_time_delta() {
        let delta = odometer_delta_m(-31.42, -64.18, 1000, -31.421, -64.18, 1000);
        assert_eq!(delta, 0.0);
    }

    #[test]
    fn trip_distance_at_close_uses_odometer_snapshot_when_present() {
        let distance = trip_distance_at_close(13_000.0, Some(10_000.0), 9_999.0);
        assert_eq!(distance, 3_000.0);
    }

    #[test]
    fn trip_distance_at_close_falls_back_without_snapshot() {
        let distance = trip_distance_at_close(13_000.0, None, 2_850.0);
        assert_eq!(distance, 2_850.0);
    }

    #[test]
    fn trip_distance_at_close_never_negative() {
        let distance = trip_distance_at_close(5_000.0, Some(9_000.0), 0.0);
        assert_eq!(distance, 0.0);
    }
}

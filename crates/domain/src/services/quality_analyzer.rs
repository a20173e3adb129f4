//! Quality analyzer (C10): classifies a just-completed trip without
//! correcting its distance any further — filtering already happened
//! segment-by-segment in the validator.

use crate::models::{TripQuality, TripQualityFlag};

use super::geometry::haversine_distance_m;

/// `linearDistance` is floored at this value so a trip that starts and ends
/// at (nearly) the same point doesn't divide by zero when computing the
/// route/linear ratio.
const MIN_LINEAR_DISTANCE_M: f64 = 50.0;

const GPS_NOISE_SHARE_THRESHOLD_PCT: f64 = 50.0;
const CIRCULAR_ROUTE_MIN_RATIO: f64 = 5.0;
const CIRCULAR_ROUTE_MIN_OPERATION_AREA_M: f64 = 300.0;
const SHORT_TRIP_MAX_DISTANCE_M: f64 = 500.0;
const SHORT_TRIP_MAX_OPERATION_AREA_M: f64 = 200.0;

/// Inputs accumulated over the lifetime of a trip, handed to the analyzer at
/// close time.
#[derive(Debug, Clone, Copy)]
pub struct QualityInput {
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    /// Final, noise-filtered distance in meters.
    pub distance_m: f64,
    pub max_distance_from_origin_m: f64,
    pub operation_area_diameter_m: f64,
    pub gps_noise_segments: u64,
    pub segments_total: u64,
}

/// Classifies a completed trip into a [`TripQuality`] block.
pub fn analyze(input: QualityInput) -> TripQuality {
    let linear_distance = haversine_distance_m(
        input.start_lat,
        input.start_lon,
        input.end_lat,
        input.end_lon,
    );
    let route_linear_ratio = input.distance_m / linear_distance.max(MIN_LINEAR_DISTANCE_M);
    let gps_noise_percentage = if input.segments_total == 0 {
        0.0
    } else {
        100.0 * input.gps_noise_segments as f64 / input.segments_total as f64
    };

    let flag = if gps_noise_percentage > GPS_NOISE_SHARE_THRESHOLD_PCT {
        TripQualityFlag::GpsNoiseFiltered
    } else if route_linear_ratio > CIRCULAR_ROUTE_MIN_RATIO
        && input.max_distance_from_origin_m > CIRCULAR_ROUTE_MIN_OPERATION_AREA_M
    {
        TripQualityFlag::CircularRoute
    } else if input.distance_m < SHORT_TRIP_MAX_DISTANCE_M
        && input.operation_area_diameter_m < SHORT_TRIP_MAX_OPERATION_AREA_M
    {
        TripQualityFlag::ShortTrip
    } else {
        TripQualityFlag::Valid
    };

    TripQuality {
        original_distance: input.distance_m,
        linear_distance,
        route_linear_ratio,
        operation_area_diameter: input.operation_area_diameter_m,
        gps_noise_percentage,
        flag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> QualityInput {
        QualityInput {
            start_lat: -31.42,
            start_lon: -64.18,
            end_lat: -31.40,
            end_lon: -64.15,
            distance_m: 3000.0,
            max_distance_from_origin_m: 2000.0,
            operation_area_diameter_m: 3000.0,
            gps_noise_segments: 0,
            segments_total: 15,
        }
    }

    #[test]
    fn valid_trip_gets_valid_flag() {
        let quality = analyze(base_input());
        assert_eq!(quality.flag, TripQualityFlag::Valid);
    }

    #[test]
    fn majority_noise_segments_flag_gps_noise_filtered() {
        let mut input = base_input();
        input.gps_noise_segments = 9;
        input.segments_total = 15;
        let quality = analyze(input);
        assert_eq!(quality.flag, TripQualityFlag::GpsNoiseFiltered);
        assert!((quality.gps_noise_percentage - 60.0).abs() < 1e-9);
    }

    #[test]
    fn large_ratio_with_wide_operation_area_flags_circular_route() {
        let mut input = base_input();
        input.start_lat = -31.42;
        input.start_lon = -64.18;
        input.end_lat = -31.42;
        input.end_lon = -64.18;
        input.distance_m = 3000.0;
        input.max_distance_from_origin_m = 500.0;
        let quality = analyze(input);
        assert_eq!(quality.flag, TripQualityFlag::CircularRoute);
    }

    #[test]
    fn short_low_spread_trip_flags_short_trip() {
        let mut input = base_input();
        input.distance_m = 300.0;
        input.operation_area_diameter_m = 100.0;
        input.max_distance_from_origin_m = 50.0;
        input.start_lat = -31.42;
        input.start_lon = -64.18;
        input.end_lat = -31.4203;
        input.end_lon = -64.1803;
        let quality = analyze(input);
        assert_eq!(quality.flag, TripQualityFlag::ShortTrip);
    }

    #[test]
    fn gps_noise_takes_priority_over_other_flags() {
        let mut input = base_input();
        input.distance_m = 300.0;
        input.operation_area_diameter_m = 100.0;
        input.gps_noise_segments = 10;
        input.segments_total = 15;
        let quality = analyze(input);
        assert_eq!(quality.flag, TripQualityFlag::GpsNoiseFiltered);
    }

    #[test]
    fn linear_distance_floor_prevents_division_by_zero() {
        let mut input = base_input();
        input.start_lat = 0.0;
        input.start_lon = 0.0;
        input.end_lat = 0.0;
        input.end_lon = 0.0;
        input.distance_m = 40.0;
        let quality = analyze(input);
        assert_eq!(quality.linear_distance, 0.0);
        assert!((quality.route_linear_ratio - 40.0 / 50.0).abs() < 1e-9);
    }

    #[test]
    fn zero_segments_yields_zero_noise_percentage() {
        let mut input = base_input();
        input.segments_total = 0;
        input.gps_noise_segments = 0;
        let quality = analyze(input);
        assert_eq!(quality.gps_noise_percentage, 0.0);
    }
}

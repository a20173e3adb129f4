//! Segment distance validator (C2): decides whether the distance implied by
//! two consecutive samples is trustworthy, and zeroes it out when it looks
//! like an impossible jump or parked-vehicle GPS jitter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::position_sample::PositionSample;
use crate::models::NoiseContext;

use super::geometry::{haversine_distance_m, implied_speed_kmh, BoundingBox};

/// Implied speed above this is physically impossible for a road vehicle.
pub const MAX_IMPLIED_SPEED_KMH: f64 = 200.0;

/// Once a trip has moved this far from its origin, every subsequent segment
/// is accepted unconditionally: GPS jitter on a moving trip is not worth
/// filtering, only jitter on a vehicle that never left its parking spot.
const TRIP_CONTEXT_ACCEPT_RADIUS_M: f64 = 300.0;

const NOISE_MAX_DISTANCE_FROM_ORIGIN_M: f64 = 150.0;
const NOISE_MAX_BBOX_DIAMETER_M: f64 = 100.0;
const NOISE_MAX_AVG_SPEED_KMH: f64 = 5.0;
const NOISE_MAX_CURRENT_SPEED_KMH: f64 = 5.0;
const NOISE_MAX_ORIGINAL_DISTANCE_M: f64 = 20.0;

/// Threshold used when there is no trip context at all (device not in a
/// trip): small jitter is zeroed whenever the reported speed is zero.
const NO_CONTEXT_ZERO_DISTANCE_THRESHOLD_M: f64 = 5.0;

/// Why a segment's distance was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentAnomalyReason {
    InvalidTime,
    ImpossibleSpeed,
    GpsNoise,
}

impl SegmentAnomalyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentAnomalyReason::InvalidTime => "INVALID_TIME",
            SegmentAnomalyReason::ImpossibleSpeed => "IMPOSSIBLE_SPEED",
            SegmentAnomalyReason::GpsNoise => "GPS_NOISE",
        }
    }
}

impl fmt::Display for SegmentAnomalyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of validating the segment between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentValidation {
    pub is_valid: bool,
    pub original_distance_m: f64,
    pub adjusted_distance_m: f64,
    pub reason: Option<SegmentAnomalyReason>,
    pub implied_speed_kmh: Option<f64>,
}

/// Validates the segment from `prior` to `current`. `noise_ctx` carries the
/// trip's accumulated noise-detection state up through `prior`, or `None` if
/// no trip is currently open on this device.
pub fn validate_segment(
    prior: &PositionSample,
    current: &PositionSample,
    noise_ctx: Option<&NoiseContext>,
) -> SegmentValidation {
    let original_distance_m = haversine_distance_m(
        prior.latitude,
        prior.longitude,
        current.latitude,
        current.longitude,
    );
    let delta_secs = (current.timestamp - prior.timestamp) as f64 / 1000.0;

    if delta_secs <= 0.0 {
        return SegmentValidation {
            is_valid: false,
            original_distance_m,
            adjusted_distance_m: 0.0,
            reason: Some(SegmentAnomalyReason::InvalidTime),
            implied_speed_kmh: None,
        };
    }

    let implied = implied_speed_kmh(original_distance_m, delta_secs);
    if let Some(speed) = implied {
        if speed > MAX_IMPLIED_SPEED_KMH {
            return SegmentValidation {
                is_valid: false,
                original_distance_m,
                adjusted_distance_m: 0.0,
                reason: Some(SegmentAnomalyReason::ImpossibleSpeed),
                implied_speed_kmh: implied,
            };
        }
    }

    if let Some(ctx) = noise_ctx {
        if ctx.max_distance_from_origin >= TRIP_CONTEXT_ACCEPT_RADIUS_M {
            return SegmentValidation {
                is_valid: true,
                original_distance_m,
                adjusted_distance_m: original_distance_m,
                reason: None,
                implied_speed_kmh: implied,
            };
        }

        let bbox = BoundingBox {
            min_lat: ctx.bbox_min_lat,
            max_lat: ctx.bbox_max_lat,
            min_lon: ctx.bbox_min_lon,
            max_lon: ctx.bbox_max_lon,
        };
        let bbox_diameter_m = bbox.diameter_m();
        let avg_speed_kmh = ctx.avg_speed();

        let looks_like_noise = ctx.max_distance_from_origin < NOISE_MAX_DISTANCE_FROM_ORIGIN_M
            && bbox_diameter_m < NOISE_MAX_BBOX_DIAMETER_M
            && avg_speed_kmh < NOISE_MAX_AVG_SPEED_KMH
            && current.speed < NOISE_MAX_CURRENT_SPEED_KMH
            && original_distance_m < NOISE_MAX_ORIGINAL_DISTANCE_M;

        if looks_like_noise {
            return SegmentValidation {
                is_valid: true,
                original_distance_m,
                adjusted_distance_m: 0.0,
                reason: Some(SegmentAnomalyReason::GpsNoise),
                implied_speed_kmh: implied,
            };
        }

        return SegmentValidation {
            is_valid: true,
            original_distance_m,
            adjusted_distance_m: original_distance_m,
            reason: None,
            implied_speed_kmh: implied,
        };
    }

    if current.speed == 0.0 && original_distance_m < NO_CONTEXT_ZERO_DISTANCE_THRESHOLD_M {
        return SegmentValidation {
            is_valid: true,
            original_distance_m,
            adjusted_distance_m: 0.0,
            reason: None,
            implied_speed_kmh: implied,
        };
    }

    SegmentValidation {
        is_valid: true,
        original_distance_m,
        adjusted_distance_m: original_distance_m,
        reason: None,
        implied_speed_kmh: implied,
    }
}

/// Folds `current` into the trip's noise-detection context after a segment
/// has been validated, so the next call sees an up-to-date origin distance,
/// bounding box, and speed average.
pub fn update_trip_context(ctx: &mut NoiseContext, current: &PositionSample) {
    ctx.bbox_min_lat = ctx.bbox_min_lat.min(current.latitude);
    ctx.bbox_max_lat = ctx.bbox_max_lat.max(current.latitude);
    ctx.bbox_min_lon = ctx.bbox_min_lon.min(current.longitude);
    ctx.bbox_max_lon = ctx.bbox_max_lon.max(current.longitude);

    let distance_from_origin =
        haversine_distance_m(ctx.origin_lat, ctx.origin_lon, current.latitude, current.longitude);
    ctx.max_distance_from_origin = ctx.max_distance_from_origin.max(distance_from_origin);

    ctx.speed_sum += current.speed;
    ctx.position_count += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample(ts: i64, lat: f64, lon: f64, speed: f64) -> PositionSample {
        PositionSample {
            device_id: "D1".into(),
            timestamp: ts,
            latitude: lat,
            longitude: lon,
            speed,
            ignition: Some(true),
            heading: None,
            altitude: None,
            accuracy: None,
            satellites: None,
            metadata: Value::Null,
        }
    }

    #[test]
    fn rejects_non_positive_time_delta() {
        let a = sample(1000, 0.0, 0.0, 10.0);
        let b = sample(1000, 0.001, 0.0, 10.0);
        let result = validate_segment(&a, &b, None);
        assert!(!result.is_valid);
        assert_eq!(result.reason, Some(SegmentAnomalyReason::InvalidTime));
        assert_eq!(result.adjusted_distance_m, 0.0);
    }

    #[test]
    fn rejects_impossible_speed() {
        // ~50km apart, 1 second apart.
        let a = sample(0, -31.0, -64.0, 10.0);
        let b = sample(1000, -30.55, -64.0, 10.0);
        let result = validate_segment(&a, &b, None);
        assert!(!result.is_valid);
        assert_eq!(result.reason, Some(SegmentAnomalyReason::ImpossibleSpeed));
        assert_eq!(result.adjusted_distance_m, 0.0);
    }

    #[test]
    fn accepts_full_distance_once_trip_has_moved_away_from_origin() {
        let mut ctx = NoiseContext::new(-31.42, -64.18);
        ctx.max_distance_from_origin = 500.0;
        let a = sample(0, -31.42, -64.18, 40.0);
        let b = sample(5000, -31.421, -64.18, 40.0);
        let result = validate_segment(&a, &b, Some(&ctx));
        assert!(result.is_valid);
        assert_eq!(result.adjusted_distance_m, result.original_distance_m);
        assert_eq!(result.reason, None);
    }

    #[test]
    fn flags_gps_noise_while_parked() {
        let mut ctx = NoiseContext::new(-31.42, -64.18);
        ctx.speed_sum = 5.0;
        ctx.position_count = 3;
        let a = sample(0, -31.42, -64.18, 1.0);
        let b = sample(1000, -31.420002, -64.18, 1.0);
        let result = validate_segment(&a, &b, Some(&ctx));
        assert!(result.is_valid);
        assert_eq!(result.adjusted_distance_m, 0.0);
        assert_eq!(result.reason, Some(SegmentAnomalyReason::GpsNoise));
    }

    #[test]
    fn without_trip_context_zeroes_small_jitter_at_zero_speed() {
        let a = sample(0, -31.42, -64.18, 0.0);
        let b = sample(1000, -31.420001, -64.18, 0.0);
        let result = validate_segment(&a, &b, None);
        assert!(result.is_valid);
        assert_eq!(result.adjusted_distance_m, 0.0);
        assert_eq!(result.reason, None);
    }

    #[test]
    fn accepts_full_distance_for_ordinary_driving_segment() {
        let a = sample(0, -31.42, -64.18, 40.0);
        let b = sample(5000, -31.4215, -64.18, 45.0);
        let result = validate_segment(&a, &b, None);
        assert!(result.is_valid);
        assert_eq!(result.reason, None);
        assert_eq!(result.adjusted_distance_m, result.original_distance_m);
        assert!(result.adjusted_distance_m > 0.0);
    }

    #[test]
    fn adjusted_distance_never_exceeds_original_distance() {
        let mut ctx = NoiseContext::new(-31.42, -64.18);
        ctx.speed_sum = 5.0;
        ctx.position_count = 3;
        let a = sample(0, -31.42, -64.18, 1.0);
        let b = sample(1000, -31.420002, -64.18, 1.0);
        let result = validate_segment(&a, &b, Some(&ctx));
        assert!(result.adjusted_distance_m <= result.original_distance_m);
    }

    #[test]
    fn update_trip_context_tracks_max_distance_and_bbox() {
        let mut ctx = NoiseContext::new(0.0, 0.0);
        let b = sample(1000, 0.01, 0.01, 20.0);
        update_trip_context(&mut ctx, &b);
        assert!(ctx.max_distance_from_origin > 0.0);
        assert_eq!(ctx.bbox_max_lat, 0.01);
        assert_eq!(ctx.bbox_max_lon, 0.01);
        assert_eq!(ctx.position_count, 1);
        assert_eq!(ctx.speed_sum, 20.0);
    }
}

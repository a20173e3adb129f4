//! Trip domain model: a contiguous period of vehicle movement (C8/§3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::motion_state::DetectionMethod;
use super::quality::TripQuality;

/// Represents a trip row, persisted on `trip:started`/`trip:completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub device_id: String,
    /// Milliseconds since epoch.
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    pub start_latitude: f64,
    pub start_longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_longitude: Option<f64>,
    /// Final, noise-filtered distance in meters.
    pub distance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
    pub max_speed: f64,
    pub avg_speed: f64,
    pub stop_count: u32,
    pub is_active: bool,
    pub detection_method: DetectionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<TripQuality>,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Trip {
    /// Whether this trip clears the bar to be closed-and-persisted rather than
    /// silently discarded (§4.2 end-of-trip policy).
    pub fn meets_persistence_bar(
        duration_secs: i64,
        distance: f64,
        min_trip_duration_secs: i64,
        min_trip_distance_m: f64,
    ) -> bool {
        duration_secs >= min_trip_duration_secs && distance >= min_trip_distance_m
    }
}

/// Pagination info for trip list responses, following the cursor convention
/// used across the history query endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Response for `GET /api/v1/devices/:deviceId/trips`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTripsResponse {
    pub trips: Vec<Trip>,
    pub pagination: TripPagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(is_active: bool) -> Trip {
        Trip {
            id: "trip_D1_1_abc".into(),
            device_id: "D1".into(),
            start_time: 0,
            end_time: if is_active { None } else { Some(75_000) },
            start_latitude: -31.42,
            start_longitude: -64.18,
            end_latitude: None,
            end_longitude: None,
            distance: 3000.0,
            duration_secs: if is_active { None } else { Some(75) },
            max_speed: 60.0,
            avg_speed: 40.0,
            stop_count: 0,
            is_active,
            detection_method: DetectionMethod::Motion,
            quality: None,
            metadata: Value::Null,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn meets_persistence_bar_requires_both_duration_and_distance() {
        assert!(Trip::meets_persistence_bar(75, 3000.0, 60, 100.0));
        assert!(!Trip::meets_persistence_bar(30, 3000.0, 60, 100.0));
        assert!(!Trip::meets_persistence_bar(75, 50.0, 60, 100.0));
    }

    #[test]
    fn trip_serializes_active_without_end_fields() {
        let json = serde_json::to_string(&trip(true)).unwrap();
        assert!(!json.contains("endTime"));
        assert!(!json.contains("durationSecs"));
    }

    #[test]
    fn trip_serializes_completed_with_end_fields() {
        let json = serde_json::to_string(&trip(false)).unwrap();
        assert!(json.contains("\"endTime\":75000"));
        assert!(json.contains("\"durationSecs\":75"));
    }
}

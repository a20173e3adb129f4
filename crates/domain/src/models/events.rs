//! Pub/sub payload schemas for the channels listed in §6. Explicit schemas
//! replace duck-typed JSON per the design notes (§9): every field that
//! drives detection logic is strongly typed, and opaque metadata never
//! influences it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::motion_state::{DetectionMethod, MotionState};
use super::stop::StopReason;

/// GeoJSON-style point, used in every event payload that carries a location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: GeoPointKind,
    /// `[longitude, latitude]`, per GeoJSON ordering.
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoPointKind {
    Point,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            kind: GeoPointKind::Point,
            coordinates: [longitude, latitude],
        }
    }
}

/// Published when the ingest subscriber rejects a malformed or physically
/// impossible `position:new` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRejected {
    pub device_id: String,
    pub reason: String,
    pub rejected_at: i64,
    pub original_event: Value,
}

/// Published whenever a sample's effective ignition differs from the
/// tracker's previously known ignition state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnitionChanged {
    pub device_id: String,
    pub timestamp: i64,
    pub ignition: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStarted {
    pub trip_id: String,
    pub device_id: String,
    pub start_time: String,
    pub start_location: GeoPoint,
    pub detection_method: DetectionMethod,
    pub current_state: MotionState,
    pub odometer: f64,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripCompleted {
    pub trip_id: String,
    pub device_id: String,
    pub start_time: String,
    pub start_location: GeoPoint,
    pub detection_method: DetectionMethod,
    pub end_time: String,
    pub duration: i64,
    pub distance: f64,
    pub avg_speed: f64,
    pub max_speed: f64,
    pub stops_count: u32,
    pub end_location: GeoPoint,
    pub current_state: MotionState,
    pub odometer: f64,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopStarted {
    pub stop_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    pub device_id: String,
    pub start_time: String,
    pub location: GeoPoint,
    pub reason: StopReason,
    pub current_state: MotionState,
    pub odometer: f64,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopCompleted {
    pub stop_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    pub device_id: String,
    pub start_time: String,
    pub location: GeoPoint,
    pub reason: StopReason,
    pub end_time: String,
    pub duration: i64,
    pub current_state: MotionState,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OdometerSummary {
    pub total: f64,
    pub total_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_trip: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_trip_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStateChanged {
    pub tracker_id: String,
    pub device_id: String,
    pub previous_state: MotionState,
    pub current_state: MotionState,
    pub timestamp: i64,
    pub reason: String,
    pub odometer: OdometerSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_position: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_trip: Option<String>,
}

/// The set of channel names used across the bus. Kept as plain string
/// constants rather than an enum: channel names are wire contract, not a
/// closed set a `match` needs to be exhaustive over.
pub mod channels {
    pub const POSITION_NEW: &str = "position:new";
    pub const POSITION_REJECTED: &str = "position:rejected";
    pub const IGNITION_CHANGED: &str = "ignition:changed";
    pub const TRIP_STARTED: &str = "trip:started";
    pub const TRIP_COMPLETED: &str = "trip:completed";
    pub const STOP_STARTED: &str = "stop:started";
    pub const STOP_COMPLETED: &str = "stop:completed";
    pub const TRACKER_STATE_CHANGED: &str = "tracker:state:changed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_point_orders_coordinates_as_lon_lat() {
        let point = GeoPoint::new(-31.42, -64.18);
        assert_eq!(point.coordinates, [-64.18, -31.42]);
    }

    #[test]
    fn geo_point_serializes_with_geojson_type() {
        let json = serde_json::to_string(&GeoPoint::new(1.0, 2.0)).unwrap();
        assert!(json.contains("\"type\":\"Point\""));
    }

    #[test]
    fn trip_completed_round_trips_through_json() {
        let event = TripCompleted {
            trip_id: "trip_D1_1_abc".into(),
            device_id: "D1".into(),
            start_time: "2026-01-01T00:00:00Z".into(),
            start_location: GeoPoint::new(-31.42, -64.18),
            detection_method: DetectionMethod::Motion,
            end_time: "2026-01-01T00:01:15Z".into(),
            duration: 75,
            distance: 3000.0,
            avg_speed: 40.0,
            max_speed: 60.0,
            stops_count: 0,
            end_location: GeoPoint::new(-31.40, -64.15),
            current_state: MotionState::Stopped,
            odometer: 3000.0,
            metadata: Value::Null,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: TripCompleted = serde_json::from_str(&json).unwrap();
        assert_eq!(back.trip_id, event.trip_id);
        assert_eq!(back.distance, event.distance);
    }

    #[test]
    fn position_rejected_carries_original_event_verbatim() {
        let event = PositionRejected {
            device_id: "D1".into(),
            reason: "IMPOSSIBLE_SPEED".into(),
            rejected_at: 1000,
            original_event: serde_json::json!({"latitude": 1.0}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"latitude\":1.0"));
    }
}

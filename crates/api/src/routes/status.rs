//! Tracker status endpoint: the read surface over a device's live motion
//! state, odometer, and power diagnostics.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use domain::models::{GeoPoint, MotionState, OdometerSummary, PowerType, TrackerHealth};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatusResponse {
    pub device_id: String,
    pub current_state: MotionState,
    pub health: TrackerHealth,
    pub odometer: OdometerSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_trip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_position: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<i64>,
    pub power_type: PowerType,
    pub total_trips_count: u64,
    pub total_stops_count: u64,
}

/// `GET /api/v1/devices/:deviceId/status`
pub async fn get_status(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<TrackerStatusResponse>, ApiError> {
    let tracker_state = state
        .odometer
        .load(&device_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let snapshot = state
        .hot_store
        .get_motion_state(&device_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let current_state = snapshot.as_ref().map(|s| s.state).unwrap_or(MotionState::Unknown);
    let current_trip = snapshot.as_ref().and_then(|s| s.active_trip.as_ref()).map(|t| t.trip_id.clone());
    let current_trip_distance = snapshot.as_ref().and_then(|s| s.active_trip.as_ref()).map(|t| t.distance);

    let health = match tracker_state.last_seen_at {
        Some(last_seen_at) => {
            let last_seen = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(last_seen_at)
                .unwrap_or_else(chrono::Utc::now);
            TrackerHealth::from_last_seen_ago(chrono::Utc::now() - last_seen)
        }
        None => TrackerHealth::Offline,
    };

    let odometer_total = tracker_state.displayed_odometer();

    let response = TrackerStatusResponse {
        device_id: device_id.clone(),
        current_state,
        health,
        odometer: OdometerSummary {
            total: odometer_total,
            total_km: odometer_total / 1000.0,
            current_trip: current_trip_distance,
            current_trip_km: current_trip_distance.map(|d| d / 1000.0),
        },
        current_trip,
        last_position: match (tracker_state.last_latitude, tracker_state.last_longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        },
        last_seen_at: tracker_state.last_seen_at,
        power_type: tracker_state.power_type,
        total_trips_count: tracker_state.total_trips_count,
        total_stops_count: tracker_state.total_stops_count,
    };

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_when_never_seen() {
        let state = domain::models::TrackerState::new("D1");
        assert!(state.last_seen_at.is_none());
    }
}

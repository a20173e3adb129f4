//! Stop domain model: a contiguous period a device spent not driving (C8/§3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use super::motion_state::StopReason;

/// Represents a stop row, persisted on `stop:started`/`stop:completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: String,
    /// The trip this stop occurred within, if any (a stop may outlive no
    /// trip at all, e.g. at startup before any trip has opened).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    pub device_id: String,
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub reason: StopReason,
    pub is_active: bool,
    #[serde(default)]
    pub metadata: Value,
}

/// Pagination info for stop list responses, following the cursor convention
/// used across the history query endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Response for `GET /api/v1/devices/:deviceId/stops`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStopsResponse {
    pub stops: Vec<Stop>,
    pub pagination: StopPagination,
}

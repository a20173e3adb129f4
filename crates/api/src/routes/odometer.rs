//! Odometer correction endpoint: lets an operator re-baseline a device's
//! displayed total after a meter swap or a known drift.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SetOdometerRequest {
    pub odometer: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOdometerResponse {
    pub previous_odometer: f64,
    pub new_odometer: f64,
    pub odometer_offset: f64,
}

/// `POST /api/v1/devices/:deviceId/odometer`
pub async fn set_odometer(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(body): Json<SetOdometerRequest>,
) -> Result<Json<SetOdometerResponse>, ApiError> {
    if !body.odometer.is_finite() || body.odometer < 0.0 {
        return Err(ApiError::Validation(
            "odometer must be a non-negative, finite number".to_string(),
        ));
    }

    let (previous, new, offset) = state
        .odometer
        .set_displayed_odometer(&device_id, body.odometer)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(SetOdometerResponse {
        previous_odometer: previous,
        new_odometer: new,
        odometer_offset: offset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_odometer() {
        let body = SetOdometerRequest { odometer: -1.0 };
        assert!(body.odometer < 0.0);
    }
}

//! Trip history endpoint: keyset-paginated query over a device's trips.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use domain::models::{GetTripsResponse, TripPagination};
use persistence::repositories::trip::TripQuery;
use shared::pagination::{decode_cursor_opaque, encode_cursor_opaque};

use crate::app::AppState;
use crate::error::ApiError;

const DEFAULT_LIMIT: i32 = 20;
const MAX_LIMIT: i32 = 100;

#[derive(Debug, Deserialize)]
pub struct TripsQueryParams {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub cursor: Option<String>,
    pub limit: Option<i32>,
}

/// `GET /api/v1/devices/:deviceId/trips?from=&to=&cursor=&limit=`
pub async fn list_trips(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(params): Query<TripsQueryParams>,
) -> Result<Json<GetTripsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let (cursor_start_time, cursor_id) = match params.cursor.as_deref() {
        Some(cursor) => {
            let (ts, id) = decode_cursor_opaque(cursor)
                .map_err(|_| ApiError::Validation("invalid cursor".to_string()))?;
            (Some(ts.timestamp_millis()), Some(id))
        }
        None => (None, None),
    };

    let (trips, has_more) = state
        .trip_repo
        .get_trips_by_device(TripQuery {
            device_id,
            cursor_start_time,
            cursor_id,
            from_timestamp: params.from,
            to_timestamp: params.to,
            limit,
        })
        .await?;

    let next_cursor = if has_more {
        trips.last().map(|t| {
            let ts = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(t.start_time)
                .unwrap_or_else(chrono::Utc::now);
            encode_cursor_opaque(ts, &t.id)
        })
    } else {
        None
    };

    let trips = trips.into_iter().map(|t| t.into_domain()).collect();

    Ok(Json(GetTripsResponse {
        trips,
        pagination: TripPagination {
            next_cursor,
            has_more,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limit_is_reasonable() {
        assert_eq!(DEFAULT_LIMIT, 20);
        assert!(DEFAULT_LIMIT <= MAX_LIMIT);
    }
}

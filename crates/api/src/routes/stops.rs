//! Stop history endpoint: keyset-paginated query over a device's stops.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use domain::models::{GetStopsResponse, StopPagination};
use persistence::repositories::stop::StopQuery;
use shared::pagination::{decode_cursor_opaque, encode_cursor_opaque};

use crate::app::AppState;
use crate::error::ApiError;

const DEFAULT_LIMIT: i32 = 20;
const MAX_LIMIT: i32 = 100;

#[derive(Debug, Deserialize)]
pub struct StopsQueryParams {
    pub cursor: Option<String>,
    pub limit: Option<i32>,
}

/// `GET /api/v1/devices/:deviceId/stops?cursor=&limit=`
pub async fn list_stops(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(params): Query<StopsQueryParams>,
) -> Result<Json<GetStopsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let (cursor_start_time, cursor_id) = match params.cursor.as_deref() {
        Some(cursor) => {
            let (ts, id) = decode_cursor_opaque(cursor)
                .map_err(|_| ApiError::Validation("invalid cursor".to_string()))?;
            (Some(ts.timestamp_millis()), Some(id))
        }
        None => (None, None),
    };

    let (stops, has_more) = state
        .stop_repo
        .get_stops_by_device(StopQuery {
            device_id,
            cursor_start_time,
            cursor_id,
            limit,
        })
        .await?;

    let next_cursor = if has_more {
        stops.last().map(|s| {
            let ts = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(s.start_time)
                .unwrap_or_else(chrono::Utc::now);
            encode_cursor_opaque(ts, &s.id)
        })
    } else {
        None
    };

    let stops = stops.into_iter().map(|s| s.into_domain()).collect();

    Ok(Json(GetStopsResponse {
        stops,
        pagination: StopPagination {
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

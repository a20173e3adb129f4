//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::app::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: ComponentHealth,
    pub redis: ComponentHealth,
}

/// Reachability of one external dependency.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Full health check endpoint: database and the Redis-backed hot state
/// store/event bus (C5/C7).
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let db_start = std::time::Instant::now();
    let db_connected = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let db_latency_ms = db_start.elapsed().as_millis() as u64;

    let redis_start = std::time::Instant::now();
    let redis_connected = state.hot_store.ping().await.is_ok();
    let redis_latency_ms = redis_start.elapsed().as_millis() as u64;

    let healthy = db_connected && redis_connected;

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: ComponentHealth {
            connected: db_connected,
            latency_ms: db_connected.then_some(db_latency_ms),
        },
        redis: ComponentHealth {
            connected: redis_connected,
            latency_ms: redis_connected.then_some(redis_latency_ms),
        },
    };

    if healthy {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Liveness probe endpoint.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    let db_connected = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let redis_connected = state.hot_store.ping().await.is_ok();

    if db_connected && redis_connected {
        Ok(Json(StatusResponse {
            status: "ready".to_string(),
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_healthy() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            database: ComponentHealth {
                connected: true,
                latency_ms: Some(5),
            },
            redis: ComponentHealth {
                connected: true,
                latency_ms: Some(2),
            },
        };
        assert_eq!(response.status, "healthy");
        assert!(response.database.connected);
        assert!(response.redis.connected);
    }

    #[test]
    fn test_status_response() {
        let response = StatusResponse {
            status: "alive".to_string(),
        };
        assert_eq!(response.status, "alive");
    }
}

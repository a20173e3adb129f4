//! Router assembly: wires the process's state (pool, config, repositories,
//! hot store, odometer service) into the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{health, odometer, status, stops, trips};
use crate::services::{HotStore, OdometerService};
use persistence::repositories::stop::StopRepository;
use persistence::repositories::trip::TripRepository;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub trip_repo: TripRepository,
    pub stop_repo: StopRepository,
    pub hot_store: HotStore,
    pub odometer: OdometerService,
}

pub fn create_app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(health::health_check))
        .route("/livez", get(health::live))
        .route("/readyz", get(health::ready))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/devices/:deviceId/status", get(status::get_status))
        .route("/api/v1/devices/:deviceId/trips", get(trips::list_trips))
        .route("/api/v1/devices/:deviceId/stops", get(stops::list_stops))
        .route(
            "/api/v1/devices/:deviceId/odometer",
            post(odometer::set_odometer),
        )
        .layer(middleware::from_fn(trace_id))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

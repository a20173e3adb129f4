use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod app;
mod config;
mod error;
mod jobs;
mod middleware;
mod routes;
mod services;

use domain::models::channels;
use persistence::repositories::stop::StopRepository;
use persistence::repositories::tracker_state::TrackerStateRepository;
use persistence::repositories::trip::TripRepository;
use services::{Dispatcher, EventBus, HotStore, IngestPipeline, OdometerService, StopWriter, TripWriter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;

    middleware::logging::init_logging(&config.logging);
    middleware::metrics::init_metrics();
    info!("Prometheus metrics initialized");

    info!("Starting fleet motion detection service v{}", env!("CARGO_PKG_VERSION"));

    let db_config = persistence::db::DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        connect_timeout_secs: config.database.connect_timeout_secs,
        idle_timeout_secs: config.database.idle_timeout_secs,
    };
    let pool = persistence::db::create_pool(&db_config).await?;

    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations").run(&pool).await?;
    info!("Migrations completed");

    let trip_repo = TripRepository::new(pool.clone());
    let stop_repo = StopRepository::new(pool.clone());
    let tracker_state_repo = TrackerStateRepository::new(pool.clone());

    let startup_stale_after = chrono::Duration::hours(config.jobs.startup_sweep_stale_after_hours);
    let closed_trips = trip_repo.close_stale_on_startup(startup_stale_after).await?;
    let closed_stops = stop_repo.close_stale_on_startup(startup_stale_after).await?;
    info!(closed_trips, closed_stops, "startup staleness sweep complete");

    let hot_store = HotStore::connect(&config.redis.url, "fmt:").await?;
    let bus = EventBus::connect(config.redis.url.clone(), "fmt:").await?;

    let odometer = OdometerService::new(hot_store.clone(), tracker_state_repo);
    let trip_writer = TripWriter::new(trip_repo.clone());
    let stop_writer = StopWriter::new(stop_repo.clone());

    let ingest = Arc::new(IngestPipeline::new(
        hot_store.clone(),
        bus.clone(),
        odometer.clone(),
        trip_writer,
        stop_writer,
        config.detection.to_domain(),
    ));

    let dispatcher = {
        let ingest = ingest.clone();
        Arc::new(Dispatcher::new("sample", move |payload: String| {
            let ingest = ingest.clone();
            async move {
                ingest.process_raw(&payload).await;
            }
        }))
    };

    let bus_cancel = CancellationToken::new();
    let mut position_rx = bus.subscribe(vec![channels::POSITION_NEW.to_string()], bus_cancel.clone());

    let subscriber_dispatcher = dispatcher.clone();
    let subscriber_handle = tokio::spawn(async move {
        while let Some(msg) = position_rx.recv().await {
            let device_id = serde_json::from_str::<serde_json::Value>(&msg.payload)
                .ok()
                .and_then(|v| v.get("deviceId").and_then(|d| d.as_str()).map(str::to_string));

            match device_id {
                Some(device_id) => subscriber_dispatcher.enqueue(&device_id, msg.payload).await,
                None => warn!(payload = %msg.payload, "dropping position:new message with no deviceId"),
            }
        }
    });

    let sweep_dispatcher = dispatcher.clone();
    let sweep_cancel = bus_cancel.clone();
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(services::dispatcher::SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => sweep_dispatcher.sweep_idle().await,
                _ = sweep_cancel.cancelled() => return,
            }
        }
    });

    let state = app::AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        trip_repo: trip_repo.clone(),
        stop_repo: stop_repo.clone(),
        hot_store: hot_store.clone(),
        odometer: odometer.clone(),
    };

    let mut scheduler = jobs::JobScheduler::new();
    scheduler.register(jobs::PoolMetricsJob::new(pool.clone()));
    scheduler.register(jobs::OrphanReaperJob::new(
        trip_repo,
        stop_repo,
        hot_store,
        config.jobs.orphan_reaper_interval_secs,
        config.detection.orphan_trip_timeout_secs,
    ));
    scheduler.start();

    let app = app::create_app(state);

    let addr = config.socket_addr();
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        tokio::signal::ctrl_c().await.expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    bus_cancel.cancel();
    subscriber_handle.abort();
    sweep_handle.abort();

    info!("Draining in-flight samples...");
    dispatcher.drain().await;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(30)).await;

    info!("Server shutdown complete");
    Ok(())
}

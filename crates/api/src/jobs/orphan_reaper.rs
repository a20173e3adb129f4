//! Orphan reaper (C9): periodically closes trips and stops whose device
//! stopped sending positions mid-lifecycle, so they don't stay `is_active`
//! forever.

use std::collections::HashSet;

use persistence::repositories::stop::StopRepository;
use persistence::repositories::trip::TripRepository;

use crate::services::hot_store::HotStore;

use super::scheduler::{Job, JobFrequency};

pub struct OrphanReaperJob {
    trip_repo: TripRepository,
    stop_repo: StopRepository,
    hot_store: HotStore,
    interval_secs: u64,
    orphan_timeout: chrono::Duration,
}

impl OrphanReaperJob {
    pub fn new(
        trip_repo: TripRepository,
        stop_repo: StopRepository,
        hot_store: HotStore,
        interval_secs: u64,
        orphan_timeout_secs: i64,
    ) -> Self {
        Self {
            trip_repo,
            stop_repo,
            hot_store,
            interval_secs,
            orphan_timeout: chrono::Duration::seconds(orphan_timeout_secs),
        }
    }
}

#[async_trait::async_trait]
impl Job for OrphanReaperJob {
    fn name(&self) -> &'static str {
        "orphan_reaper"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let closed_trips = self
            .trip_repo
            .close_orphaned(self.orphan_timeout)
            .await
            .map_err(|e| e.to_string())?;

        let closed_stops = self
            .stop_repo
            .close_orphaned(self.orphan_timeout)
            .await
            .map_err(|e| e.to_string())?;

        if !closed_trips.is_empty() || !closed_stops.is_empty() {
            tracing::info!(
                trips_closed = closed_trips.len(),
                stops_closed = closed_stops.len(),
                "orphan reaper closed stale active rows"
            );
        }

        // A fresh sample for one of these devices must not keep accumulating
        // into the trip/stop we just closed, so drop its cached hot state
        // once the DB rows are no longer active (§4.8).
        let stale_devices: HashSet<&str> = closed_trips
            .iter()
            .map(|t| t.device_id.as_str())
            .chain(closed_stops.iter().map(|s| s.device_id.as_str()))
            .collect();
        for device_id in stale_devices {
            if let Err(err) = self.hot_store.evict(device_id).await {
                tracing::warn!(error = %err, device_id, "failed to evict hot state for orphaned device");
            }
        }

        Ok(())
    }
}

//! Tracker state repository for database operations.

use sqlx::PgPool;

use crate::entities::TrackerStateEntity;
use crate::metrics::QueryTimer;
use domain::models::TrackerState;

/// Repository for tracker state database operations. Backs the persistence
/// layer of C5's hot state store — `upsert` is the durability write called
/// off the "every 100 positions or once an hour" cadence (C6).
#[derive(Clone)]
pub struct TrackerStateRepository {
    pool: PgPool,
}

impl TrackerStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_device(
        &self,
        device_id: &str,
    ) -> Result<Option<TrackerStateEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_tracker_state_by_device");

        let result = sqlx::query_as::<_, TrackerStateEntity>(
            r#"
            SELECT
                device_id, total_odometer, odometer_offset, trip_odometer_start,
                last_latitude, last_longitude, last_seen_at, first_seen_at,
                last_ignition, total_trips_count, total_driving_time_secs,
                total_idle_time_secs, total_stops_count, overnight_gap_count,
                last_overnight_gap_at, power_type, positions_since_persist,
                last_persisted_at
            FROM tracker_states
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    pub async fn upsert(&self, state: &TrackerState) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_tracker_state");
        let row = TrackerStateEntity::from_domain(state);

        sqlx::query(
            r#"
            INSERT INTO tracker_states (
                device_id, total_odometer, odometer_offset, trip_odometer_start,
                last_latitude, last_longitude, last_seen_at, first_seen_at,
                last_ignition, total_trips_count, total_driving_time_secs,
                total_idle_time_secs, total_stops_count, overnight_gap_count,
                last_overnight_gap_at, power_type, positions_since_persist,
                last_persisted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (device_id) DO UPDATE SET
                total_odometer = EXCLUDED.total_odometer,
                odometer_offset = EXCLUDED.odometer_offset,
                trip_odometer_start = EXCLUDED.trip_odometer_start,
                last_latitude = EXCLUDED.last_latitude,
                last_longitude = EXCLUDED.last_longitude,
                last_seen_at = EXCLUDED.last_seen_at,
                first_seen_at = coalesce(tracker_states.first_seen_at, EXCLUDED.first_seen_at),
                last_ignition = EXCLUDED.last_ignition,
                total_trips_count = EXCLUDED.total_trips_count,
                total_driving_time_secs = EXCLUDED.total_driving_time_secs,
                total_idle_time_secs = EXCLUDED.total_idle_time_secs,
                total_stops_count = EXCLUDED.total_stops_count,
                overnight_gap_count = EXCLUDED.overnight_gap_count,
                last_overnight_gap_at = EXCLUDED.last_overnight_gap_at,
                power_type = EXCLUDED.power_type,
                positions_since_persist = EXCLUDED.positions_since_persist,
                last_persisted_at = EXCLUDED.last_persisted_at
            "#,
        )
        .bind(&row.device_id)
        .bind(row.total_odometer)
        .bind(row.odometer_offset)
        .bind(row.trip_odometer_start)
        .bind(row.last_latitude)
        .bind(row.last_longitude)
        .bind(row.last_seen_at)
        .bind(row.first_seen_at)
        .bind(row.last_ignition)
        .bind(row.total_trips_count)
        .bind(row.total_driving_time_secs)
        .bind(row.total_idle_time_secs)
        .bind(row.total_stops_count)
        .bind(row.overnight_gap_count)
        .bind(row.last_overnight_gap_at)
        .bind(&row.power_type)
        .bind(row.positions_since_persist)
        .bind(row.last_persisted_at)
        .execute(&self.pool)
        .await?;

        timer.record();
        Ok(())
    }

    /// Applies an operator-initiated odometer correction directly in SQL,
    /// so the write is atomic with the read used to compute the previous
    /// displayed value.
    pub async fn set_odometer_offset(
        &self,
        device_id: &str,
        new_offset: f64,
    ) -> Result<Option<TrackerStateEntity>, sqlx::Error> {
        let timer = QueryTimer::new("set_tracker_odometer_offset");

        let result = sqlx::query_as::<_, TrackerStateEntity>(
            r#"
            UPDATE tracker_states
            SET odometer_offset = $2
            WHERE device_id = $1
            RETURNING
                device_id, total_odometer, odometer_offset, trip_odometer_start,
                last_latitude, last_longitude, last_seen_at, first_seen_at,
                last_ignition, total_trips_count, total_driving_time_secs,
                total_idle_time_secs, total_stops_count, overnight_gap_count,
                last_overnight_gap_at, power_type, positions_since_persist,
                last_persisted_at
            "#,
        )
        .bind(device_id)
        .bind(new_offset)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }
}

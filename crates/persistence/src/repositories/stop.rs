//! Stop repository for database operations.

use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;

use crate::entities::StopEntity;
use crate::metrics::QueryTimer;

#[derive(Debug, Clone)]
pub struct StopStartedInput {
    pub id: String,
    pub trip_id: Option<String>,
    pub device_id: String,
    pub start_time: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub reason: String,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct StopQuery {
    pub device_id: String,
    pub cursor_start_time: Option<i64>,
    pub cursor_id: Option<String>,
    pub limit: i32,
}

/// Repository for stop database operations.
#[derive(Clone)]
pub struct StopRepository {
    pool: PgPool,
}

impl StopRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a stop row on `stop:started`, idempotent on `id`.
    pub async fn insert_started(
        &self,
        input: StopStartedInput,
    ) -> Result<StopEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_stop_started");

        sqlx::query(
            r#"
            INSERT INTO stops (
                id, trip_id, device_id, start_time, location, reason,
                is_active, metadata
            )
            VALUES (
                $1, $2, $3, $4,
                ST_SetSRID(ST_MakePoint($5, $6), 4326)::geography,
                $7, true, $8
            )
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&input.id)
        .bind(&input.trip_id)
        .bind(&input.device_id)
        .bind(input.start_time)
        .bind(input.longitude)
        .bind(input.latitude)
        .bind(&input.reason)
        .bind(&input.metadata)
        .execute(&self.pool)
        .await?;

        let entity = self
            .find_by_id(&input.id)
            .await?
            .expect("stop must exist after INSERT ON CONFLICT");

        timer.record();
        Ok(entity)
    }

    pub async fn complete_stop(
        &self,
        id: &str,
        end_time: i64,
        duration_secs: i64,
    ) -> Result<Option<StopEntity>, sqlx::Error> {
        let timer = QueryTimer::new("complete_stop");

        let result = sqlx::query_as::<_, StopEntity>(
            r#"
            UPDATE stops
            SET end_time = $2, duration_secs = $3, is_active = false
            WHERE id = $1
            RETURNING
                id, trip_id, device_id, start_time, end_time, duration_secs,
                ST_Y(location::geometry) as latitude,
                ST_X(location::geometry) as longitude,
                reason, is_active, metadata
            "#,
        )
        .bind(id)
        .bind(end_time)
        .bind(duration_secs)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Removes a `stop:started` row nested under a trip that was discarded
    /// for never clearing the persistence bar (Open Question: a stop's
    /// lifecycle follows its parent trip's persist decision).
    pub async fn discard(&self, id: &str, device_id: &str) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("discard_stop");
        sqlx::query("DELETE FROM stops WHERE id = $1 AND device_id = $2")
            .bind(id)
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<StopEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_stop_by_id");

        let result = sqlx::query_as::<_, StopEntity>(
            r#"
            SELECT
                id, trip_id, device_id, start_time, end_time, duration_secs,
                ST_Y(location::geometry) as latitude,
                ST_X(location::geometry) as longitude,
                reason, is_active, metadata
            FROM stops
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    pub async fn find_active_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<StopEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_active_stop_for_device");

        let result = sqlx::query_as::<_, StopEntity>(
            r#"
            SELECT
                id, trip_id, device_id, start_time, end_time, duration_secs,
                ST_Y(location::geometry) as latitude,
                ST_X(location::geometry) as longitude,
                reason, is_active, metadata
            FROM stops
            WHERE device_id = $1 AND is_active = true
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    pub async fn get_stops_for_trip(&self, trip_id: &str) -> Result<Vec<StopEntity>, sqlx::Error> {
        let timer = QueryTimer::new("get_stops_for_trip");

        let result = sqlx::query_as::<_, StopEntity>(
            r#"
            SELECT
                id, trip_id, device_id, start_time, end_time, duration_secs,
                ST_Y(location::geometry) as latitude,
                ST_X(location::geometry) as longitude,
                reason, is_active, metadata
            FROM stops
            WHERE trip_id = $1
            ORDER BY start_time ASC
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Closes every stop left `is_active = true` whose parent trip has
    /// already closed, or whose row has simply gone stale (C9). Mirrors
    /// `TripRepository::close_orphaned`.
    pub async fn close_orphaned(
        &self,
        orphan_timeout: chrono::Duration,
    ) -> Result<Vec<StopEntity>, sqlx::Error> {
        let timer = QueryTimer::new("close_orphaned_stops");
        let cutoff = Utc::now() - orphan_timeout;

        let closed = sqlx::query_as::<_, StopEntity>(
            r#"
            UPDATE stops
            SET is_active = false,
                end_time = (extract(epoch from updated_at) * 1000)::bigint,
                duration_secs = greatest(
                    0,
                    ((extract(epoch from updated_at) * 1000)::bigint - start_time) / 1000
                ),
                metadata = metadata || jsonb_build_object('closedBy', 'orphan_cleanup')
            WHERE is_active = true
              AND (
                  updated_at < $1
                  OR trip_id IN (SELECT id FROM trips WHERE is_active = false)
              )
            RETURNING
                id, trip_id, device_id, start_time, end_time, duration_secs,
                ST_Y(location::geometry) as latitude,
                ST_X(location::geometry) as longitude,
                reason, is_active, metadata
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        timer.record();
        Ok(closed)
    }

    /// Startup sweep (§4.7) counterpart for stops.
    pub async fn close_stale_on_startup(
        &self,
        stale_after: chrono::Duration,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("close_stale_stops_on_startup");
        let cutoff = Utc::now() - stale_after;

        let result = sqlx::query(
            r#"
            UPDATE stops
            SET is_active = false,
                end_time = (extract(epoch from updated_at) * 1000)::bigint,
                duration_secs = greatest(
                    0,
                    ((extract(epoch from updated_at) * 1000)::bigint - start_time) / 1000
                ),
                metadata = metadata || jsonb_build_object('closedBy', 'startup_sweep')
            WHERE is_active = true AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        timer.record();
        Ok(result.rows_affected())
    }

    pub async fn get_stops_by_device(
        &self,
        query: StopQuery,
    ) -> Result<(Vec<StopEntity>, bool), sqlx::Error> {
        let timer = QueryTimer::new("get_stops_by_device");
        let fetch_limit = (query.limit + 1) as i64;

        let stops = sqlx::query_as::<_, StopEntity>(
            r#"
            SELECT
                id, trip_id, device_id, start_time, end_time, duration_secs,
                ST_Y(location::geometry) as latitude,
                ST_X(location::geometry) as longitude,
                reason, is_active, metadata
            FROM stops
            WHERE device_id = $1
              AND ($2::bigint IS NULL OR (start_time, id) < ($2, $3))
            ORDER BY start_time DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(&query.device_id)
        .bind(query.cursor_start_time)
        .bind(query.cursor_id.unwrap_or_default())
        .bind(fetch_limit)
        .fetch_all(&self.pool)
        .await?;

        timer.record();

        let has_more = stops.len() > query.limit as usize;
        let mut result = stops;
        if has_more {
            result.pop();
        }

        Ok((result, has_more))
    }
}

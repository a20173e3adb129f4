//! Trip repository for database operations.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::entities::TripEntity;
use crate::metrics::QueryTimer;

/// Input for the `trip:started` write (C8).
#[derive(Debug, Clone)]
pub struct TripStartedInput {
    pub id: String,
    pub device_id: String,
    pub start_time: i64,
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub detection_method: String,
    pub metadata: Value,
}

/// Input for the `trip:completed` write (C8). Carries the final,
/// noise-filtered distance and the C10 quality block; no further distance
/// correction happens at write time.
#[derive(Debug, Clone)]
pub struct TripCompletedInput {
    pub end_time: i64,
    pub end_latitude: f64,
    pub end_longitude: f64,
    pub distance: f64,
    pub duration_secs: i64,
    pub max_speed: f64,
    pub avg_speed: f64,
    pub stop_count: i32,
    pub original_distance: f64,
    pub linear_distance: f64,
    pub route_linear_ratio: f64,
    pub operation_area_diameter: f64,
    pub gps_noise_percentage: f64,
    pub quality_flag: String,
}

/// Query parameters for trip history pagination.
#[derive(Debug, Clone)]
pub struct TripQuery {
    pub device_id: String,
    pub cursor_start_time: Option<i64>,
    pub cursor_id: Option<String>,
    pub from_timestamp: Option<i64>,
    pub to_timestamp: Option<i64>,
    pub limit: i32,
}

/// Repository for trip database operations.
#[derive(Clone)]
pub struct TripRepository {
    pool: PgPool,
}

impl TripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts a trip row on `trip:started`, idempotent on `id` (the trip
    /// id is minted once by the motion state machine and never reused).
    /// Returns `(entity, was_created)`.
    pub async fn insert_started(
        &self,
        input: TripStartedInput,
    ) -> Result<(TripEntity, bool), sqlx::Error> {
        let timer = QueryTimer::new("insert_trip_started");

        let insert_result = sqlx::query(
            r#"
            INSERT INTO trips (
                id, device_id, start_time, start_location, detection_method,
                is_active, metadata
            )
            VALUES (
                $1, $2, $3,
                ST_SetSRID(ST_MakePoint($4, $5), 4326)::geography,
                $6, true, $7
            )
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&input.id)
        .bind(&input.device_id)
        .bind(input.start_time)
        .bind(input.start_longitude)
        .bind(input.start_latitude)
        .bind(&input.detection_method)
        .bind(&input.metadata)
        .execute(&self.pool)
        .await?;

        let was_created = insert_result.rows_affected() > 0;

        let entity = self
            .find_by_id(&input.id)
            .await?
            .expect("trip must exist after INSERT ON CONFLICT");

        timer.record();
        Ok((entity, was_created))
    }

    /// Closes out a trip on `trip:completed`. Rejects the write (returns
    /// `Ok(None)`) if `device_id` doesn't match the stored row — the event
    /// referenced a trip id that belongs to a different device.
    pub async fn complete_trip(
        &self,
        id: &str,
        device_id: &str,
        input: TripCompletedInput,
    ) -> Result<Option<TripEntity>, sqlx::Error> {
        let timer = QueryTimer::new("complete_trip");

        let result = sqlx::query_as::<_, TripEntity>(
            r#"
            UPDATE trips
            SET end_time = $3,
                end_location = ST_SetSRID(ST_MakePoint($4, $5), 4326)::geography,
                distance = $6,
                duration_secs = $7,
                max_speed = $8,
                avg_speed = $9,
                stop_count = $10,
                is_active = false,
                original_distance = $11,
                linear_distance = $12,
                route_linear_ratio = $13,
                operation_area_diameter = $14,
                gps_noise_percentage = $15,
                quality_flag = $16,
                updated_at = now()
            WHERE id = $1 AND device_id = $2
            RETURNING
                id, device_id, start_time, end_time,
                ST_Y(start_location::geometry) as start_latitude,
                ST_X(start_location::geometry) as start_longitude,
                CASE WHEN end_location IS NULL THEN NULL ELSE ST_Y(end_location::geometry) END as end_latitude,
                CASE WHEN end_location IS NULL THEN NULL ELSE ST_X(end_location::geometry) END as end_longitude,
                distance, duration_secs, max_speed, avg_speed, stop_count, is_active,
                detection_method, original_distance, linear_distance, route_linear_ratio,
                operation_area_diameter, gps_noise_percentage, quality_flag,
                metadata, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(device_id)
        .bind(input.end_time)
        .bind(input.end_longitude)
        .bind(input.end_latitude)
        .bind(input.distance)
        .bind(input.duration_secs)
        .bind(input.max_speed)
        .bind(input.avg_speed)
        .bind(input.stop_count)
        .bind(input.original_distance)
        .bind(input.linear_distance)
        .bind(input.route_linear_ratio)
        .bind(input.operation_area_diameter)
        .bind(input.gps_noise_percentage)
        .bind(&input.quality_flag)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Removes a `trip:started` row that never cleared the persistence bar
    /// (§4.2's `discardTrip`): the trip is silently dropped rather than
    /// completed, and nothing is published for it.
    pub async fn discard(&self, id: &str, device_id: &str) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("discard_trip");
        sqlx::query("DELETE FROM trips WHERE id = $1 AND device_id = $2")
            .bind(id)
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<TripEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_trip_by_id");

        let result = sqlx::query_as::<_, TripEntity>(
            r#"
            SELECT
                id, device_id, start_time, end_time,
                ST_Y(start_location::geometry) as start_latitude,
                ST_X(start_location::geometry) as start_longitude,
                CASE WHEN end_location IS NULL THEN NULL ELSE ST_Y(end_location::geometry) END as end_latitude,
                CASE WHEN end_location IS NULL THEN NULL ELSE ST_X(end_location::geometry) END as end_longitude,
                distance, duration_secs, max_speed, avg_speed, stop_count, is_active,
                detection_method, original_distance, linear_distance, route_linear_ratio,
                operation_area_diameter, gps_noise_percentage, quality_flag,
                metadata, created_at, updated_at
            FROM trips
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
    ) -> Result<Option<TripEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_active_trip_for_device");

        let result = sqlx::query_as::<_, TripEntity>(
            r#"
            SELECT
                id, device_id, start_time, end_time,
                ST_Y(start_location::geometry) as start_latitude,
                ST_X(start_location::geometry) as start_longitude,
                CASE WHEN end_location IS NULL THEN NULL ELSE ST_Y(end_location::geometry) END as end_latitude,
                CASE WHEN end_location IS NULL THEN NULL ELSE ST_X(end_location::geometry) END as end_longitude,
                distance, duration_secs, max_speed, avg_speed, stop_count, is_active,
                detection_method, original_distance, linear_distance, route_linear_ratio,
                operation_area_diameter, gps_noise_percentage, quality_flag,
                metadata, created_at, updated_at
            FROM trips
            WHERE device_id = $1 AND is_active = true
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Keyset-paginated trip history for a device, newest first.
    pub async fn get_trips_by_device(
        &self,
        query: TripQuery,
    ) -> Result<(Vec<TripEntity>, bool), sqlx::Error> {
        let timer = QueryTimer::new("get_trips_by_device");

        let fetch_limit = (query.limit + 1) as i64;

        let trips = sqlx::query_as::<_, TripEntity>(
            r#"
            SELECT
                id, device_id, start_time, end_time,
                ST_Y(start_location::geometry) as start_latitude,
                ST_X(start_location::geometry) as start_longitude,
                CASE WHEN end_location IS NULL THEN NULL ELSE ST_Y(end_location::geometry) END as end_latitude,
                CASE WHEN end_location IS NULL THEN NULL ELSE ST_X(end_location::geometry) END as end_longitude,
                distance, duration_secs, max_speed, avg_speed, stop_count, is_active,
                detection_method, original_distance, linear_distance, route_linear_ratio,
                operation_area_diameter, gps_noise_percentage, quality_flag,
                metadata, created_at, updated_at
            FROM trips
            WHERE device_id = $1
              AND ($2::bigint IS NULL OR start_time >= $2)
              AND ($3::bigint IS NULL OR start_time <= $3)
              AND ($4::bigint IS NULL OR (start_time, id) < ($4, $5))
            ORDER BY start_time DESC, id DESC
            LIMIT $6
            "#,
        )
        .bind(&query.device_id)
        .bind(query.from_timestamp)
        .bind(query.to_timestamp)
        .bind(query.cursor_start_time)
        .bind(query.cursor_id.unwrap_or_default())
        .bind(fetch_limit)
        .fetch_all(&self.pool)
        .await?;

        timer.record();

        let has_more = trips.len() > query.limit as usize;
        let mut result = trips;
        if has_more {
            result.pop();
        }

        Ok((result, has_more))
    }

    /// Closes every trip left `is_active = true` whose `updated_at` is older
    /// than `orphan_timeout`, stamping `end_time` from `updated_at` and
    /// tagging the metadata reason (C9).
    pub async fn close_orphaned(
        &self,
        orphan_timeout: chrono::Duration,
    ) -> Result<Vec<TripEntity>, sqlx::Error> {
        let timer = QueryTimer::new("close_orphaned_trips");
        let cutoff = Utc::now() - orphan_timeout;

        let closed = sqlx::query_as::<_, TripEntity>(
            r#"
            UPDATE trips
            SET is_active = false,
                end_time = (extract(epoch from updated_at) * 1000)::bigint,
                duration_secs = greatest(
                    0,
                    ((extract(epoch from updated_at) * 1000)::bigint - start_time) / 1000
                ),
                metadata = metadata || jsonb_build_object('closedBy', 'orphan_cleanup')
            WHERE is_active = true AND updated_at < $1
            RETURNING
                id, device_id, start_time, end_time,
                ST_Y(start_location::geometry) as start_latitude,
                ST_X(start_location::geometry) as start_longitude,
                CASE WHEN end_location IS NULL THEN NULL ELSE ST_Y(end_location::geometry) END as end_latitude,
                CASE WHEN end_location IS NULL THEN NULL ELSE ST_X(end_location::geometry) END as end_longitude,
                distance, duration_secs, max_speed, avg_speed, stop_count, is_active,
                detection_method, original_distance, linear_distance, route_linear_ratio,
                operation_area_diameter, gps_noise_percentage, quality_flag,
                metadata, created_at, updated_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        timer.record();
        Ok(closed)
    }

    /// Startup sweep (§4.7): closes trips left `is_active = true` with
    /// `updated_at` older than `stale_after` — these survived a previous
    /// process crash before the orphan reaper's first pass could run.
    pub async fn close_stale_on_startup(
        &self,
        stale_after: chrono::Duration,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("close_stale_trips_on_startup");
        let cutoff: DateTime<Utc> = Utc::now() - stale_after;

        let result = sqlx::query(
            r#"
            UPDATE trips
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_started_input_carries_fields() {
        let input = TripStartedInput {
            id: "trip_D1_1000_abc".to_string(),
            device_id: "D1".to_string(),
            start_time: 1000,
            start_latitude: -31.42,
            start_longitude: -64.18,
            detection_method: "motion".to_string(),
            metadata: Value::Null,
        };
        assert_eq!(input.id, "trip_D1_1000_abc");
    }

    #[test]
    fn trip_query_defaults_cursor_to_none() {
        let query = TripQuery {
            device_id: "D1".to_string(),
            cursor_start_time: None,
            cursor_id: None,
            from_timestamp: Some(1000),
            to_timestamp: Some(2000),
            limit: 20,
        };
        assert_eq!(query.limit, 20);
        assert!(query.cursor_id.is_none());
    }
}

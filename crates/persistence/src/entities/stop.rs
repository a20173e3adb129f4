//! Stop entity (database row mapping).

use serde_json::Value;
use sqlx::FromRow;

use domain::models::{Stop, StopReason};

/// Database row mapping for the `stops` table.
///
/// `location` is a PostGIS `GEOGRAPHY` column, read back as separate
/// latitude/longitude values via `ST_Y`/`ST_X` in queries.
#[derive(Debug, Clone, FromRow)]
pub struct StopEntity {
    pub id: String,
    pub trip_id: Option<String>,
    pub device_id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub duration_secs: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub reason: String,
    pub is_active: bool,
    pub metadata: Value,
}

impl StopEntity {
    /// Converts to the domain model, falling back to `Parking` for any
    /// reason column that fails to parse.
    pub fn into_domain(self) -> Stop {
        let reason = self
            .reason
            .parse::<StopReason>()
            .unwrap_or(StopReason::Parking);

        Stop {
            id: self.id,
            trip_id: self.trip_id,
            device_id: self.device_id,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_secs: self.duration_secs,
            latitude: self.latitude,
            longitude: self.longitude,
            reason,
            is_active: self.is_active,
            metadata: self.metadata,
        }
    }
}

impl From<StopEntity> for Stop {
    fn from(entity: StopEntity) -> Self {
        entity.into_domain()
    }
}

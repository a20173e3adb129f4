//! Trip entity (database row mapping).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

use domain::models::{DetectionMethod, Trip, TripQuality, TripQualityFlag};

/// Database row mapping for the `trips` table.
///
/// `start_location`/`end_location` are PostGIS `GEOGRAPHY` columns, read back
/// as separate latitude/longitude values via `ST_Y`/`ST_X` in queries.
#[derive(Debug, Clone, FromRow)]
pub struct TripEntity {
    pub id: String,
    pub device_id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub end_latitude: Option<f64>,
    pub end_longitude: Option<f64>,
    pub distance: f64,
    pub duration_secs: Option<i64>,
    pub max_speed: f64,
    pub avg_speed: f64,
    pub stop_count: i32,
    pub is_active: bool,
    pub detection_method: String,
    pub original_distance: Option<f64>,
    pub linear_distance: Option<f64>,
    pub route_linear_ratio: Option<f64>,
    pub operation_area_diameter: Option<f64>,
    pub gps_noise_percentage: Option<f64>,
    pub quality_flag: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TripEntity {
    /// Converts to the domain model, falling back to conservative defaults
    /// for any column that fails to parse as its enum type.
    pub fn into_domain(self) -> Trip {
        let detection_method = self
            .detection_method
            .parse::<DetectionMethod>()
            .unwrap_or(DetectionMethod::Motion);

        let quality = self.quality_flag.as_deref().map(|flag| TripQuality {
            original_distance: self.original_distance.unwrap_or(0.0),
            linear_distance: self.linear_distance.unwrap_or(0.0),
            route_linear_ratio: self.route_linear_ratio.unwrap_or(0.0),
            operation_area_diameter: self.operation_area_diameter.unwrap_or(0.0),
            gps_noise_percentage: self.gps_noise_percentage.unwrap_or(0.0),
            flag: flag.parse::<TripQualityFlag>().unwrap_or(TripQualityFlag::Valid),
        });

        Trip {
            id: self.id,
            device_id: self.device_id,
            start_time: self.start_time,
            end_time: self.end_time,
            start_latitude: self.start_latitude,
            start_longitude: self.start_longitude,
            end_latitude: self.end_latitude,
            end_longitude: self.end_longitude,
            distance: self.distance,
            duration_secs: self.duration_secs,
            max_speed: self.max_speed,
            avg_speed: self.avg_speed,
            stop_count: self.stop_count.max(0) as u32,
            is_active: self.is_active,
            detection_method,
            quality,
            metadata: self.metadata,
            created_at: self.created_at.timestamp_millis(),
            updated_at: self.updated_at.timestamp_millis(),
        }
    }
}

impl From<TripEntity> for Trip {
    fn from(entity: TripEntity) -> Self {
        entity.into_domain()
    }
}

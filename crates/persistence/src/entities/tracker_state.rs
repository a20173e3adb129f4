//! Tracker state entity (database row mapping).

use sqlx::FromRow;

use domain::models::{PowerType, TrackerState};

/// Database row mapping for the `tracker_states` table: the persistent
/// mirror of a device's odometer, last position, and power diagnostics (C6).
#[derive(Debug, Clone, FromRow)]
pub struct TrackerStateEntity {
    pub device_id: String,
    pub total_odometer: f64,
    pub odometer_offset: f64,
    pub trip_odometer_start: Option<f64>,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub last_seen_at: Option<i64>,
    pub first_seen_at: Option<i64>,
    pub last_ignition: Option<bool>,
    pub total_trips_count: i64,
    pub total_driving_time_secs: i64,
    pub total_idle_time_secs: i64,
    pub total_stops_count: i64,
    pub overnight_gap_count: i32,
    pub last_overnight_gap_at: Option<i64>,
    pub power_type: String,
    pub positions_since_persist: i32,
    pub last_persisted_at: Option<i64>,
}

impl TrackerStateEntity {
    pub fn into_domain(self) -> TrackerState {
        let power_type = self
            .power_type
            .parse::<PowerType>()
            .unwrap_or(PowerType::Unknown);

        TrackerState {
            device_id: self.device_id,
            total_odometer: self.total_odometer,
            odometer_offset: self.odometer_offset,
            trip_odometer_start: self.trip_odometer_start,
            last_latitude: self.last_latitude,
            last_longitude: self.last_longitude,
            last_seen_at: self.last_seen_at,
            first_seen_at: self.first_seen_at,
            last_ignition: self.last_ignition,
            total_trips_count: self.total_trips_count.max(0) as u64,
            total_driving_time_secs: self.total_driving_time_secs,
            total_idle_time_secs: self.total_idle_time_secs,
            total_stops_count: self.total_stops_count.max(0) as u64,
            overnight_gap_count: self.overnight_gap_count.max(0) as u32,
            last_overnight_gap_at: self.last_overnight_gap_at,
            power_type,
            positions_since_persist: self.positions_since_persist.max(0) as u32,
            last_persisted_at: self.last_persisted_at,
        }
    }

    /// Builds the row representation of a domain `TrackerState`, ready to
    /// bind into an upsert.
    pub fn from_domain(state: &TrackerState) -> Self {
        Self {
            device_id: state.device_id.clone(),
            total_odometer: state.total_odometer,
            odometer_offset: state.odometer_offset,
            trip_odometer_start: state.trip_odometer_start,
            last_latitude: state.last_latitude,
            last_longitude: state.last_longitude,
            last_seen_at: state.last_seen_at,
            first_seen_at: state.first_seen_at,
            last_ignition: state.last_ignition,
            total_trips_count: state.total_trips_count as i64,
            total_driving_time_secs: state.total_driving_time_secs,
            total_idle_time_secs: state.total_idle_time_secs,
            total_stops_count: state.total_stops_count as i64,
            overnight_gap_count: state.overnight_gap_count as i32,
            last_overnight_gap_at: state.last_overnight_gap_at,
            power_type: state.power_type.as_str().to_string(),
            positions_since_persist: state.positions_since_persist as i32,
            last_persisted_at: state.last_persisted_at,
        }
    }
}

impl From<TrackerStateEntity> for TrackerState {
    fn from(entity: TrackerStateEntity) -> Self {
        entity.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entity() -> TrackerStateEntity {
        TrackerStateEntity {
            device_id: "D1".to_string(),
            total_odometer: 12_500.0,
            odometer_offset: 0.0,
            trip_odometer_start: None,
            last_latitude: Some(-31.42),
            last_longitude: Some(-64.18),
            last_seen_at: Some(1_000),
            first_seen_at: Some(500),
            last_ignition: Some(true),
            total_trips_count: 4,
            total_driving_time_secs: 3600,
            total_idle_time_secs: 120,
            total_stops_count: 3,
            overnight_gap_count: 1,
            last_overnight_gap_at: None,
            power_type: "switched".to_string(),
            positions_since_persist: 10,
            last_persisted_at: Some(900),
        }
    }

    #[test]
    fn entity_round_trips_through_domain() {
        let entity = test_entity();
        let state: TrackerState = entity.into();
        let back = TrackerStateEntity::from_domain(&state);
        assert_eq!(back.device_id, "D1");
        assert_eq!(back.power_type, "switched");
        assert_eq!(back.total_trips_count, 4);
    }

    #[test]
    fn unparseable_power_type_falls_back_to_unknown() {
        let mut entity = test_entity();
        entity.power_type = "bogus".to_string();
        let state: TrackerState = entity.into();
        assert_eq!(state.power_type, PowerType::Unknown);
    }
}

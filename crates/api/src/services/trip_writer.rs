//! Trip writer (C8): persists trip lifecycle writes and builds the events
//! to publish alongside them. The quality block is computed once, at close
//! time, from the noise context accumulated over the trip's lifetime — no
//! further distance correction happens here.

use domain::models::{ActiveTripContext, GeoPoint, MotionState, NoiseContext, TripStarted};
use domain::models::TripCompleted;
use domain::services::geometry::haversine_distance_m;
use domain::services::motion_state_machine::ClosedTrip;
use domain::services::quality_analyzer::{analyze, QualityInput};
use persistence::entities::TripEntity;
use persistence::repositories::trip::{TripCompletedInput, TripRepository, TripStartedInput};

fn operation_area_diameter_m(noise: &NoiseContext) -> f64 {
    haversine_distance_m(
        noise.bbox_min_lat,
        noise.bbox_min_lon,
        noise.bbox_max_lat,
        noise.bbox_max_lon,
    )
}

fn millis_to_rfc3339(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339()
}

#[derive(Clone)]
pub struct TripWriter {
    repo: TripRepository,
}

impl TripWriter {
    pub fn new(repo: TripRepository) -> Self {
        Self { repo }
    }

    /// Writes the `trip:started` row and builds the matching event.
    pub async fn handle_started(
        &self,
        device_id: &str,
        trip: &ActiveTripContext,
        current_state: MotionState,
    ) -> Result<(TripEntity, TripStarted), sqlx::Error> {
        let (entity, _was_created) = self
            .repo
            .insert_started(TripStartedInput {
                id: trip.trip_id.clone(),
                device_id: device_id.to_string(),
                start_time: trip.start_time,
                start_latitude: trip.start_lat,
                start_longitude: trip.start_lon,
                detection_method: trip.detection_method.as_str().to_string(),
                metadata: trip.metadata.clone(),
            })
            .await?;

        let event = TripStarted {
            trip_id: trip.trip_id.clone(),
            device_id: device_id.to_string(),
            start_time: millis_to_rfc3339(trip.start_time),
            start_location: GeoPoint::new(trip.start_lat, trip.start_lon),
            detection_method: trip.detection_method,
            current_state,
            odometer: trip.odometer_start,
            metadata: trip.metadata.clone(),
        };

        Ok((entity, event))
    }

    /// Closes out the trip on `trip:completed`. When the trip never cleared
    /// the duration/distance bar, the `trip:started` row is discarded
    /// instead and `Ok(None)` is returned — nothing is published for it.
    pub async fn handle_completed(
        &self,
        device_id: &str,
        closed: &ClosedTrip,
        final_distance_m: f64,
        odometer_total: f64,
        current_state: MotionState,
    ) -> Result<Option<TripCompleted>, sqlx::Error> {
        if !closed.persist {
            self.repo.discard(&closed.trip_id, device_id).await?;
            return Ok(None);
        }

        let duration_secs = ((closed.end_time - closed.start_time) as f64 / 1000.0).max(0.0) as i64;

        let quality = analyze(QualityInput {
            start_lat: closed.start_lat,
            start_lon: closed.start_lon,
            end_lat: closed.end_lat,
            end_lon: closed.end_lon,
            distance_m: final_distance_m,
            max_distance_from_origin_m: closed.noise_context.max_distance_from_origin,
            operation_area_diameter_m: operation_area_diameter_m(&closed.noise_context),
            gps_noise_segments: closed.quality_counters.gps_noise_segments,
            segments_total: closed.quality_counters.segments_total,
        });

        let completed = self
            .repo
            .complete_trip(
                &closed.trip_id,
                device_id,
                TripCompletedInput {
                    end_time: closed.end_time,
                    end_latitude: closed.end_lat,
                    end_longitude: closed.end_lon,
                    distance: final_distance_m,
                    duration_secs,
                    max_speed: closed.max_speed_kmh,
                    avg_speed: closed.avg_speed_kmh,
                    stop_count: closed.stops_count as i32,
                    original_distance: quality.original_distance,
                    linear_distance: quality.linear_distance,
                    route_linear_ratio: quality.route_linear_ratio,
                    operation_area_diameter: quality.operation_area_diameter,
                    gps_noise_percentage: quality.gps_noise_percentage,
                    quality_flag: quality.flag.as_str().to_string(),
                },
            )
            .await?;

        if completed.is_none() {
            return Ok(None);
        }

        Ok(Some(TripCompleted {
            trip_id: closed.trip_id.clone(),
            device_id: device_id.to_string(),
            start_time: millis_to_rfc3339(closed.start_time),
            start_location: GeoPoint::new(closed.start_lat, closed.start_lon),
            detection_method: closed.detection_method,
            end_time: millis_to_rfc3339(closed.end_time),
            duration: duration_secs,
            distance: final_distance_m,
            avg_speed: closed.avg_speed_kmh,
            max_speed: closed.max_speed_kmh,
            stops_count: closed.stops_count,
            end_location: GeoPoint::new(closed.end_lat, closed.end_lon),
            current_state,
            odometer: odometer_total,
            metadata: closed.metadata.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_area_diameter_matches_bbox_diagonal() {
        let mut noise = NoiseContext::new(-31.42, -64.18);
        noise.bbox_min_lat = -31.43;
        noise.bbox_max_lat = -31.42;
        noise.bbox_min_lon = -64.19;
        noise.bbox_max_lon = -64.18;
        let diameter = operation_area_diameter_m(&noise);
        assert!(diameter > 0.0);
    }

    #[test]
    fn millis_to_rfc3339_is_stable_for_epoch() {
        assert_eq!(millis_to_rfc3339(0), "1970-01-01T00:00:00+00:00");
    }
}

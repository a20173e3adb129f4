//! Trip quality metadata, computed post-hoc by the quality analyzer (C10).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Categorical verdict assigned to a completed trip. No distance correction
/// happens here — filtering already happened upstream in the segment
/// validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripQualityFlag {
    Valid,
    GpsNoiseFiltered,
    CircularRoute,
    ShortTrip,
}

impl TripQualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripQualityFlag::Valid => "VALID",
            TripQualityFlag::GpsNoiseFiltered => "GPS_NOISE_FILTERED",
            TripQualityFlag::CircularRoute => "CIRCULAR_ROUTE",
            TripQualityFlag::ShortTrip => "SHORT_TRIP",
        }
    }
}

impl fmt::Display for TripQualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TripQualityFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALID" => Ok(TripQualityFlag::Valid),
            "GPS_NOISE_FILTERED" => Ok(TripQualityFlag::GpsNoiseFiltered),
            "CIRCULAR_ROUTE" => Ok(TripQualityFlag::CircularRoute),
            "SHORT_TRIP" => Ok(TripQualityFlag::ShortTrip),
            _ => Err(format!(
                "Invalid trip quality flag: {s}. Must be one of: VALID, GPS_NOISE_FILTERED, CIRCULAR_ROUTE, SHORT_TRIP"
            )),
        }
    }
}

/// Quality block attached to a completed trip row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripQuality {
    pub original_distance: f64,
    pub linear_distance: f64,
    pub route_linear_ratio: f64,
    pub operation_area_diameter: f64,
    pub gps_noise_percentage: f64,
    pub flag: TripQualityFlag,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_quality_flag_round_trips() {
        for flag in [
            TripQualityFlag::Valid,
            TripQualityFlag::GpsNoiseFiltered,
            TripQualityFlag::CircularRoute,
            TripQualityFlag::ShortTrip,
        ] {
            assert_eq!(flag.as_str().parse::<TripQualityFlag>().unwrap(), flag);
        }
    }

    #[test]
    fn trip_quality_flag_from_str_rejects_unknown() {
        assert!("bogus".parse::<TripQualityFlag>().is_err());
    }
}

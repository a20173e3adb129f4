//! Pure geometry helpers shared by the segment validator, odometer, and
//! quality analyzer (C1).

/// WGS84 equatorial radius, in meters.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1_rad, lat2_rad) = (lat1.to_radians(), lat2.to_radians());
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// An axis-aligned bounding box accumulated over a sequence of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn from_point(lat: f64, lon: f64) -> Self {
        Self {
            min_lat: lat,
            max_lat: lat,
            min_lon: lon,
            max_lon: lon,
        }
    }

    pub fn expand(&mut self, lat: f64, lon: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.max_lat = self.max_lat.max(lat);
        self.min_lon = self.min_lon.min(lon);
        self.max_lon = self.max_lon.max(lon);
    }

    /// Diagonal of the box, in meters — used as a cheap "operation area"
    /// diameter estimate instead of a true convex-hull diameter.
    pub fn diameter_m(&self) -> f64 {
        haversine_distance_m(self.min_lat, self.min_lon, self.max_lat, self.max_lon)
    }
}

/// Implied speed in km/h between two samples `distance_m` apart and
/// `delta_secs` seconds apart. Returns `None` when `delta_secs <= 0`.
pub fn implied_speed_kmh(distance_m: f64, delta_secs: f64) -> Option<f64> {
    if delta_secs <= 0.0 {
        None
    } else {
        Some((distance_m / delta_secs) * 3.6)
    }
}

//! Conversions between geographic and planet-centred Cartesian coordinates.
//!
//! The Cartesian frame is Earth-Centred, Earth-Fixed on the WGS84 ellipsoid:
//! +X through (0°, 0°), +Y through (0°, 90°E), +Z through the north pole.

use glam::DVec3;

/// WGS84 semi-major axis in meters.
pub const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;

/// WGS84 flattening.
pub const FLATTENING: f64 = 1.0 / 298.257_223_563;

/// First eccentricity squared, `f(2 - f)`.
pub const ECCENTRICITY_SQUARED: f64 = FLATTENING * (2.0 - FLATTENING);

const INVERSE_ITERATIONS: usize = 8;

/// A geographic position in degrees and meters above the ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}

impl GeoPoint {
    #[must_use]
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    /// Planet-centred Cartesian position of this point.
    #[must_use]
    pub fn to_cartesian(self) -> DVec3 {
        to_cartesian(self.longitude, self.latitude, self.height)
    }
}

/// Prime-vertical radius of curvature at the given geodetic latitude (radians).
fn prime_vertical_radius(sin_lat: f64) -> f64 {
    SEMI_MAJOR_AXIS / (1.0 - ECCENTRICITY_SQUARED * sin_lat * sin_lat).sqrt()
}

/// Convert longitude/latitude (degrees) and ellipsoidal height (meters) to
/// planet-centred Cartesian coordinates.
#[must_use]
pub fn to_cartesian(lon_deg: f64, lat_deg: f64, height: f64) -> DVec3 {
    let (sin_lat, cos_lat) = lat_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon_deg.to_radians().sin_cos();
    let n = prime_vertical_radius(sin_lat);

    DVec3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - ECCENTRICITY_SQUARED) + height) * sin_lat,
    )
}

/// Convert planet-centred Cartesian coordinates back to a geographic point.
///
/// Latitude is found by fixed-point iteration on
/// `tan φ = (z + e²·N(φ)·sin φ) / p`, which stays well-conditioned at the
/// poles where `p → 0`.
#[must_use]
pub fn to_geographic(position: DVec3) -> GeoPoint {
    let p = position.x.hypot(position.y);
    let longitude = position.y.atan2(position.x);

    let mut latitude = position.z.atan2(p * (1.0 - ECCENTRICITY_SQUARED));
    for _ in 0..INVERSE_ITERATIONS {
        let sin_lat = latitude.sin();
        let n = prime_vertical_radius(sin_lat);
        latitude = (position.z + ECCENTRICITY_SQUARED * n * sin_lat).atan2(p);
    }

    let (sin_lat, cos_lat) = latitude.sin_cos();
    let n = prime_vertical_radius(sin_lat);
    let height = p * cos_lat + position.z * sin_lat - SEMI_MAJOR_AXIS * SEMI_MAJOR_AXIS / n;

    GeoPoint {
        longitude: longitude.to_degrees(),
        latitude: latitude.to_degrees(),
        height,
    }
}

//! Great-circle geometry on a spherical Earth
//!
//! Distances use the haversine formula with a fixed mean Earth radius.
//! All functions are pure and accept any finite latitude/longitude in
//! degrees, including the poles and the antimeridian.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude on the sphere
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// A WGS84 point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in meters
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Initial bearing towards `other` in degrees, [0, 360)
    pub fn bearing_to(&self, other: &Coordinates) -> f64 {
        bearing(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Haversine distance in meters between two points given in degrees.
pub fn distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let sin_phi = (d_phi / 2.0).sin();
    let sin_lambda = (d_lambda / 2.0).sin();
    let h = sin_phi * sin_phi + phi1.cos() * phi2.cos() * sin_lambda * sin_lambda;

    // Rounding can push h just outside [0, 1] near antipodes
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial great-circle bearing from the first point to the second,
/// in degrees clockwise from true north, normalized to [0, 360).
pub fn bearing(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    if x == 0.0 && y == 0.0 {
        return 0.0;
    }

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Axis-aligned latitude/longitude box enclosing a circle.
///
/// Used as a coarse pre-filter when no spatial index is available. The box
/// may over-approximate; callers must still check the exact distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Box around `center` covering every point within `radius_m`.
    ///
    /// Near the poles, or when the longitude span would exceed the whole
    /// globe, the longitude range widens to [-180, 180].
    pub fn around(center: Coordinates, radius_m: f64) -> Self {
        let lat_delta = radius_m / METERS_PER_DEGREE;
        let min_lat = (center.latitude - lat_delta).max(-90.0);
        let max_lat = (center.latitude + lat_delta).min(90.0);

        let cos_lat = center.latitude.to_radians().cos();
        let lng_delta = if cos_lat.abs() < 1e-12 {
            180.0
        } else {
            radius_m / (METERS_PER_DEGREE * cos_lat)
        };

        let reaches_pole = min_lat <= -90.0 || max_lat >= 90.0;
        let (min_lng, max_lng) = if reaches_pole || lng_delta >= 180.0 {
            (-180.0, 180.0)
        } else {
            (
                (center.longitude - lng_delta).max(-180.0),
                (center.longitude + lng_delta).min(180.0),
            )
        };

        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    pub fn contains(&self, point: &Coordinates) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

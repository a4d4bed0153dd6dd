//! Geodesy primitives: points, great-circle distance and bearing, and the
//! flat-earth offsets used to lay out a field.
//!
//! A field is at most ~100 m across, so offsets use a fixed
//! meters-per-degree constant with a cosine-of-latitude correction on the
//! longitude axis rather than a full geodesic solution.

use std::f64::consts::TAU;
use std::fmt;

/// Mean Earth radius (m) for the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude.
pub const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// A WGS-84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Linear interpolation towards `other` (`t = 0` is `self`).
    pub fn lerp(self, other: GeoPoint, t: f64) -> GeoPoint {
        GeoPoint {
            lat: self.lat + (other.lat - self.lat) * t,
            lng: self.lng + (other.lng - self.lng) * t,
        }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Great-circle distance between two points in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing from `from` to `to`, radians clockwise from
/// north in `[0, 2π)`.
///
/// Identical points have no direction; they return 0.
pub fn bearing_rad(from: GeoPoint, to: GeoPoint) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let y = d_lng.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lng.cos();
    if y.abs() < f64::EPSILON && x.abs() < f64::EPSILON {
        return 0.0;
    }
    y.atan2(x).rem_euclid(TAU)
}

/// Unit vector for a bearing in degree space: `(d_lat, d_lng)` per meter,
/// longitude scaled by `1 / cos(ref_lat)` for meridian convergence.
pub fn unit_deg_per_m(bearing: f64, ref_lat: f64) -> (f64, f64) {
    let d_lat = bearing.cos() / METERS_PER_DEG_LAT;
    let d_lng = bearing.sin() / (METERS_PER_DEG_LAT * ref_lat.to_radians().cos());
    (d_lat, d_lng)
}

/// Move `point` by `meters` along `bearing` (flat approximation around
/// `ref_lat`).
pub fn offset(point: GeoPoint, bearing: f64, meters: f64, ref_lat: f64) -> GeoPoint {
    let (d_lat, d_lng) = unit_deg_per_m(bearing, ref_lat);
    GeoPoint {
        lat: point.lat + d_lat * meters,
        lng: point.lng + d_lng * meters,
    }
}

/// Axis-aligned lat/lng bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl GeoBounds {
    /// Box of `half_lat` × `half_lng` degrees around a center point.
    pub fn around(center: GeoPoint, half_lat: f64, half_lng: f64) -> Self {
        Self {
            min_lat: center.lat - half_lat,
            max_lat: center.lat + half_lat,
            min_lng: center.lng - half_lng,
            max_lng: center.lng + half_lng,
        }
    }
}

//! Two-point field calibration and GPS ↔ surface projection.
//!
//! A tracker placed on the center spot provides one fix; the operator walks
//! to the midpoint of the near sideline and captures a second. The bearing
//! between them fixes the field's orientation, their distance its width, and
//! a standard length completes the rectangle.
//!
//! Surface coordinates are normalized: `u` runs left → right along the long
//! axis, `v` runs top (far sideline) → bottom (the sideline the operator
//! stood on).

use std::f64::consts::FRAC_PI_2;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

use crate::geo::{self, GeoBounds, GeoPoint};

/// Standard field length (m), long axis.
pub const STANDARD_LENGTH_M: f64 = 91.4;

/// Field width (m) used when the measured width is implausible.
pub const STANDARD_WIDTH_M: f64 = 55.0;

/// Plausible center-to-sideline distance (m).
pub const PLAUSIBLE_HALF_WIDTH_M: std::ops::RangeInclusive<f64> = 20.0..=40.0;

/// Fixed iteration count for the inverse bilinear solve.
pub const INVERSE_ITERATIONS: usize = 10;

/// How far outside `[0, 1]` a solved coordinate may fall before the point is
/// treated as off the field.
pub const MAP_TOLERANCE: f64 = 0.1;

/// Coordinate spans below this are degenerate.
const DEGENERATE_SPAN: f64 = 1e-10;

/// Errors returned to the caller driving calibration.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration incomplete: no center fix recorded")]
    Incomplete,

    #[error("no calibration in progress")]
    NotStarted,

    #[error("timed out waiting for a GPS fix after {timeout:?}")]
    GpsTimeout { timeout: Duration },

    #[error("location permission denied")]
    PermissionDenied,

    #[error("location error: {0}")]
    Location(String),
}

/// Normalized field coordinate, `[0, 1]` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurfacePoint {
    pub u: f64,
    pub v: f64,
}

/// Pixel-space canvas dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

/// A point on the canvas in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

impl SurfacePoint {
    pub fn to_canvas(self, canvas: CanvasSize) -> CanvasPoint {
        CanvasPoint {
            x: self.u * canvas.width,
            y: self.v * canvas.height,
        }
    }
}

/// Oriented field rectangle derived from two GPS points.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldCalibration {
    center: GeoPoint,
    sideline: GeoPoint,
    /// Bearing sideline → center (radians), perpendicular to the long axis.
    short_axis_bearing: f64,
    long_axis_bearing: f64,
    measured_half_width_m: f64,
    width_m: f64,
    length_m: f64,
    /// `[top_left, top_right, bottom_right, bottom_left]`.
    corners: [GeoPoint; 4],
}

impl FieldCalibration {
    /// Build a calibration from the center fix and the sideline-midpoint fix.
    ///
    /// `width_override` (if positive) replaces the measured width.
    pub fn new(center: GeoPoint, sideline: GeoPoint, width_override: Option<f64>) -> Self {
        let short_axis_bearing = geo::bearing_rad(sideline, center);
        let long_axis_bearing = short_axis_bearing + FRAC_PI_2;
        let measured_half_width_m = geo::haversine_m(center, sideline);

        let width_m = match width_override.filter(|w| *w > 0.0) {
            Some(w) => w,
            None if PLAUSIBLE_HALF_WIDTH_M.contains(&measured_half_width_m) => {
                2.0 * measured_half_width_m
            }
            None => {
                warn!(
                    "measured half-width {measured_half_width_m:.1} m outside {:?}, using {STANDARD_WIDTH_M} m",
                    PLAUSIBLE_HALF_WIDTH_M
                );
                STANDARD_WIDTH_M
            }
        };
        let length_m = STANDARD_LENGTH_M;

        let half_w = width_m / 2.0;
        let half_l = length_m / 2.0;
        let at = |long_m: f64, short_m: f64| {
            let p = geo::offset(center, long_axis_bearing, long_m, center.lat);
            geo::offset(p, short_axis_bearing, short_m, center.lat)
        };
        let corners = [
            at(-half_l, half_w),
            at(half_l, half_w),
            at(half_l, -half_w),
            at(-half_l, -half_w),
        ];

        debug!(
            "field calibrated: center {center} bearing {:.1}° width {width_m:.1} m",
            short_axis_bearing.to_degrees()
        );

        Self {
            center,
            sideline,
            short_axis_bearing,
            long_axis_bearing,
            measured_half_width_m,
            width_m,
            length_m,
            corners,
        }
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn sideline(&self) -> GeoPoint {
        self.sideline
    }

    /// Field orientation: bearing of the long axis (radians from north).
    pub fn bearing_rad(&self) -> f64 {
        self.long_axis_bearing
    }

    pub fn short_axis_bearing_rad(&self) -> f64 {
        self.short_axis_bearing
    }

    /// Twice the measured center-to-sideline distance, whether or not it was
    /// used.
    pub fn measured_width_m(&self) -> f64 {
        2.0 * self.measured_half_width_m
    }

    pub fn measured_half_width_m(&self) -> f64 {
        self.measured_half_width_m
    }

    /// Effective field width.
    pub fn width_m(&self) -> f64 {
        self.width_m
    }

    pub fn length_m(&self) -> f64 {
        self.length_m
    }

    /// `[top_left, top_right, bottom_right, bottom_left]`.
    pub fn corners(&self) -> [GeoPoint; 4] {
        self.corners
    }

    /// Solve for the surface coordinate of `point`.
    ///
    /// Returns `None` if the point lies more than [`MAP_TOLERANCE`] outside
    /// the field on either axis.
    pub fn normalize(&self, point: GeoPoint) -> Option<SurfacePoint> {
        let (u, v) = self.solve(point);
        let range = -MAP_TOLERANCE..=1.0 + MAP_TOLERANCE;
        if !range.contains(&u) || !range.contains(&v) {
            return None;
        }
        Some(SurfacePoint {
            u: u.clamp(0.0, 1.0),
            v: v.clamp(0.0, 1.0),
        })
    }

    /// Surface coordinate scaled to a canvas.
    pub fn project(&self, point: GeoPoint, canvas: CanvasSize) -> Option<CanvasPoint> {
        self.normalize(point).map(|s| s.to_canvas(canvas))
    }

    /// Bilinear interpolation of the corners: surface → GPS.
    pub fn denormalize(&self, s: SurfacePoint) -> GeoPoint {
        let [tl, tr, br, bl] = self.corners;
        let top = tl.lerp(tr, s.u);
        let bottom = bl.lerp(br, s.u);
        top.lerp(bottom, s.v)
    }

    /// Fixed-point inverse of the bilinear map. No convergence test: the
    /// iteration count is part of the observable behavior.
    ///
    /// `v` is solved on latitude and `u` on longitude, so this assumes a
    /// roughly east-west long axis. A north-south field is unmappable.
    fn solve(&self, p: GeoPoint) -> (f64, f64) {
        let [tl, tr, br, bl] = self.corners;
        let (mut u, mut v) = (0.5, 0.5);
        for _ in 0..INVERSE_ITERATIONS {
            let top = tl.lerp(tr, u);
            let bottom = bl.lerp(br, u);
            let left = tl.lerp(bl, v);
            let right = tr.lerp(br, v);
            v = fraction(p.lat, top.lat, bottom.lat);
            u = fraction(p.lng, left.lng, right.lng);
        }
        (u, v)
    }
}

/// Position of `x` along `a → b`; degenerate spans resolve to the middle.
fn fraction(x: f64, a: f64, b: f64) -> f64 {
    let span = b - a;
    if span.abs() < DEGENERATE_SPAN {
        0.5
    } else {
        (x - a) / span
    }
}

/// Uncalibrated mapping: linear against a fixed box, north at the top.
pub fn fallback_normalize(point: GeoPoint, bounds: &GeoBounds) -> SurfacePoint {
    let u = fraction(point.lng, bounds.min_lng, bounds.max_lng);
    let v = 1.0 - fraction(point.lat, bounds.min_lat, bounds.max_lat);
    SurfacePoint {
        u: u.clamp(0.0, 1.0),
        v: v.clamp(0.0, 1.0),
    }
}

/// Maps fixes with the calibration when one exists, else the fallback box.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    calibration: Option<FieldCalibration>,
    fallback: GeoBounds,
}

impl FieldMapper {
    pub fn new(calibration: Option<FieldCalibration>, fallback: GeoBounds) -> Self {
        Self { calibration, fallback }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn normalize(&self, point: GeoPoint) -> Option<SurfacePoint> {
        match &self.calibration {
            Some(cal) => cal.normalize(point),
            None => Some(fallback_normalize(point, &self.fallback)),
        }
    }

    pub fn project(&self, point: GeoPoint, canvas: CanvasSize) -> Option<CanvasPoint> {
        self.normalize(point).map(|s| s.to_canvas(canvas))
    }
}

// ---------------------------------------------------------------------------
// Calibration session
// ---------------------------------------------------------------------------

/// Source of the operator's own GPS fix (phone location services or
/// similar).
pub trait LocationSource {
    /// Block up to `timeout` for a fresh fix.
    fn current_fix(&mut self, timeout: Duration) -> Result<GeoPoint, CalibrationError>;
}

/// Drives the two-point calibration procedure.
///
/// The calibration is replaced wholesale on success; failed captures leave
/// all state untouched.
#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    in_progress: bool,
    center: Option<GeoPoint>,
    width_override: Option<f64>,
    calibration: Option<FieldCalibration>,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a measured field width instead of the two-point estimate.
    pub fn with_width_override(mut self, width_m: Option<f64>) -> Self {
        self.width_override = width_m;
        self
    }

    /// Start (or restart) a calibration. Pending points are discarded; the
    /// current calibration stays in effect until a new one is captured.
    pub fn begin_calibration(&mut self) {
        self.in_progress = true;
        self.center = None;
    }

    pub fn is_calibrating(&self) -> bool {
        self.in_progress
    }

    /// Record the tracker-confirmed center fix.
    pub fn set_center_fix(&mut self, point: GeoPoint) {
        if !self.in_progress {
            self.begin_calibration();
        }
        self.center = Some(point);
    }

    pub fn center_fix(&self) -> Option<GeoPoint> {
        self.center
    }

    /// Complete calibration with the sideline-midpoint fix.
    pub fn capture_sideline_point(
        &mut self,
        point: GeoPoint,
    ) -> Result<FieldCalibration, CalibrationError> {
        let center = self.center.ok_or(CalibrationError::Incomplete)?;
        let cal = FieldCalibration::new(center, point, self.width_override);
        self.calibration = Some(cal.clone());
        self.in_progress = false;
        self.center = None;
        Ok(cal)
    }

    /// Acquire the sideline fix from `source` and complete calibration.
    pub fn capture_sideline(
        &mut self,
        source: &mut impl LocationSource,
        timeout: Duration,
    ) -> Result<FieldCalibration, CalibrationError> {
        if !self.in_progress {
            return Err(CalibrationError::NotStarted);
        }
        if self.center.is_none() {
            return Err(CalibrationError::Incomplete);
        }
        let point = source.current_fix(timeout)?;
        self.capture_sideline_point(point)
    }

    /// Drop the session and any calibration.
    pub fn clear(&mut self) {
        self.in_progress = false;
        self.center = None;
        self.calibration = None;
    }

    pub fn calibration(&self) -> Option<&FieldCalibration> {
        self.calibration.as_ref()
    }

    /// Mapper over the current calibration (or the fallback box).
    pub fn mapper(&self, fallback: GeoBounds) -> FieldMapper {
        FieldMapper::new(self.calibration.clone(), fallback)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    const CENTER: GeoPoint = GeoPoint::new(-25.7470, 28.2293);

    /// Sideline `meters` due south of CENTER.
    fn south_of_center(meters: f64) -> GeoPoint {
        GeoPoint::new(CENTER.lat - meters / geo::METERS_PER_DEG_LAT, CENTER.lng)
    }

    #[test]
    fn implausible_width_falls_back() {
        let cal = FieldCalibration::new(CENTER, GeoPoint::new(-25.7479, 28.2293), None);
        assert!(cal.measured_half_width_m() > 40.0);
        assert_eq!(cal.width_m(), STANDARD_WIDTH_M);
        assert_eq!(cal.length_m(), STANDARD_LENGTH_M);
    }

    #[test]
    fn too_narrow_falls_back() {
        let cal = FieldCalibration::new(CENTER, south_of_center(5.0), None);
        assert_eq!(cal.width_m(), STANDARD_WIDTH_M);
    }

    #[test]
    fn plausible_width_is_measured() {
        for d in [20.5, 27.5, 39.5] {
            let cal = FieldCalibration::new(CENTER, south_of_center(d), None);
            assert_abs_diff_eq!(cal.measured_width_m(), 2.0 * d, epsilon = 0.2);
            assert_abs_diff_eq!(cal.width_m(), 2.0 * d, epsilon = 0.2);
        }
    }

    #[test]
    fn width_override_wins() {
        let cal = FieldCalibration::new(CENTER, south_of_center(27.5), Some(60.0));
        assert_eq!(cal.width_m(), 60.0);
        let cal = FieldCalibration::new(CENTER, south_of_center(27.5), Some(0.0));
        assert_abs_diff_eq!(cal.width_m(), 55.0, epsilon = 0.2);
    }

    #[test]
    fn north_facing_orientation() {
        let cal = FieldCalibration::new(CENTER, south_of_center(27.5), None);
        assert_abs_diff_eq!(cal.short_axis_bearing_rad(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(cal.bearing_rad(), FRAC_PI_2, epsilon = 1e-9);

        let [tl, tr, br, bl] = cal.corners();
        // Top is the far (north) side, right is east.
        assert!(tl.lat > CENTER.lat && tr.lat > CENTER.lat);
        assert!(bl.lat < CENTER.lat && br.lat < CENTER.lat);
        assert!(tl.lng < CENTER.lng && bl.lng < CENTER.lng);
        assert!(tr.lng > CENTER.lng && br.lng > CENTER.lng);
    }

    #[test]
    fn corner_distances_match_dimensions() {
        let cal = FieldCalibration::new(CENTER, south_of_center(30.0), None);
        let [tl, tr, br, bl] = cal.corners();
        assert_abs_diff_eq!(geo::haversine_m(tl, tr), STANDARD_LENGTH_M, epsilon = 0.5);
        assert_abs_diff_eq!(geo::haversine_m(bl, br), STANDARD_LENGTH_M, epsilon = 0.5);
        assert_abs_diff_eq!(geo::haversine_m(tl, bl), cal.width_m(), epsilon = 0.5);
    }

    #[test]
    fn center_maps_to_middle() {
        let cal = FieldCalibration::new(CENTER, south_of_center(27.5), None);
        let s = cal.normalize(CENTER).unwrap();
        assert_abs_diff_eq!(s.u, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(s.v, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn sideline_maps_to_bottom_middle() {
        let sideline = south_of_center(27.5);
        let cal = FieldCalibration::new(CENTER, sideline, None);
        let s = cal.normalize(sideline).unwrap();
        assert_abs_diff_eq!(s.u, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(s.v, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn corners_map_to_extremes() {
        let cal = FieldCalibration::new(CENTER, south_of_center(27.5), None);
        let [tl, tr, br, bl] = cal.corners();
        for (corner, (u, v)) in [
            (tl, (0.0, 0.0)),
            (tr, (1.0, 0.0)),
            (br, (1.0, 1.0)),
            (bl, (0.0, 1.0)),
        ] {
            let s = cal.normalize(corner).unwrap();
            assert_abs_diff_eq!(s.u, u, epsilon = 0.1);
            assert_abs_diff_eq!(s.v, v, epsilon = 0.1);
        }
    }

    #[test]
    fn north_south_long_axis_is_unmappable() {
        let meters_per_deg_lng = geo::METERS_PER_DEG_LAT * CENTER.lat.to_radians().cos();
        let west = GeoPoint::new(CENTER.lat, CENTER.lng - 27.5 / meters_per_deg_lng);
        let cal = FieldCalibration::new(CENTER, west, None);
        for corner in cal.corners() {
            assert_eq!(cal.normalize(corner), None);
        }
    }

    #[test]
    fn far_off_field_is_unmappable() {
        let cal = FieldCalibration::new(CENTER, south_of_center(27.5), None);
        // 200 m north of center, well beyond the far sideline.
        let p = GeoPoint::new(CENTER.lat + 200.0 / geo::METERS_PER_DEG_LAT, CENTER.lng);
        assert_eq!(cal.normalize(p), None);
    }

    #[test]
    fn slightly_off_field_is_clamped() {
        let sideline = south_of_center(27.5);
        let cal = FieldCalibration::new(CENTER, sideline, None);
        // 2 m behind the near sideline, inside the tolerance band.
        let p = GeoPoint::new(sideline.lat - 2.0 / geo::METERS_PER_DEG_LAT, sideline.lng);
        let s = cal.normalize(p).unwrap();
        assert_eq!(s.v, 1.0);
    }

    #[test]
    fn denormalize_inverts_normalize() {
        let cal = FieldCalibration::new(CENTER, south_of_center(25.0), None);
        let s = SurfacePoint { u: 0.25, v: 0.8 };
        let p = cal.denormalize(s);
        let back = cal.normalize(p).unwrap();
        assert_abs_diff_eq!(back.u, 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(back.v, 0.8, epsilon = 1e-6);
    }

    #[test]
    fn project_scales_to_canvas() {
        let cal = FieldCalibration::new(CENTER, south_of_center(27.5), None);
        let c = cal
            .project(CENTER, CanvasSize { width: 800.0, height: 500.0 })
            .unwrap();
        assert_abs_diff_eq!(c.x, 400.0, epsilon = 1e-3);
        assert_abs_diff_eq!(c.y, 250.0, epsilon = 1e-3);
    }

    #[test]
    fn identical_points_do_not_panic() {
        let cal = FieldCalibration::new(CENTER, CENTER, None);
        assert_eq!(cal.short_axis_bearing_rad(), 0.0);
        assert_eq!(cal.width_m(), STANDARD_WIDTH_M);
        let s = cal.normalize(CENTER).unwrap();
        assert_abs_diff_eq!(s.u, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_span_resolves_to_middle() {
        assert_eq!(fraction(3.0, 1.0, 1.0), 0.5);
        assert_eq!(fraction(1.5, 1.0, 2.0), 0.5);
    }

    #[test]
    fn fallback_north_is_top() {
        let bounds = GeoBounds::around(CENTER, 0.001, 0.001);
        let s = fallback_normalize(GeoPoint::new(CENTER.lat + 0.001, CENTER.lng - 0.001), &bounds);
        assert_abs_diff_eq!(s.u, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(s.v, 0.0, epsilon = 1e-9);
        let s = fallback_normalize(CENTER, &bounds);
        assert_abs_diff_eq!(s.u, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(s.v, 0.5, epsilon = 1e-9);
        let s = fallback_normalize(GeoPoint::new(0.0, 0.0), &bounds);
        assert!((0.0..=1.0).contains(&s.u) && (0.0..=1.0).contains(&s.v));
    }

    #[test]
    fn mapper_prefers_calibration() {
        let bounds = GeoBounds::around(CENTER, 0.01, 0.01);
        let far = GeoPoint::new(CENTER.lat + 0.005, CENTER.lng);
        let uncalibrated = FieldMapper::new(None, bounds);
        assert!(uncalibrated.normalize(far).is_some());

        let cal = FieldCalibration::new(CENTER, south_of_center(27.5), None);
        let calibrated = FieldMapper::new(Some(cal), bounds);
        assert!(calibrated.is_calibrated());
        assert_eq!(calibrated.normalize(far), None);
    }

    #[test]
    fn capture_before_center_is_incomplete() {
        let mut c = Calibrator::new();
        c.begin_calibration();
        let err = c.capture_sideline_point(south_of_center(27.5)).unwrap_err();
        assert!(matches!(err, CalibrationError::Incomplete));
        assert!(c.is_calibrating());
        assert!(c.calibration().is_none());
    }

    #[test]
    fn two_point_procedure() {
        let mut c = Calibrator::new();
        c.begin_calibration();
        c.set_center_fix(CENTER);
        let cal = c.capture_sideline_point(south_of_center(27.5)).unwrap();
        assert_eq!(c.calibration(), Some(&cal));
        assert!(!c.is_calibrating());
        assert!(c.mapper(GeoBounds::around(CENTER, 0.01, 0.01)).is_calibrated());

        c.clear();
        assert!(c.calibration().is_none());
    }

    #[test]
    fn recalibration_keeps_previous_until_captured() {
        let mut c = Calibrator::new();
        c.set_center_fix(CENTER);
        let first = c.capture_sideline_point(south_of_center(27.5)).unwrap();
        c.begin_calibration();
        assert_eq!(c.calibration(), Some(&first));
        c.set_center_fix(CENTER);
        let second = c.capture_sideline_point(south_of_center(30.0)).unwrap();
        assert_eq!(c.calibration(), Some(&second));
    }

    enum FixedLocation {
        Fix(GeoPoint),
        Timeout,
        Denied,
    }

    impl LocationSource for FixedLocation {
        fn current_fix(&mut self, timeout: Duration) -> Result<GeoPoint, CalibrationError> {
            match self {
                FixedLocation::Fix(p) => Ok(*p),
                FixedLocation::Timeout => Err(CalibrationError::GpsTimeout { timeout }),
                FixedLocation::Denied => Err(CalibrationError::PermissionDenied),
            }
        }
    }

    #[test]
    fn location_errors_surface_verbatim() {
        let mut c = Calibrator::new();
        c.begin_calibration();
        c.set_center_fix(CENTER);

        let mut timeout = FixedLocation::Timeout;
        let err = c.capture_sideline(&mut timeout, Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, CalibrationError::GpsTimeout { timeout } if timeout == Duration::from_secs(10)));

        let mut denied = FixedLocation::Denied;
        let err = c.capture_sideline(&mut denied, Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, CalibrationError::PermissionDenied));

        // State unchanged: the center is still there.
        assert_eq!(c.center_fix(), Some(CENTER));
        let mut ok = FixedLocation::Fix(south_of_center(27.5));
        assert!(c.capture_sideline(&mut ok, Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn capture_outside_session() {
        let mut c = Calibrator::new();
        let mut ok = FixedLocation::Fix(CENTER);
        assert!(matches!(
            c.capture_sideline(&mut ok, Duration::from_secs(1)),
            Err(CalibrationError::NotStarted)
        ));
    }
}

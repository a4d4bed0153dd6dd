//! Runtime configuration.
//!
//! Everything device- or venue-specific lives here so a deployment can swap
//! in its own values (from JSON with the `json` feature).

use std::time::Duration;

use crate::geo::{GeoBounds, GeoPoint};
use crate::radio::CommandEndpoint;

/// Manufacturer tag the trackers advertise under (0xFFFF, the
/// unassigned/test company identifier).
pub const DEFAULT_MANUFACTURER_ID: u16 = 0xFFFF;

/// Default origin for GPS offsets and the fallback map box.
pub const DEFAULT_FIELD_CENTER: GeoPoint = GeoPoint::new(-25.7470, 28.2293);

/// Trail length (raw positions per entity).
pub const DEFAULT_TRAIL_CAP: usize = 20;

/// Intensity history length (samples per entity).
pub const DEFAULT_HISTORY_CAP: usize = 300;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackerConfig {
    /// Origin that frame GPS offsets are relative to.
    pub field_center: GeoPoint,
    pub manufacturer_id: u16,
    pub command_endpoint: CommandEndpoint,
    pub connect_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// How long `poll()` waits for a scan event.
    pub poll_interval_ms: u64,
    pub trail_cap: usize,
    pub history_cap: usize,
    /// Map box used before the field is calibrated.
    pub fallback_bounds: GeoBounds,
    /// Measured field width, replacing the two-point estimate.
    pub width_override_m: Option<f64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            field_center: DEFAULT_FIELD_CENTER,
            manufacturer_id: DEFAULT_MANUFACTURER_ID,
            command_endpoint: CommandEndpoint::default(),
            connect_timeout_ms: 8_000,
            discovery_timeout_ms: 5_000,
            write_timeout_ms: 3_000,
            poll_interval_ms: 250,
            trail_cap: DEFAULT_TRAIL_CAP,
            history_cap: DEFAULT_HISTORY_CAP,
            fallback_bounds: GeoBounds::around(DEFAULT_FIELD_CENTER, 0.0006, 0.0007),
            width_override_m: None,
        }
    }
}

impl TrackerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parse a JSON config; missing keys take their defaults.
    #[cfg(feature = "json")]
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    #[cfg(feature = "json")]
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts() {
        let c = TrackerConfig::default();
        assert_eq!(c.connect_timeout(), Duration::from_secs(8));
        assert_eq!(c.discovery_timeout(), Duration::from_secs(5));
        assert_eq!(c.trail_cap, 20);
        assert_eq!(c.history_cap, 300);
    }

    #[test]
    fn fallback_box_contains_center() {
        let c = TrackerConfig::default();
        let b = c.fallback_bounds;
        assert!(b.min_lat < c.field_center.lat && c.field_center.lat < b.max_lat);
        assert!(b.min_lng < c.field_center.lng && c.field_center.lng < b.max_lng);
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_partial_overrides() {
        let c = TrackerConfig::from_json_str(r#"{"manufacturer_id": 1234, "trail_cap": 5}"#).unwrap();
        assert_eq!(c.manufacturer_id, 1234);
        assert_eq!(c.trail_cap, 5);
        assert_eq!(c.history_cap, DEFAULT_HISTORY_CAP);
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_round_trip() {
        let c = TrackerConfig::default();
        let s = c.to_json_string().unwrap();
        assert_eq!(TrackerConfig::from_json_str(&s).unwrap(), c);
    }
}

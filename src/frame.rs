//! Tracker advertisement frame decoding.
//!
//! Wire format (20 bytes, little-endian):
//! ```text
//! 00     status flags     b0 logging b1 gps_fix b2 low_battery b3 impact b4 link b5 focus
//! 01     battery %        clamp 0..=100
//! 02     intensity 1s
//! 03     intensity 1min
//! 04-05  intensity 10min  u16
//! 06     speed            × 0.5 km/h
//! 07     max speed        × 0.5 km/h
//! 08     impact count
//! 09     gps status       hi nibble age (s), lo nibble satellites
//! 10-11  movement count   u16
//! 12-13  session time (s) u16
//! 14     audio peak
//! 15-16  lat offset       i16 × 0.00001°, 32767 = no fix
//! 17-18  lng offset       i16 × 0.00001°, 32767 = no fix
//! 19     reserved
//! ```

use crate::codec;
use crate::error::{FrameError, Result};
use crate::geo::GeoPoint;

/// Fixed advertisement payload length.
pub const FRAME_LEN: usize = 20;

/// Raw offset value meaning "no GPS fix".
pub const GPS_SENTINEL: i16 = 32767;

/// Degrees per raw GPS offset unit.
pub const GPS_OFFSET_SCALE: f64 = 0.00001;

/// km/h per raw speed unit.
pub const SPEED_SCALE: f64 = 0.5;

const FLAG_LOGGING: u8 = 1 << 0;
const FLAG_GPS_FIX: u8 = 1 << 1;
const FLAG_LOW_BATTERY: u8 = 1 << 2;
const FLAG_IMPACT: u8 = 1 << 3;
const FLAG_LINK_CONNECTED: u8 = 1 << 4;
const FLAG_FOCUS: u8 = 1 << 5;

/// Status bitmask from byte 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusFlags {
    pub logging: bool,
    pub gps_fix: bool,
    pub low_battery: bool,
    pub impact: bool,
    pub link_connected: bool,
    pub focus: bool,
}

impl StatusFlags {
    pub fn from_byte(b: u8) -> Self {
        Self {
            logging: b & FLAG_LOGGING != 0,
            gps_fix: b & FLAG_GPS_FIX != 0,
            low_battery: b & FLAG_LOW_BATTERY != 0,
            impact: b & FLAG_IMPACT != 0,
            link_connected: b & FLAG_LINK_CONNECTED != 0,
            focus: b & FLAG_FOCUS != 0,
        }
    }

    pub fn as_byte(self) -> u8 {
        let mut b = 0;
        for (set, bit) in [
            (self.logging, FLAG_LOGGING),
            (self.gps_fix, FLAG_GPS_FIX),
            (self.low_battery, FLAG_LOW_BATTERY),
            (self.impact, FLAG_IMPACT),
            (self.link_connected, FLAG_LINK_CONNECTED),
            (self.focus, FLAG_FOCUS),
        ] {
            if set {
                b |= bit;
            }
        }
        b
    }
}

/// One decoded telemetry advertisement.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryFrame {
    pub flags: StatusFlags,
    /// Battery charge (0-100).
    pub battery_percent: u8,
    pub intensity_1s: u8,
    pub intensity_1min: u8,
    /// 10-minute intensity score (wider than one byte, ~0-1023).
    pub intensity_10min: u16,
    pub speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub impact_count: u8,
    pub movement_count: u16,
    pub session_time_sec: u16,
    /// Seconds since the last GPS fix (0-15).
    pub gps_age_sec: u8,
    pub gps_satellites: u8,
    pub audio_peak: u8,
    /// `None` when either offset carries the sentinel.
    pub position: Option<GeoPoint>,
}

impl TelemetryFrame {
    /// Decode a frame. GPS offsets are relative to `origin` (the configured
    /// field center).
    pub fn decode(bytes: &[u8], origin: GeoPoint) -> Result<Self> {
        if bytes.len() < FRAME_LEN {
            return Err(FrameError::malformed(bytes.len()).with_raw(bytes));
        }
        let (gps_age_sec, gps_satellites) = codec::split_nibbles(bytes[9]);
        let lat_raw = codec::read_i16_le(bytes, 15)?;
        let lng_raw = codec::read_i16_le(bytes, 17)?;

        Ok(Self {
            flags: StatusFlags::from_byte(bytes[0]),
            battery_percent: bytes[1].min(100),
            intensity_1s: bytes[2],
            intensity_1min: bytes[3],
            intensity_10min: codec::read_u16_le(bytes, 4)?,
            speed_kmh: codec::read_u8_scaled(bytes, 6, SPEED_SCALE)?,
            max_speed_kmh: codec::read_u8_scaled(bytes, 7, SPEED_SCALE)?,
            impact_count: bytes[8],
            gps_age_sec,
            gps_satellites,
            movement_count: codec::read_u16_le(bytes, 10)?,
            session_time_sec: codec::read_u16_le(bytes, 12)?,
            audio_peak: bytes[14],
            position: decode_position(lat_raw, lng_raw, origin),
        })
    }

    /// Encode into a wire frame relative to `origin`.
    ///
    /// Speeds round to the nearest half km/h and saturate at 127.5. A
    /// position whose offset does not fit in an `i16` encodes as "no fix".
    pub fn encode(&self, origin: GeoPoint) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[0] = self.flags.as_byte();
        buf[1] = self.battery_percent.min(100);
        buf[2] = self.intensity_1s;
        buf[3] = self.intensity_1min;
        codec::write_u16_le(&mut buf, 4, self.intensity_10min);
        buf[6] = encode_speed(self.speed_kmh);
        buf[7] = encode_speed(self.max_speed_kmh);
        buf[8] = self.impact_count;
        buf[9] = (self.gps_age_sec.min(15) << 4) | self.gps_satellites.min(15);
        codec::write_u16_le(&mut buf, 10, self.movement_count);
        codec::write_u16_le(&mut buf, 12, self.session_time_sec);
        buf[14] = self.audio_peak;

        let (lat_raw, lng_raw) = self
            .position
            .and_then(|p| {
                Some((
                    encode_offset(p.lat - origin.lat)?,
                    encode_offset(p.lng - origin.lng)?,
                ))
            })
            .unwrap_or((GPS_SENTINEL, GPS_SENTINEL));
        codec::write_i16_le(&mut buf, 15, lat_raw);
        codec::write_i16_le(&mut buf, 17, lng_raw);
        buf
    }

    /// 30-second intensity. The device does not report one; this is the
    /// 1-minute figure under another name.
    pub fn intensity_30s(&self) -> u8 {
        self.intensity_1min
    }

    /// 5-minute intensity. Not a windowed average: the 10-minute score
    /// shifted right two bits and saturated to one byte.
    pub fn intensity_5min(&self) -> u8 {
        intensity_5min_from(self.intensity_10min)
    }
}

pub(crate) fn intensity_5min_from(intensity_10min: u16) -> u8 {
    (intensity_10min >> 2).min(255) as u8
}

fn decode_position(lat_raw: i16, lng_raw: i16, origin: GeoPoint) -> Option<GeoPoint> {
    if lat_raw == GPS_SENTINEL || lng_raw == GPS_SENTINEL {
        return None;
    }
    Some(GeoPoint {
        lat: origin.lat + f64::from(lat_raw) * GPS_OFFSET_SCALE,
        lng: origin.lng + f64::from(lng_raw) * GPS_OFFSET_SCALE,
    })
}

fn encode_speed(kmh: f64) -> u8 {
    (kmh / SPEED_SCALE).round().clamp(0.0, 255.0) as u8
}

fn encode_offset(deg: f64) -> Option<i16> {
    let raw = (deg / GPS_OFFSET_SCALE).round();
    // The sentinel itself is not a valid offset.
    if raw >= f64::from(i16::MIN) && raw < f64::from(GPS_SENTINEL) {
        Some(raw as i16)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Field codecs for the tracker advertisement payload.
//!
//! All multi-byte integers are little-endian. Signed types use two's
//! complement.

use crate::error::{FrameError, Result};

// ---------------------------------------------------------------------------
// Read helpers
// ---------------------------------------------------------------------------

/// Read a single unsigned byte.
pub fn read_u8(data: &[u8], offset: usize) -> Result<u8> {
    check_len(data, offset, 1, "UINT8")?;
    Ok(data[offset])
}

/// Read a little-endian unsigned 16-bit integer.
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    check_len(data, offset, 2, "UINT16")?;
    Ok(u16::from_le_bytes([data[offset], data[offset + 1]]))
}

/// Read a little-endian signed 16-bit integer.
pub fn read_i16_le(data: &[u8], offset: usize) -> Result<i16> {
    check_len(data, offset, 2, "INT16")?;
    Ok(i16::from_le_bytes([data[offset], data[offset + 1]]))
}

/// Read a byte and multiply by a scale factor.
pub fn read_u8_scaled(data: &[u8], offset: usize, scale: f64) -> Result<f64> {
    Ok(f64::from(read_u8(data, offset)?) * scale)
}

/// Split a byte into `(high, low)` nibbles.
pub fn split_nibbles(b: u8) -> (u8, u8) {
    (b >> 4, b & 0x0F)
}

// ---------------------------------------------------------------------------
// Write helpers
// ---------------------------------------------------------------------------

/// Write a little-endian unsigned 16-bit integer at `offset`.
pub fn write_u16_le(buf: &mut [u8], offset: usize, val: u16) {
    buf[offset..offset + 2].copy_from_slice(&val.to_le_bytes());
}

/// Write a little-endian signed 16-bit integer at `offset`.
pub fn write_i16_le(buf: &mut [u8], offset: usize, val: i16) {
    buf[offset..offset + 2].copy_from_slice(&val.to_le_bytes());
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

fn check_len(data: &[u8], offset: usize, need: usize, name: &'static str) -> Result<()> {
    if data.len() < offset + need {
        Err(FrameError::payload_too_short(name, offset + need, data.len()))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_is_little_endian() {
        assert_eq!(read_u16_le(&[0x00, 0x01], 0).unwrap(), 256);
        assert_eq!(read_u16_le(&[0x34, 0x12], 0).unwrap(), 0x1234);
    }

    #[test]
    fn i16_sign() {
        assert_eq!(read_i16_le(&[0xFF, 0xFF], 0).unwrap(), -1);
        assert_eq!(read_i16_le(&[0xFF, 0x7F], 0).unwrap(), i16::MAX);
        assert_eq!(read_i16_le(&[0x00, 0x80], 0).unwrap(), i16::MIN);
    }

    #[test]
    fn read_at_offset() {
        let data = [0xAA, 0xBB, 0x0A, 0x00];
        assert_eq!(read_u16_le(&data, 2).unwrap(), 10);
        assert_eq!(read_u8(&data, 1).unwrap(), 0xBB);
    }

    #[test]
    fn short_reads_fail() {
        assert!(matches!(
            read_u16_le(&[0x01], 0),
            Err(FrameError::PayloadTooShort { need: 2, got: 1, .. })
        ));
        assert!(read_u8(&[], 0).is_err());
        assert!(read_i16_le(&[0, 0, 0], 2).is_err());
    }

    #[test]
    fn scaled_half_steps() {
        assert_eq!(read_u8_scaled(&[5], 0, 0.5).unwrap(), 2.5);
    }

    #[test]
    fn nibbles() {
        assert_eq!(split_nibbles(0x53), (5, 3));
        assert_eq!(split_nibbles(0xF0), (15, 0));
    }

    #[test]
    fn i16_write_read() {
        let mut buf = [0u8; 4];
        write_i16_le(&mut buf, 1, -12345);
        assert_eq!(read_i16_le(&buf, 1).unwrap(), -12345);
        write_u16_le(&mut buf, 2, 0xBEEF);
        assert_eq!(buf[2..], [0xEFu8, 0xBE]);
    }
}

//! Radio capability interface.
//!
//! The arbiter only talks to the radio through [`Radio`]; platform adapters
//! (BlueZ, CoreBluetooth, Android, a simulator) live outside this crate.
//! The radio holds one connection at a time and cannot scan while
//! connected.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Radio address (MAC or platform UUID) identifying one tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Advertisement contents the adapter hands over.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    pub local_name: Option<String>,
    /// `(company id, bytes)` in the order the adapter reported them.
    pub manufacturer_data: Vec<(u16, Vec<u8>)>,
}

impl Advertisement {
    /// Advertisement carrying a single tagged payload.
    pub fn tagged(tag: u16, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            local_name: None,
            manufacturer_data: vec![(tag, bytes.into())],
        }
    }

    /// Payload under `tag`, else the first payload present. Some adapters
    /// report the company id incorrectly.
    pub fn payload(&self, tag: u16) -> Option<&[u8]> {
        self.manufacturer_data
            .iter()
            .find(|(t, _)| *t == tag)
            .or_else(|| self.manufacturer_data.first())
            .map(|(_, bytes)| bytes.as_slice())
    }
}

/// One scan result. `peer` is whatever the adapter needs to connect later.
#[derive(Debug, Clone)]
pub struct ScanEvent<P> {
    pub id: DeviceId,
    pub peer: P,
    /// Signal strength (dBm).
    pub rssi: i16,
    pub advertisement: Advertisement,
}

/// Text commands understood by the tracker firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
}

impl Command {
    /// Wire form: ASCII, newline-terminated.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Command::Start => b"start\n",
            Command::Stop => b"stop\n",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start => write!(f, "start"),
            Command::Stop => write!(f, "stop"),
        }
    }
}

/// Service and characteristic the command is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandEndpoint {
    pub service: String,
    pub characteristic: String,
}

impl Default for CommandEndpoint {
    /// Nordic UART service, RX (write) characteristic.
    fn default() -> Self {
        Self {
            service: "6e400001-b5a3-f393-e0a9-e50e24dcca9e".into(),
            characteristic: "6e400002-b5a3-f393-e0a9-e50e24dcca9e".into(),
        }
    }
}

/// Errors from radio operations.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("radio unavailable: {0}")]
    Unavailable(String),

    #[error("connect timed out after {timeout:?}")]
    ConnectTimeout { timeout: Duration },

    #[error("command endpoint not found: {0}")]
    DiscoveryFailed(String),

    #[error("command write failed: {0}")]
    WriteFailed(String),

    #[error("a command transaction is already in flight")]
    Busy,

    #[error("link closed by device")]
    Disconnected,

    #[error("unknown tracker {0}")]
    UnknownDevice(String),
}

/// The shared radio. Every call blocks until done or timed out.
pub trait Radio {
    /// Connectable handle taken from a scan result.
    type Peer: Clone;
    /// Live connection.
    type Link;

    fn start_scan(&mut self) -> Result<(), RadioError>;
    fn stop_scan(&mut self) -> Result<(), RadioError>;

    /// Block up to `timeout` for the next scan result; `Ok(None)` on timeout.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<ScanEvent<Self::Peer>>, RadioError>;

    fn connect(&mut self, peer: &Self::Peer, timeout: Duration) -> Result<Self::Link, RadioError>;

    /// Resolve the command endpoint on a connected link.
    fn discover(
        &mut self,
        link: &mut Self::Link,
        endpoint: &CommandEndpoint,
        timeout: Duration,
    ) -> Result<(), RadioError>;

    fn write(&mut self, link: &mut Self::Link, bytes: &[u8], timeout: Duration) -> Result<(), RadioError>;

    fn disconnect(&mut self, link: Self::Link) -> Result<(), RadioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_prefers_tag() {
        let adv = Advertisement {
            local_name: None,
            manufacturer_data: vec![(0x004C, vec![1]), (0xFFFF, vec![2])],
        };
        assert_eq!(adv.payload(0xFFFF), Some(&[2u8][..]));
    }

    #[test]
    fn payload_falls_back_to_first() {
        let adv = Advertisement {
            local_name: None,
            manufacturer_data: vec![(0x0059, vec![7, 7]), (0x004C, vec![1])],
        };
        assert_eq!(adv.payload(0xFFFF), Some(&[7u8, 7][..]));
    }

    #[test]
    fn payload_absent() {
        assert_eq!(Advertisement::default().payload(0xFFFF), None);
    }

    #[test]
    fn command_wire_form() {
        assert_eq!(Command::Start.as_bytes(), b"start\n");
        assert_eq!(Command::Stop.as_bytes(), b"stop\n");
        assert_eq!(Command::Stop.to_string(), "stop");
    }
}

//! In-memory radio for tests and the simulator binary.
//!
//! [`SimRadio`] enforces the real radio's constraints (no connect while
//! scanning, one link at a time) and records every operation so callers can
//! assert on the exact sequence. Events come from a script queue first,
//! then round-robin from any [`SyntheticTracker`]s attached.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::frame::{StatusFlags, TelemetryFrame};
use crate::geo::{self, GeoPoint};
use crate::radio::{Advertisement, Command, CommandEndpoint, DeviceId, Radio, RadioError, ScanEvent};

/// One recorded radio call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioOp {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Discover(DeviceId),
    Write(DeviceId, Vec<u8>),
    Disconnect(DeviceId),
}

#[derive(Debug, Default)]
pub struct SimRadio {
    scanning: bool,
    connected: Option<DeviceId>,
    script: VecDeque<ScanEvent<DeviceId>>,
    trackers: Vec<SyntheticTracker>,
    next_tracker: usize,
    manufacturer_id: u16,
    pub ops: Vec<RadioOp>,
    pub fail_scan: bool,
    pub fail_connect: HashSet<DeviceId>,
    pub fail_discover: HashSet<DeviceId>,
    pub fail_write: HashSet<DeviceId>,
}

impl SimRadio {
    pub fn new(manufacturer_id: u16) -> Self {
        Self {
            manufacturer_id,
            ..Default::default()
        }
    }

    pub fn with_trackers(mut self, trackers: Vec<SyntheticTracker>) -> Self {
        self.trackers = trackers;
        self
    }

    /// Queue a scripted advertisement carrying `bytes` under the configured
    /// manufacturer tag.
    pub fn push_frame(&mut self, id: &str, bytes: &[u8]) {
        let advertisement = Advertisement::tagged(self.manufacturer_id, bytes.to_vec());
        self.push_event(id, advertisement, -60);
    }

    pub fn push_event(&mut self, id: &str, advertisement: Advertisement, rssi: i16) {
        let id = DeviceId::from(id);
        self.script.push_back(ScanEvent {
            peer: id.clone(),
            id,
            rssi,
            advertisement,
        });
    }

    pub fn pending(&self) -> usize {
        self.script.len()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    pub fn trackers(&self) -> &[SyntheticTracker] {
        &self.trackers
    }

    /// Bytes written to `id`, in order.
    pub fn writes_to(&self, id: &str) -> Vec<Vec<u8>> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                RadioOp::Write(to, bytes) if to.as_str() == id => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, op: &RadioOp) -> usize {
        self.ops.iter().filter(|o| *o == op).count()
    }

    fn tracker_mut(&mut self, id: &DeviceId) -> Option<&mut SyntheticTracker> {
        self.trackers.iter_mut().find(|t| &t.id == id)
    }
}

impl Radio for SimRadio {
    type Peer = DeviceId;
    type Link = DeviceId;

    fn start_scan(&mut self) -> Result<(), RadioError> {
        if self.fail_scan {
            return Err(RadioError::Unavailable("adapter powered off".into()));
        }
        if self.connected.is_some() {
            return Err(RadioError::Unavailable("link active".into()));
        }
        self.ops.push(RadioOp::StartScan);
        self.scanning = true;
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), RadioError> {
        self.ops.push(RadioOp::StopScan);
        self.scanning = false;
        Ok(())
    }

    fn next_event(&mut self, _timeout: Duration) -> Result<Option<ScanEvent<DeviceId>>, RadioError> {
        if !self.scanning {
            return Ok(None);
        }
        if let Some(ev) = self.script.pop_front() {
            return Ok(Some(ev));
        }
        if self.trackers.is_empty() {
            return Ok(None);
        }
        let idx = self.next_tracker % self.trackers.len();
        self.next_tracker = idx + 1;
        let tag = self.manufacturer_id;
        Ok(Some(self.trackers[idx].advertise(tag)))
    }

    fn connect(&mut self, peer: &DeviceId, timeout: Duration) -> Result<DeviceId, RadioError> {
        if self.scanning {
            return Err(RadioError::Unavailable("scan active".into()));
        }
        if self.connected.is_some() {
            return Err(RadioError::Unavailable("link active".into()));
        }
        self.ops.push(RadioOp::Connect(peer.clone()));
        if self.fail_connect.contains(peer) {
            return Err(RadioError::ConnectTimeout { timeout });
        }
        self.connected = Some(peer.clone());
        Ok(peer.clone())
    }

    fn discover(
        &mut self,
        link: &mut DeviceId,
        endpoint: &CommandEndpoint,
        _timeout: Duration,
    ) -> Result<(), RadioError> {
        self.ops.push(RadioOp::Discover(link.clone()));
        if self.fail_discover.contains(link) {
            return Err(RadioError::DiscoveryFailed(endpoint.characteristic.clone()));
        }
        Ok(())
    }

    fn write(&mut self, link: &mut DeviceId, bytes: &[u8], _timeout: Duration) -> Result<(), RadioError> {
        self.ops.push(RadioOp::Write(link.clone(), bytes.to_vec()));
        if self.fail_write.contains(link) {
            return Err(RadioError::WriteFailed("GATT error 0x03".into()));
        }
        if let Some(t) = self.tracker_mut(link) {
            t.receive(bytes);
        }
        Ok(())
    }

    fn disconnect(&mut self, link: DeviceId) -> Result<(), RadioError> {
        self.ops.push(RadioOp::Disconnect(link));
        self.connected = None;
        Ok(())
    }
}

/// A fake tracker jogging around an ellipse centred on `origin`.
#[derive(Debug, Clone)]
pub struct SyntheticTracker {
    pub id: DeviceId,
    pub name: String,
    origin: GeoPoint,
    radius_m: f64,
    phase: f64,
    logging: bool,
    session_time_sec: u16,
    movement_count: u16,
    max_speed_kmh: f64,
    battery_percent: u8,
}

impl SyntheticTracker {
    pub fn new(id: &str, name: &str, origin: GeoPoint, radius_m: f64, phase: f64) -> Self {
        Self {
            id: DeviceId::from(id),
            name: name.to_owned(),
            origin,
            radius_m,
            phase,
            logging: false,
            session_time_sec: 0,
            movement_count: 0,
            max_speed_kmh: 0.0,
            battery_percent: 100,
        }
    }

    pub fn is_logging(&self) -> bool {
        self.logging
    }

    /// Handle a command written over the link.
    pub fn receive(&mut self, bytes: &[u8]) {
        if bytes == Command::Start.as_bytes() {
            self.logging = true;
            self.session_time_sec = 0;
            self.movement_count = 0;
            self.max_speed_kmh = 0.0;
        } else if bytes == Command::Stop.as_bytes() {
            self.logging = false;
        }
    }

    /// The tracker's current frame. Advances its clock one second.
    pub fn frame(&mut self) -> TelemetryFrame {
        self.phase += 0.05;
        let speed_kmh = 8.0 + 6.0 * self.phase.sin().abs();
        if self.logging {
            self.session_time_sec = self.session_time_sec.saturating_add(1);
            self.movement_count = self.movement_count.saturating_add(3);
            self.max_speed_kmh = self.max_speed_kmh.max(speed_kmh);
            if self.session_time_sec % 60 == 0 {
                self.battery_percent = self.battery_percent.saturating_sub(1);
            }
        }
        let east = self.radius_m * self.phase.cos();
        let north = 0.6 * self.radius_m * self.phase.sin();
        let p = geo::offset(self.origin, std::f64::consts::FRAC_PI_2, east, self.origin.lat);
        let position = geo::offset(p, 0.0, north, self.origin.lat);
        let intensity = (speed_kmh * 12.0).min(255.0) as u8;

        TelemetryFrame {
            flags: StatusFlags {
                logging: self.logging,
                gps_fix: true,
                low_battery: self.battery_percent < 15,
                ..Default::default()
            },
            battery_percent: self.battery_percent,
            intensity_1s: intensity,
            intensity_1min: intensity / 2,
            intensity_10min: u16::from(intensity) * 3,
            speed_kmh,
            max_speed_kmh: self.max_speed_kmh,
            impact_count: 0,
            movement_count: self.movement_count,
            session_time_sec: self.session_time_sec,
            gps_age_sec: 1,
            gps_satellites: 9,
            audio_peak: 0,
            position: Some(position),
        }
    }

    pub fn advertise(&mut self, tag: u16) -> ScanEvent<DeviceId> {
        let bytes = self.frame().encode(self.origin);
        ScanEvent {
            id: self.id.clone(),
            peer: self.id.clone(),
            rssi: -55,
            advertisement: Advertisement {
                local_name: Some(self.name.clone()),
                manufacturer_data: vec![(tag, bytes.to_vec())],
            },
        }
    }
}

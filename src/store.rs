//! Live per-tracker state.
//!
//! One [`EntityState`] per tracker, created the first time its id shows up.
//! Written only by the arbiter's worker; consumers get cloned snapshots.

use std::collections::{HashMap, VecDeque};

use crate::config::{DEFAULT_HISTORY_CAP, DEFAULT_TRAIL_CAP};
use crate::frame::{self, StatusFlags, TelemetryFrame};
use crate::geo::GeoPoint;
use crate::radio::DeviceId;

/// Jersey colors, assigned in rotation.
pub const PALETTE: [&str; 8] = [
    "#E53935", "#1E88E5", "#43A047", "#FDD835", "#8E24AA", "#FB8C00", "#00ACC1", "#D81B60",
];

/// Static identity of a tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Entity {
    pub id: DeviceId,
    pub name: String,
    pub jersey: u32,
    pub color: &'static str,
}

/// Live state for one entity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntityState {
    pub entity: Entity,
    pub flags: StatusFlags,
    pub battery_percent: u8,
    pub intensity_1s: u8,
    pub intensity_1min: u8,
    pub intensity_10min: u16,
    pub speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub impact_count: u8,
    pub movement_count: u16,
    pub session_time_sec: u16,
    pub gps_age_sec: u8,
    pub gps_satellites: u8,
    pub audio_peak: u8,
    pub position: Option<GeoPoint>,
    /// Recent positions, oldest first.
    pub trail: VecDeque<GeoPoint>,
    /// Recent `intensity_1s` samples, oldest first.
    pub intensity_history: VecDeque<u8>,
    pub rssi: Option<i16>,
    /// Unix millis of the last applied update (0 = never).
    pub last_update_ms: u64,
}

impl EntityState {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            flags: StatusFlags::default(),
            battery_percent: 0,
            intensity_1s: 0,
            intensity_1min: 0,
            intensity_10min: 0,
            speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            impact_count: 0,
            movement_count: 0,
            session_time_sec: 0,
            gps_age_sec: 0,
            gps_satellites: 0,
            audio_peak: 0,
            position: None,
            trail: VecDeque::new(),
            intensity_history: VecDeque::new(),
            rssi: None,
            last_update_ms: 0,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.entity.id
    }

    /// Alias of the 1-minute figure.
    pub fn intensity_30s(&self) -> u8 {
        self.intensity_1min
    }

    /// 10-minute score compressed to one byte (`>> 2`, saturating). Not a
    /// windowed average.
    pub fn intensity_5min(&self) -> u8 {
        frame::intensity_5min_from(self.intensity_10min)
    }
}

fn push_capped<T>(buf: &mut VecDeque<T>, item: T, cap: usize) {
    buf.push_back(item);
    while buf.len() > cap {
        buf.pop_front();
    }
}

/// Owns every [`EntityState`], in first-seen order.
#[derive(Debug, Clone)]
pub struct EntityStore {
    states: Vec<EntityState>,
    index: HashMap<DeviceId, usize>,
    trail_cap: usize,
    history_cap: usize,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new(DEFAULT_TRAIL_CAP, DEFAULT_HISTORY_CAP)
    }
}

impl EntityStore {
    pub fn new(trail_cap: usize, history_cap: usize) -> Self {
        Self {
            states: Vec::new(),
            index: HashMap::new(),
            trail_cap,
            history_cap,
        }
    }

    /// Apply a decoded frame, creating the entity on first sight.
    ///
    /// `name` is the advertised local name, used only at creation.
    pub fn apply_telemetry(
        &mut self,
        id: &DeviceId,
        name: Option<&str>,
        frame: &TelemetryFrame,
        rssi: Option<i16>,
        now_ms: u64,
    ) -> &EntityState {
        let (trail_cap, history_cap) = (self.trail_cap, self.history_cap);
        let idx = self.index_or_insert(id, name);
        let s = &mut self.states[idx];

        s.flags = frame.flags;
        s.battery_percent = frame.battery_percent;
        s.intensity_1s = frame.intensity_1s;
        s.intensity_1min = frame.intensity_1min;
        s.intensity_10min = frame.intensity_10min;
        s.speed_kmh = frame.speed_kmh;
        s.max_speed_kmh = frame.max_speed_kmh;
        s.impact_count = frame.impact_count;
        s.movement_count = frame.movement_count;
        s.session_time_sec = frame.session_time_sec;
        s.gps_age_sec = frame.gps_age_sec;
        s.gps_satellites = frame.gps_satellites;
        s.audio_peak = frame.audio_peak;
        if rssi.is_some() {
            s.rssi = rssi;
        }

        push_capped(&mut s.intensity_history, frame.intensity_1s, history_cap);
        if let Some(p) = frame.position {
            push_capped(&mut s.trail, p, trail_cap);
            s.position = Some(p);
        }
        s.last_update_ms = now_ms;
        s
    }

    /// Apply a GPS fix from outside the frame stream. Unknown ids are
    /// ignored (returns `false`).
    pub fn apply_fix(&mut self, id: &DeviceId, point: GeoPoint, now_ms: u64) -> bool {
        let trail_cap = self.trail_cap;
        let Some(&idx) = self.index.get(id) else {
            return false;
        };
        let s = &mut self.states[idx];
        push_capped(&mut s.trail, point, trail_cap);
        s.position = Some(point);
        s.last_update_ms = now_ms;
        true
    }

    pub fn get(&self, id: &DeviceId) -> Option<&EntityState> {
        self.index.get(id).map(|&i| &self.states[i])
    }

    /// All states in first-seen order.
    pub fn snapshot(&self) -> Vec<EntityState> {
        self.states.clone()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drop every entity; jersey numbering restarts at 1.
    pub fn reset(&mut self) {
        self.states.clear();
        self.index.clear();
    }

    fn index_or_insert(&mut self, id: &DeviceId, name: Option<&str>) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.states.len();
        let jersey = idx as u32 + 1;
        let entity = Entity {
            id: id.clone(),
            name: name
                .filter(|n| !n.is_empty())
                .map_or_else(|| format!("Player {jersey}"), str::to_owned),
            jersey,
            color: PALETTE[idx % PALETTE.len()],
        };
        log::info!("new tracker {id}: #{jersey} {}", entity.name);
        self.states.push(EntityState::new(entity));
        self.index.insert(id.clone(), idx);
        idx
    }
}

//! Radio arbitration: passive scanning vs. command transactions.
//!
//! The radio can either scan or hold one connection. [`Arbiter`] owns it and
//! moves between three modes:
//!
//! ```text
//! Idle ──start()──▶ Scanning ◀──────▶ Transacting
//!  ▲                   │    stop scan → connect → discover → write
//!  └─────stop()────────┘    → disconnect → restart scan
//! ```
//!
//! The first advertisement from a tracker triggers a `start` transaction;
//! that event's payload is discarded. Later advertisements are decoded into
//! the [`EntityStore`] and a fresh snapshot is published.
//!
//! Command delivery is at-most-once: no acknowledgment, no retry. A command
//! that collides with an in-flight transaction is dropped. Trackers
//! advertise continuously, so the next discovery is the retry.
//!
//! Synchronous and single-threaded: every radio call blocks (with its own
//! timeout) before the next event is read, so `stop()` can never interleave
//! with a transaction's cleanup.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::frame::TelemetryFrame;
use crate::geo::GeoPoint;
use crate::radio::{Command, DeviceId, Radio, RadioError, ScanEvent};
use crate::store::{EntityState, EntityStore};

/// Radio ownership state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Scanning,
    Transacting,
}

type SnapshotHook = Box<dyn FnMut(&[EntityState])>;

/// Latest-snapshot mailbox returned by [`Arbiter::subscribe`].
///
/// Holds at most one snapshot: each publish replaces whatever the reader has
/// not taken yet. Dropping every clone unsubscribes.
#[derive(Debug, Clone, Default)]
pub struct SnapshotReceiver {
    slot: Arc<Mutex<Option<Vec<EntityState>>>>,
}

impl SnapshotReceiver {
    /// Take the newest unread snapshot, if any.
    pub fn take(&self) -> Option<Vec<EntityState>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn put(&self, snapshot: Vec<EntityState>) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    fn is_orphaned(&self) -> bool {
        Arc::strong_count(&self.slot) == 1
    }
}

pub struct Arbiter<R: Radio> {
    radio: R,
    config: TrackerConfig,
    mode: Mode,
    store: EntityStore,
    /// Trackers that have been sent `start` this session.
    started: HashSet<DeviceId>,
    /// Latest connectable handle per tracker.
    peers: BTreeMap<DeviceId, R::Peer>,
    /// Whether the radio is actually scanning. Can lag `mode` after a
    /// failed restart; `poll` retries until it catches up.
    scan_active: bool,
    /// Single-flight guard. Unreachable through `&mut self` alone; it keeps
    /// the contract if a hook ever re-enters the arbiter.
    in_flight: bool,
    subscribers: Vec<SnapshotReceiver>,
    /// Called with every published snapshot.
    on_snapshot: Option<SnapshotHook>,
}

impl<R: Radio> Arbiter<R> {
    pub fn new(radio: R, config: TrackerConfig) -> Self {
        let store = EntityStore::new(config.trail_cap, config.history_cap);
        Self {
            radio,
            config,
            mode: Mode::Idle,
            store,
            started: HashSet::new(),
            peers: BTreeMap::new(),
            scan_active: false,
            in_flight: false,
            subscribers: Vec::new(),
            on_snapshot: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.mode != Mode::Idle
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn is_started(&self, id: &DeviceId) -> bool {
        self.started.contains(id)
    }

    /// Subscribe to published snapshots. Only the latest is kept.
    pub fn subscribe(&mut self) -> SnapshotReceiver {
        let rx = SnapshotReceiver::default();
        self.subscribers.push(rx.clone());
        rx
    }

    /// Install a callback invoked with each published snapshot.
    pub fn on_snapshot(&mut self, f: impl FnMut(&[EntityState]) + 'static) {
        self.on_snapshot = Some(Box::new(f));
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Begin a capture session. No-op if already running.
    ///
    /// Clears all entity state; trackers get a fresh `start` on first sight.
    pub fn start(&mut self) -> Result<(), RadioError> {
        if self.mode != Mode::Idle {
            return Ok(());
        }
        self.store.reset();
        self.started.clear();
        self.peers.clear();
        self.radio.start_scan()?;
        self.scan_active = true;
        self.mode = Mode::Scanning;
        info!("scanning");
        Ok(())
    }

    /// End the session: best-effort `stop` to every known tracker, halt
    /// scanning, publish an empty snapshot. No-op if idle.
    pub fn stop(&mut self) {
        if self.mode == Mode::Idle {
            return;
        }
        info!("stopping, {} tracker(s) known", self.peers.len());
        let peers: Vec<(DeviceId, R::Peer)> =
            self.peers.iter().map(|(id, p)| (id.clone(), p.clone())).collect();
        for (id, peer) in peers {
            // Failures already logged; nothing else to do with them.
            let _ = self.transact(&id, peer, Command::Stop, false);
        }
        self.halt_scan();
        self.mode = Mode::Idle;
        self.started.clear();
        self.peers.clear();
        self.store.reset();
        self.publish();
    }

    /// Wait up to the poll interval for one scan event and handle it.
    ///
    /// Returns `Ok(true)` if an event was handled. If an earlier scan
    /// restart failed, the scan is restarted first.
    pub fn poll(&mut self) -> Result<bool, RadioError> {
        if self.mode != Mode::Scanning {
            return Ok(false);
        }
        if !self.scan_active {
            self.radio.start_scan()?;
            self.scan_active = true;
            info!("scan resumed");
        }
        match self.radio.next_event(self.config.poll_interval())? {
            Some(event) => {
                self.handle_event(event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Start, then poll until `shutdown` is set, then stop.
    ///
    /// Scan errors are logged and the loop continues.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), RadioError> {
        self.start()?;
        while !shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.poll() {
                warn!("scan error: {e}");
                std::thread::sleep(self.config.poll_interval());
            }
        }
        self.stop();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// React to one scan result.
    pub fn handle_event(&mut self, event: ScanEvent<R::Peer>) {
        if self.mode != Mode::Scanning {
            debug!("{}: dropped, radio {:?}", event.id, self.mode);
            return;
        }
        let ScanEvent {
            id,
            peer,
            rssi,
            advertisement,
        } = event;
        self.peers.insert(id.clone(), peer.clone());

        if !self.started.contains(&id) {
            // Discovery event: command only, payload discarded.
            match self.transact(&id, peer, Command::Start, true) {
                Err(RadioError::Busy) => {}
                _ => {
                    self.started.insert(id);
                }
            }
            return;
        }

        let Some(payload) = advertisement.payload(self.config.manufacturer_id) else {
            debug!("{id}: no manufacturer data");
            return;
        };
        match TelemetryFrame::decode(payload, self.config.field_center) {
            Ok(frame) => {
                self.store.apply_telemetry(
                    &id,
                    advertisement.local_name.as_deref(),
                    &frame,
                    Some(rssi),
                    now_ms(),
                );
                self.publish();
            }
            Err(e) => debug!("{id}: {e}"),
        }
    }

    /// Apply a GPS fix obtained outside the advertisement stream.
    pub fn apply_fix(&mut self, id: &DeviceId, point: GeoPoint) -> bool {
        let applied = self.store.apply_fix(id, point, now_ms());
        if applied {
            self.publish();
        }
        applied
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Send `command` to a known tracker. Scanning resumes afterwards if it
    /// was active.
    pub fn send_command(&mut self, id: &DeviceId, command: Command) -> Result<(), RadioError> {
        let peer = self
            .peers
            .get(id)
            .cloned()
            .ok_or_else(|| RadioError::UnknownDevice(id.to_string()))?;
        let resume = self.mode == Mode::Scanning;
        self.transact(id, peer, command, resume)
    }

    /// One guarded transaction. Afterwards the radio is back to scanning
    /// (`resume`) or idle, whatever the outcome.
    fn transact(
        &mut self,
        id: &DeviceId,
        peer: R::Peer,
        command: Command,
        resume: bool,
    ) -> Result<(), RadioError> {
        if self.in_flight {
            warn!("{command} → {id} dropped: transaction in flight");
            return Err(RadioError::Busy);
        }
        self.in_flight = true;

        self.halt_scan();
        self.mode = Mode::Transacting;

        let result = self.deliver(&peer, command);
        match &result {
            Ok(()) => info!("{command} → {id}"),
            Err(e) => warn!("{command} → {id} failed: {e}"),
        }

        if resume {
            // The scan restarts from scratch; some stacks require it after a
            // connection. On failure `poll` retries.
            match self.radio.start_scan() {
                Ok(()) => self.scan_active = true,
                Err(e) => warn!("scan restart failed: {e}"),
            }
            self.mode = Mode::Scanning;
        } else {
            self.mode = Mode::Idle;
        }
        self.in_flight = false;
        result
    }

    fn halt_scan(&mut self) {
        if !self.scan_active {
            return;
        }
        self.scan_active = false;
        if let Err(e) = self.radio.stop_scan() {
            warn!("stop scan failed: {e}");
        }
    }

    /// connect → discover → write → disconnect. Disconnects whenever a
    /// connection was made.
    fn deliver(&mut self, peer: &R::Peer, command: Command) -> Result<(), RadioError> {
        let mut link = self.radio.connect(peer, self.config.connect_timeout())?;
        let written = match self.radio.discover(
            &mut link,
            &self.config.command_endpoint,
            self.config.discovery_timeout(),
        ) {
            Ok(()) => self
                .radio
                .write(&mut link, command.as_bytes(), self.config.write_timeout()),
            Err(e) => Err(e),
        };
        if let Err(e) = self.radio.disconnect(link) {
            debug!("disconnect failed: {e}");
        }
        written
    }

    fn publish(&mut self) {
        let snapshot = self.store.snapshot();
        if let Some(f) = self.on_snapshot.as_mut() {
            f(&snapshot);
        }
        self.subscribers.retain(|rx| !rx.is_orphaned());
        for rx in &self.subscribers {
            rx.put(snapshot.clone());
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

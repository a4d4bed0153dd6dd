//! Drive the arbiter against simulated trackers and print snapshots as JSON
//! lines.
//!
//! Usage: fieldtrack-sim [TRACKERS] [EVENTS] [CONFIG.json]
//!
//! Logging via RUST_LOG (e.g. `RUST_LOG=fieldtrack=debug`).

use std::process;

use fieldtrack::field::CanvasSize;
use fieldtrack::geo::{self, GeoPoint};
use fieldtrack::sim::{SimRadio, SyntheticTracker};
use fieldtrack::{Arbiter, Calibrator, EntityState, FieldMapper, TrackerConfig};
use serde::Serialize;

const CANVAS: CanvasSize = CanvasSize {
    width: 1000.0,
    height: 600.0,
};

/// Events between printed snapshots.
const REPORT_EVERY: usize = 25;

#[derive(Serialize)]
struct Dot<'a> {
    jersey: u32,
    name: &'a str,
    color: &'a str,
    battery: u8,
    speed_kmh: f64,
    intensity_30s: u8,
    intensity_5min: u8,
    trail_len: usize,
    x: Option<f64>,
    y: Option<f64>,
}

fn dots<'a>(snapshot: &'a [EntityState], mapper: &FieldMapper) -> Vec<Dot<'a>> {
    snapshot
        .iter()
        .map(|s| {
            let canvas = s.position.and_then(|p| mapper.project(p, CANVAS));
            Dot {
                jersey: s.entity.jersey,
                name: &s.entity.name,
                color: s.entity.color,
                battery: s.battery_percent,
                speed_kmh: s.speed_kmh,
                intensity_30s: s.intensity_30s(),
                intensity_5min: s.intensity_5min(),
                trail_len: s.trail.len(),
                x: canvas.map(|c| c.x),
                y: canvas.map(|c| c.y),
            }
        })
        .collect()
}

fn load_config(path: Option<&str>) -> Result<TrackerConfig, String> {
    match path {
        None => Ok(TrackerConfig::default()),
        Some(p) => {
            let text = std::fs::read_to_string(p).map_err(|e| format!("{p}: {e}"))?;
            TrackerConfig::from_json_str(&text).map_err(|e| format!("{p}: {e}"))
        }
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let count = args
        .first()
        .map_or(Ok(4), |s| s.parse::<usize>())
        .map_err(|e| format!("TRACKERS: {e}"))?;
    let events = args
        .get(1)
        .map_or(Ok(200), |s| s.parse::<usize>())
        .map_err(|e| format!("EVENTS: {e}"))?;
    let config = load_config(args.get(2).map(String::as_str))?;

    // Two-point calibration: center spot plus a sideline 27.5 m due south.
    let center = config.field_center;
    let sideline = GeoPoint::new(center.lat - 27.5 / geo::METERS_PER_DEG_LAT, center.lng);
    let mut calibrator = Calibrator::new().with_width_override(config.width_override_m);
    calibrator.begin_calibration();
    calibrator.set_center_fix(center);
    let cal = calibrator
        .capture_sideline_point(sideline)
        .map_err(|e| e.to_string())?;
    eprintln!(
        "calibrated: {:.1} m × {:.1} m, bearing {:.1}°",
        cal.length_m(),
        cal.width_m(),
        cal.bearing_rad().to_degrees(),
    );
    let mapper = calibrator.mapper(config.fallback_bounds);

    let trackers = (0..count)
        .map(|i| {
            SyntheticTracker::new(
                &format!("sim:{i:02}"),
                &format!("Sim {}", i + 1),
                center,
                10.0 + 4.0 * i as f64,
                i as f64,
            )
        })
        .collect();
    let radio = SimRadio::new(config.manufacturer_id).with_trackers(trackers);
    let mut arbiter = Arbiter::new(radio, config);
    let rx = arbiter.subscribe();

    arbiter.start().map_err(|e| e.to_string())?;
    for n in 1..=events {
        if let Err(e) = arbiter.poll() {
            eprintln!("  ... {e}");
        }
        if n % REPORT_EVERY == 0
            && let Some(snapshot) = rx.take()
        {
            let line =
                serde_json::to_string(&dots(&snapshot, &mapper)).map_err(|e| e.to_string())?;
            println!("{line}");
        }
    }
    arbiter.stop();
    eprintln!("stopped after {events} events");
    Ok(())
}

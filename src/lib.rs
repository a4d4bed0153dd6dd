pub mod arbiter;
pub mod codec;
pub mod config;
pub mod error;
pub mod field;
pub mod frame;
pub mod geo;
pub mod radio;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod store;

pub use arbiter::{Arbiter, Mode, SnapshotReceiver};
pub use config::TrackerConfig;
pub use error::FrameError;
pub use field::{CalibrationError, Calibrator, FieldCalibration, FieldMapper, SurfacePoint};
pub use frame::{StatusFlags, TelemetryFrame};
pub use geo::GeoPoint;
pub use radio::{Advertisement, Command, DeviceId, Radio, RadioError, ScanEvent};
pub use store::{Entity, EntityState, EntityStore};

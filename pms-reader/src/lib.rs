pub mod config;
pub mod sensor;
pub mod state;
pub mod transport;

pub use config::{Config, FlowControl, SensorConfig, SerialConfig};
pub use sensor::PmsSensor;
pub use state::{Reading, SensorState};
pub use transport::TransportError;

pub use pms_core::{Command, FrameStatus, MeasurementRecord, OperatingMode};
pub use tokio_util::sync::CancellationToken;

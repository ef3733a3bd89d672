use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::ensure;
use pms_core::OperatingMode;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub sensor: SensorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Path of the serial device the sensor is attached to
    pub device: PathBuf,
    pub baud_rate: u32,
    pub flow_control: FlowControl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Reporting mode to put the sensor in at startup
    pub mode: OperatingMode,
    /// How long to wait for a fresh frame before giving up
    pub poll_timeout_ms: u64,
    /// Interval in seconds between read requests in passive mode
    pub request_interval_secs: u64,
    /// Size of the buffer used for each read from the device
    pub read_buffer_size: usize,
}

impl SensorConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_secs(self.request_interval_secs)
    }
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> color_eyre::Result<()> {
        ensure!(
            self.sensor.request_interval_secs > 0,
            "sensor.request_interval_secs must be at least 1"
        );
        ensure!(
            self.sensor.read_buffer_size > 0,
            "sensor.read_buffer_size must be at least 1"
        );
        Ok(())
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyUSB0"),
            baud_rate: 9600,
            flow_control: FlowControl::None,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Active,
            poll_timeout_ms: 2000,
            request_interval_secs: 5,
            read_buffer_size: 256,
        }
    }
}

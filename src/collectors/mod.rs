//! Data sources feeding the sensors
//!
//! Sensors only see the [`IpmiSource`] and [`SnapshotSource`] traits; the
//! concrete `ipmitool` and REST implementations live beside them.

/// Enclosure management REST API client
pub mod enclosure_api;

/// Parsers for `ipmitool` text output
pub mod ipmi_parser;

/// `ipmitool` subprocess runner
pub mod ipmitool;

use crate::error::CollectorError;

pub use enclosure_api::EnclosureApiClient;
pub use ipmi_parser::SensorProps;
pub use ipmitool::IpmiTool;

/// Access to the baseboard management controller
#[cfg_attr(test, mockall::automock)]
pub trait IpmiSource: Send {
    /// Full current `sel list` output
    fn sel_list(&self) -> Result<String, CollectorError>;

    /// `sel info` output (usage statistics)
    fn sel_info(&self) -> Result<String, CollectorError>;

    /// Erase the SEL at the source
    fn sel_clear(&self) -> Result<(), CollectorError>;

    /// `sdr type '<device_type>'` listing
    fn sdr_type(&self, device_type: &str) -> Result<String, CollectorError>;

    /// `sensor get '<sensor_id>'` output
    fn sensor_get(&self, sensor_id: &str) -> Result<String, CollectorError>;

    /// `sdr get '<sensor_id>'` output
    fn sdr_get(&self, sensor_id: &str) -> Result<String, CollectorError>;
}

/// Access to polled resource status records
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotSource: Send {
    /// Fetch `path` and return the records stored under `key`
    fn fetch(&self, path: &str, key: &str) -> Result<Vec<serde_json::Value>, CollectorError>;

    /// Whether the source only listens on the loopback interface
    fn is_local(&self) -> bool {
        false
    }
}

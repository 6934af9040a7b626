/// Error types for collectors, state stores, sinks and configuration
pub mod error;

/// Log entries, FRU status records and alert records
pub mod events;

/// Configuration management
pub mod config;

/// Crash-safe persisted cursors, buffers and fault maps
pub mod state;

/// ipmitool and enclosure REST data sources
pub mod collectors;

/// Incremental System Event Log tailing
pub mod sel;

/// Enclosure FRU snapshot diffing
pub mod fru;

/// Alert assembly, severity classification and delivery
pub mod alerts;

/// Fixed-delay sensor threads
pub mod scheduler;

// Re-export commonly used types
pub use error::{AlertError, CollectorError, ConfigError, SensorError, StateError};
pub use scheduler::{PollOutcome, Sensor, SensorScheduler};

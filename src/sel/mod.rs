//! Incremental System Event Log tailing
//!
//! Each cycle fetches the whole `sel list` into a persisted pending buffer,
//! locates the persisted cursor in it, dispatches every entry after the
//! cursor to its device handler and finally commits the cursor and empties
//! the buffer. A buffer found non-empty at the start of a cycle is the
//! leftover of a crashed cycle and is reprocessed before anything new is
//! fetched.

pub mod handlers;
pub mod log_tailer;
pub mod sensor;
pub mod usage;

pub use handlers::{DeviceType, SensorNumberMap};
pub use log_tailer::{TailPlan, UnseenEntry};
pub use sensor::SelSensor;
pub use usage::SelUsageMonitor;

//! Crash-safe on-disk state shared by the sensors
//!
//! Every write goes to a temporary file in the target directory and is then
//! renamed over the destination, so a crash leaves either the previous or
//! the new contents on disk, never a mix.

pub mod fault_map;
pub mod sel_state;
mod state_file;

pub use fault_map::{FaultMap, FaultMapStore, FaultRecord};
pub use sel_state::SelStateStore;

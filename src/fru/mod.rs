//! Snapshot diffing for enclosure FRUs
//!
//! Every poll fetches the full status list of one FRU kind and compares it
//! against the persisted map of resources last seen unhealthy.

pub mod differ;
pub mod sensor;

pub use crate::config::FruKind;
pub use differ::apply_status;
pub use sensor::FruSensor;

impl FruKind {
    pub const ALL: [FruKind; 4] = [
        FruKind::Controller,
        FruKind::Psu,
        FruKind::Fan,
        FruKind::Disk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FruKind::Controller => "controller",
            FruKind::Psu => "psu",
            FruKind::Fan => "fan",
            FruKind::Disk => "disk",
        }
    }

    /// Management API endpoint listing this kind
    pub fn api_path(&self) -> &'static str {
        match self {
            FruKind::Controller => "/api/show/controllers",
            FruKind::Psu => "/api/show/power-supplies",
            FruKind::Fan => "/api/show/fan-modules",
            FruKind::Disk => "/api/show/disks",
        }
    }

    /// Key of the record list in the API response
    pub fn response_key(&self) -> &'static str {
        match self {
            FruKind::Controller => "controllers",
            FruKind::Psu => "power-supplies",
            FruKind::Fan => "fan-modules",
            FruKind::Disk => "drives",
        }
    }

    pub fn resource_type(&self) -> &'static str {
        match self {
            FruKind::Controller => "enclosure:fru:controller",
            FruKind::Psu => "enclosure:fru:psu",
            FruKind::Fan => "enclosure:fru:fan",
            FruKind::Disk => "enclosure:fru:disk",
        }
    }

    /// Cache directory name under `<data_path>/encl/frus`
    pub fn cache_dir(&self) -> &'static str {
        match self {
            FruKind::Controller => "controllers",
            FruKind::Psu => "psus",
            FruKind::Fan => "fans",
            FruKind::Disk => "disks",
        }
    }

    /// File holding this kind's fault map
    pub fn fault_map_file(&self) -> &'static str {
        match self {
            FruKind::Controller => "controllerdata.json",
            FruKind::Psu => "psudata.json",
            FruKind::Fan => "fandata.json",
            FruKind::Disk => "diskdata.json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_kinds_have_independent_state() {
        let files: HashSet<_> = FruKind::ALL.iter().map(|k| k.fault_map_file()).collect();
        let dirs: HashSet<_> = FruKind::ALL.iter().map(|k| k.cache_dir()).collect();
        assert_eq!(files.len(), 4);
        assert_eq!(dirs.len(), 4);
    }

    #[test]
    fn test_disk_endpoint() {
        assert_eq!(FruKind::Disk.api_path(), "/api/show/disks");
        assert_eq!(FruKind::Disk.response_key(), "drives");
        assert_eq!(FruKind::Disk.resource_type(), "enclosure:fru:disk");
    }
}

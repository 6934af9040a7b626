use crate::error::StateError;
use crate::events::{AlertType, Health};
use crate::state::state_file::{ensure_dir, read_optional, write_atomic};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Last known unhealthy state of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub resource_id: String,
    pub health: Health,
    pub alert_type: AlertType,
}

/// Resources currently believed to be unhealthy, keyed by durable id
///
/// A resource is present if and only if its last observed health was not ok.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaultMap {
    records: BTreeMap<String, FaultRecord>,
}

impl FaultMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource_id: &str) -> Option<&FaultRecord> {
        self.records.get(resource_id)
    }

    pub fn contains(&self, resource_id: &str) -> bool {
        self.records.contains_key(resource_id)
    }

    pub fn insert(&mut self, record: FaultRecord) -> Option<FaultRecord> {
        self.records.insert(record.resource_id.clone(), record)
    }

    pub fn remove(&mut self, resource_id: &str) -> Option<FaultRecord> {
        self.records.remove(resource_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FaultRecord> {
        self.records.values()
    }
}

/// JSON file holding one category's [`FaultMap`]
#[derive(Debug)]
pub struct FaultMapStore {
    path: PathBuf,
}

impl FaultMapStore {
    /// Open the store at `dir/file_name`, writing an empty map if none exists yet
    pub fn open(dir: &Path, file_name: &str) -> Result<Self, StateError> {
        ensure_dir(dir)?;
        let store = Self {
            path: dir.join(file_name),
        };
        let missing = read_optional(&store.path)?.map_or(true, |t| t.trim().is_empty());
        if missing {
            info!("Initialising empty fault map at {}", store.path.display());
            store.save(&FaultMap::new())?;
        }
        Ok(store)
    }

    /// Load the persisted map
    ///
    /// An undecodable file is replaced by an empty map: the next poll then
    /// re-alerts on every unhealthy resource rather than staying silent.
    pub fn load(&self) -> Result<FaultMap, StateError> {
        let text = read_optional(&self.path)?.unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(FaultMap::new());
        }
        match serde_json::from_str(&text) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(
                    "Discarding unreadable fault map {}: {}",
                    self.path.display(),
                    e
                );
                let map = FaultMap::new();
                self.save(&map)?;
                Ok(map)
            }
        }
    }

    /// Durably replace the persisted map
    pub fn save(&self, map: &FaultMap) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(map)?;
        write_atomic(&self.path, &bytes)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

use crate::alerts::alert_factory::now_event_time;
use crate::alerts::{severity, AlertDispatcher, AlertDraft, AlertFactory};
use crate::collectors::SnapshotSource;
use crate::config::FruKind;
use crate::error::{CollectorError, SensorError};
use crate::events::{AlertOrigin, AlertType, Attributes, FruStatus};
use crate::fru::differ::apply_status;
use crate::scheduler::{PollOutcome, Sensor};
use crate::state::{FaultMap, FaultMapStore};
use log::{debug, error, info, warn};
use std::path::Path;

/// Polls one FRU kind from the enclosure API and alerts on health transitions
pub struct FruSensor {
    kind: FruKind,
    name: String,
    source: Box<dyn SnapshotSource>,
    store: FaultMapStore,
    faults: FaultMap,
    factory: AlertFactory,
    dispatcher: AlertDispatcher,
}

impl FruSensor {
    /// Open the fault map under `cache_dir`; fails if it cannot be created
    pub fn new(
        kind: FruKind,
        source: Box<dyn SnapshotSource>,
        cache_dir: &Path,
        factory: AlertFactory,
        dispatcher: AlertDispatcher,
    ) -> Result<Self, SensorError> {
        let store = FaultMapStore::open(cache_dir, kind.fault_map_file())?;
        let faults = store.load()?;
        info!(
            "Loaded {} tracked {} faults from {}",
            faults.len(),
            kind.as_str(),
            store.path().display()
        );

        Ok(Self {
            kind,
            name: format!("{}_fru", kind.as_str()),
            source,
            store,
            faults,
            factory,
            dispatcher,
        })
    }

    pub fn faults(&self) -> &FaultMap {
        &self.faults
    }

    fn fetch(&self) -> Result<Vec<FruStatus>, CollectorError> {
        let records = self
            .source
            .fetch(self.kind.api_path(), self.kind.response_key())?;

        Ok(records
            .iter()
            .filter_map(|record| match FruStatus::from_json(record) {
                Ok(status) => Some(status),
                Err(e) => {
                    debug!("{}: skipping record: {}", self.name, e);
                    None
                }
            })
            .collect())
    }

    fn handle_transition(&self, status: &FruStatus, alert_type: AlertType) {
        info!(
            "{}: {} {} (health {}, status {})",
            self.name, status.resource_id, alert_type, status.health, status.status
        );
        let draft = AlertDraft {
            origin: AlertOrigin::EnclosureAlert,
            resource_type: self.kind.resource_type().to_string(),
            resource_id: status.resource_id.clone(),
            alert_type,
            severity: severity::classify(alert_type),
            event_time: now_event_time(),
            specific_info: status.attributes.clone(),
            dynamic_info: Attributes::new(),
            terminal: true,
        };
        let alert = self.factory.assemble(draft);
        self.dispatcher.deliver(&alert);
    }
}

impl Sensor for FruSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self) -> PollOutcome {
        let snapshot = match self.fetch() {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_terminal() => {
                error!("{}: {}. Shutting down sensor", self.name, e);
                return PollOutcome::Shutdown;
            }
            Err(e @ CollectorError::HttpStatus { .. }) if self.source.is_local() => {
                debug!("{}: {}", self.name, e);
                return PollOutcome::Continue;
            }
            Err(e) => {
                error!("{}: failed to fetch {} status: {}", self.name, self.kind.as_str(), e);
                return PollOutcome::Continue;
            }
        };

        for status in &snapshot {
            let Some(alert_type) = apply_status(&mut self.faults, status) else {
                continue;
            };
            self.handle_transition(status, alert_type);
            if let Err(e) = self.store.save(&self.faults) {
                warn!(
                    "{}: failed to persist fault map {}: {}",
                    self.name,
                    self.store.path().display(),
                    e
                );
            }
        }
        PollOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertContext, ChannelSink};
    use crate::collectors::MockSnapshotSource;
    use crate::events::{AlertRecord, Health, Severity};
    use crate::state::FaultRecord;
    use serde_json::{json, Value};
    use std::sync::mpsc::{self, Receiver};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn context() -> AlertContext {
        AlertContext {
            site_id: 1,
            rack_id: 2,
            node_id: 3,
            cluster_id: 4,
            host_id: "encl-1".into(),
        }
    }

    /// A source whose response can be swapped between polls
    fn scripted(responses: Arc<Mutex<Vec<Value>>>) -> MockSnapshotSource {
        let mut source = MockSnapshotSource::new();
        source
            .expect_fetch()
            .withf(|path: &str, key: &str| path == "/api/show/controllers" && key == "controllers")
            .returning(move |_, _| Ok(responses.lock().unwrap().clone()));
        source.expect_is_local().return_const(true);
        source
    }

    fn sensor(source: MockSnapshotSource, dir: &Path) -> (FruSensor, Receiver<AlertRecord>) {
        let (tx, rx) = mpsc::channel();
        let dispatcher = AlertDispatcher::new(Arc::new(ChannelSink::new(tx)));
        let sensor = FruSensor::new(
            FruKind::Controller,
            Box::new(source),
            dir,
            AlertFactory::new(context()),
            dispatcher,
        )
        .unwrap();
        (sensor, rx)
    }

    fn controller(health: &str, status: &str) -> Value {
        json!({
            "durable-id": "0",
            "health": health,
            "status": status,
            "serial-number": "DHSIFTJ-18253C638B",
        })
    }

    #[test]
    fn test_missing_then_reinserted() {
        let dir = TempDir::new().unwrap();
        let responses = Arc::new(Mutex::new(vec![controller("Fault", "Not Installed")]));
        let (mut sensor, rx) = sensor(scripted(Arc::clone(&responses)), dir.path());

        assert_eq!(sensor.poll(), PollOutcome::Continue);
        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.alert_type, AlertType::Missing);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.info.resource_type, "enclosure:fru:controller");
        assert_eq!(alert.specific_info["serial-number"], "DHSIFTJ-18253C638B");
        let envelope = alert.to_envelope();
        assert_eq!(
            envelope["sensor_request_type"]["enclosure_alert"]["status"],
            "update"
        );

        *responses.lock().unwrap() = vec![controller("OK", "Operational")];
        sensor.poll();
        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.alert_type, AlertType::Insertion);
        assert!(sensor.faults().is_empty());
    }

    #[test]
    fn test_fault_map_persisted_after_each_transition() {
        let dir = TempDir::new().unwrap();
        let responses = Arc::new(Mutex::new(vec![controller("Degraded", "Operational")]));
        let (mut sensor, rx) = sensor(scripted(Arc::clone(&responses)), dir.path());

        sensor.poll();
        assert_eq!(rx.try_iter().count(), 1);

        let reopened = FaultMapStore::open(dir.path(), "controllerdata.json").unwrap();
        assert_eq!(
            reopened.load().unwrap().get("0"),
            Some(&FaultRecord {
                resource_id: "0".into(),
                health: Health::Degraded,
                alert_type: AlertType::Fault,
            })
        );

        // Unchanged health on the next poll is silent
        sensor.poll();
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_restart_keeps_previous_faults() {
        let dir = TempDir::new().unwrap();
        let responses = Arc::new(Mutex::new(vec![controller("Fault", "Operational")]));
        {
            let (mut sensor, rx) = sensor(scripted(Arc::clone(&responses)), dir.path());
            sensor.poll();
            assert_eq!(rx.try_iter().count(), 1);
        }

        let (mut restarted, rx) = sensor(scripted(Arc::clone(&responses)), dir.path());
        restarted.poll();
        assert_eq!(rx.try_iter().count(), 0);

        *responses.lock().unwrap() = vec![controller("OK", "Operational")];
        restarted.poll();
        assert_eq!(rx.try_recv().unwrap().alert_type, AlertType::FaultResolved);
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let dir = TempDir::new().unwrap();
        let responses = Arc::new(Mutex::new(vec![
            json!({"durable-id": "1", "health": "N/A", "status": "Operational"}),
            json!("garbage"),
            controller("Fault", "Operational"),
        ]));
        let (mut sensor, rx) = sensor(scripted(responses), dir.path());

        sensor.poll();
        let alerts: Vec<AlertRecord> = rx.try_iter().collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].info.resource_id, "0");
    }

    #[test]
    fn test_transport_failure_keeps_state_and_continues() {
        let dir = TempDir::new().unwrap();
        let mut source = MockSnapshotSource::new();
        source.expect_fetch().returning(|path, _| {
            Err(CollectorError::HttpStatus {
                url: format!("http://10.0.0.2{}", path),
                status: 503,
            })
        });
        source.expect_is_local().return_const(false);
        let (mut sensor, rx) = sensor(source, dir.path());

        assert_eq!(sensor.poll(), PollOutcome::Continue);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_unreachable_local_api_shuts_down() {
        let dir = TempDir::new().unwrap();
        let mut source = MockSnapshotSource::new();
        source
            .expect_fetch()
            .returning(|_, _| Err(CollectorError::DependencyMissing("connection refused".into())));
        source.expect_is_local().return_const(true);
        let (mut sensor, _rx) = sensor(source, dir.path());

        assert_eq!(sensor.poll(), PollOutcome::Shutdown);
    }

    #[test]
    fn test_save_failure_keeps_in_memory_faults() {
        let dir = TempDir::new().unwrap();
        let responses = Arc::new(Mutex::new(vec![controller("Fault", "Operational")]));
        let (mut sensor, rx) = sensor(scripted(Arc::clone(&responses)), dir.path());

        // A non-empty directory in place of the map file makes every save fail
        let map_path = sensor.store.path().to_path_buf();
        std::fs::remove_file(&map_path).unwrap();
        std::fs::create_dir(&map_path).unwrap();
        std::fs::write(map_path.join("lock"), "").unwrap();

        assert_eq!(sensor.poll(), PollOutcome::Continue);
        assert_eq!(rx.try_iter().count(), 1);
        assert!(sensor.faults().contains("0"));

        assert_eq!(sensor.poll(), PollOutcome::Continue);
        assert_eq!(rx.try_iter().count(), 0);

        *responses.lock().unwrap() = vec![controller("OK", "Operational")];
        sensor.poll();
        assert_eq!(rx.try_recv().unwrap().alert_type, AlertType::FaultResolved);
    }
}

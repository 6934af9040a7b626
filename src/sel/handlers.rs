//! Per-device-type handling of SEL entries
//!
//! The set of device types is closed. Each variant owns a static lookup from
//! `(event, status)` to alert type and severity; an unlisted pair is a
//! classification miss and produces no alert.

use crate::alerts::alert_factory::{sel_event_time, AlertDraft};
use crate::alerts::severity;
use crate::collectors::ipmi_parser::{parse_sdr_get, parse_sdr_listing, parse_sensor_get};
use crate::collectors::{IpmiSource, SensorProps};
use crate::error::CollectorError;
use crate::events::{
    AlertOrigin, AlertType, AssertionStatus, Attributes, LogEntry, Severity, ThresholdDirection,
};
use log::{debug, error, warn};
use std::collections::HashMap;

use AlertType::{Fault, FaultResolved, Insertion, Missing};
use AssertionStatus::{Asserted, Deasserted};
use Severity::{Critical, Informational, Warning};

type EventTable = &'static [(&'static str, AssertionStatus, AlertType, Severity)];

const PSU_SUPPLY_EVENTS: EventTable = &[
    ("Config Error", Asserted, Fault, Severity::Error),
    ("Config Error", Deasserted, FaultResolved, Informational),
    ("Failure detected ()", Asserted, Fault, Severity::Error),
    ("Failure detected ()", Deasserted, FaultResolved, Informational),
    ("Failure detected", Asserted, Fault, Severity::Error),
    ("Failure detected", Deasserted, FaultResolved, Informational),
    ("Power Supply AC lost", Asserted, Fault, Critical),
    ("Power Supply AC lost", Deasserted, FaultResolved, Informational),
    ("Power Supply Inactive", Asserted, Fault, Critical),
    ("Power Supply Inactive", Deasserted, FaultResolved, Informational),
    ("Predictive failure", Asserted, Fault, Warning),
    ("Predictive failure", Deasserted, FaultResolved, Informational),
    ("Presence detected", Asserted, Insertion, Informational),
    ("Presence detected", Deasserted, Missing, Critical),
];

const PSU_UNIT_EVENTS: EventTable = &[
    ("240VA power down", Asserted, Fault, Critical),
    ("240VV power down", Deasserted, FaultResolved, Informational),
    ("AC lost", Asserted, Fault, Critical),
    ("AC lost", Deasserted, FaultResolved, Informational),
    ("Failure detected", Asserted, Fault, Critical),
    ("Failure detected", Deasserted, FaultResolved, Informational),
    ("Power off/down", Asserted, Fault, Critical),
    ("Power off/down", Deasserted, FaultResolved, Informational),
    ("Soft-power control failure", Asserted, Fault, Warning),
    ("Soft-power control failure", Deasserted, FaultResolved, Informational),
    ("Fully Redundant", Asserted, FaultResolved, Informational),
    ("Fully Redundant", Deasserted, Fault, Warning),
    ("Non-Redundant: Insufficient Resources", Asserted, Fault, Critical),
    ("Non-Redundant: Insufficient Resources", Deasserted, FaultResolved, Informational),
    ("Non-Redundant: Sufficient from Insufficient", Asserted, Fault, Warning),
    ("Non-Redundant: Sufficient from Insufficient", Deasserted, Fault, Warning),
    ("Non-Redundant: Sufficient from Redundant", Asserted, Fault, Warning),
    ("Non-Redundant: Sufficient from Redundant", Deasserted, Fault, Informational),
    ("Redundancy Degraded", Asserted, Fault, Warning),
    ("Redundancy Degraded", Deasserted, FaultResolved, Informational),
    ("Redundancy Degraded from Fully Redundant", Asserted, Fault, Warning),
    ("Redundancy Degraded from Fully Redundant", Deasserted, FaultResolved, Warning),
    ("Redundancy Degraded from Non-Redundant", Asserted, Fault, Critical),
    ("Redundancy Degraded from Non-Redundant", Deasserted, FaultResolved, Warning),
    ("Redundancy Lost", Asserted, Fault, Warning),
    ("Redundancy Lost", Deasserted, FaultResolved, Informational),
];

const DISK_EVENTS: EventTable = &[
    ("Drive Present", Asserted, Insertion, Informational),
    ("Drive Present", Deasserted, Missing, Critical),
];

/// Threshold keys a fan alert keeps from the sensor's static properties
const FAN_THRESHOLD_KEYS: [&str; 5] = [
    "Lower Non-Recoverable",
    "Upper Non-Recoverable",
    "Lower Critical",
    "Lower Non-Critical",
    "Upper Critical",
];

const NOT_AVAILABLE: &str = "N/A";
const SENSOR_TYPE_DISCRETE: &str = "Sensor Type (Discrete)";

/// Which ipmitool subcommand describes a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropsCommand {
    SensorGet,
    SdrGet,
}

/// Device types this agent raises alerts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Fan,
    PowerSupply,
    PowerUnit,
    DriveSlot,
}

impl DeviceType {
    pub const ALL: [DeviceType; 4] = [
        DeviceType::Fan,
        DeviceType::PowerSupply,
        DeviceType::PowerUnit,
        DeviceType::DriveSlot,
    ];

    /// Name as printed in SEL device labels and accepted by `sdr type`
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Fan => "Fan",
            DeviceType::PowerSupply => "Power Supply",
            DeviceType::PowerUnit => "Power Unit",
            DeviceType::DriveSlot => "Drive Slot / Bay",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == text)
    }

    pub fn resource_type(&self) -> &'static str {
        match self {
            DeviceType::Fan => "node:fru:fan",
            DeviceType::PowerSupply | DeviceType::PowerUnit => "node:fru:psu",
            DeviceType::DriveSlot => "node:fru:disk",
        }
    }

    fn props_command(&self) -> PropsCommand {
        match self {
            DeviceType::Fan | DeviceType::DriveSlot => PropsCommand::SensorGet,
            DeviceType::PowerSupply | DeviceType::PowerUnit => PropsCommand::SdrGet,
        }
    }

    fn event_table(&self) -> EventTable {
        match self {
            DeviceType::Fan => &[],
            DeviceType::PowerSupply => PSU_SUPPLY_EVENTS,
            DeviceType::PowerUnit => PSU_UNIT_EVENTS,
            DeviceType::DriveSlot => DISK_EVENTS,
        }
    }

    /// Alert type and severity for an entry, or `None` on a classification miss
    pub fn classify(
        &self,
        description: &str,
        status: AssertionStatus,
    ) -> Option<(AlertType, Severity)> {
        if *self == DeviceType::Fan {
            let alert_type = threshold_alert(description)?;
            return Some((alert_type, severity::classify(alert_type)));
        }
        self.event_table()
            .iter()
            .find(|(event, s, _, _)| *event == description && *s == status)
            .map(|(_, _, alert_type, severity)| (*alert_type, *severity))
    }
}

/// Map `Lower Critical going low` style events to a threshold breach
fn threshold_alert(description: &str) -> Option<AlertType> {
    let words: Vec<String> = description
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    match words.as_slice() {
        [bound, level, "going", direction]
            if matches!(*bound, "lower" | "upper")
                && matches!(*level, "non-critical" | "critical" | "non-recoverable") =>
        {
            match *direction {
                "low" => Some(AlertType::ThresholdBreached(ThresholdDirection::Low)),
                "high" => Some(AlertType::ThresholdBreached(ThresholdDirection::High)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Sensor number to sensor id, per device type
///
/// SEL entries only carry the number (`Fan #0x30`); ipmitool's property
/// commands need the sensor id.
#[derive(Debug, Clone, Default)]
pub struct SensorNumberMap {
    sensors: HashMap<DeviceType, HashMap<String, String>>,
}

impl SensorNumberMap {
    /// Build the map from `sdr type` listings of every device type
    ///
    /// A failed listing leaves that type empty; a missing ipmitool is fatal.
    pub fn load(source: &dyn IpmiSource) -> Result<Self, CollectorError> {
        let mut map = Self::default();
        for device in DeviceType::ALL {
            match source.sdr_type(device.as_str()) {
                Ok(listing) => {
                    for (sensor_id, number) in parse_sdr_listing(&listing) {
                        map.insert(device, &number, &sensor_id);
                    }
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => error!("Failed to list {} sensors: {}", device.as_str(), e),
            }
        }
        debug!("Sensor number map: {:?}", map.sensors);
        Ok(map)
    }

    pub fn insert(&mut self, device: DeviceType, number: &str, sensor_id: &str) {
        self.sensors
            .entry(device)
            .or_default()
            .insert(number.to_ascii_lowercase(), sensor_id.to_string());
    }

    pub fn sensor_id(&self, device: DeviceType, number: &str) -> Option<&str> {
        self.sensors
            .get(&device)
            .and_then(|numbers| numbers.get(number))
            .map(String::as_str)
    }
}

/// Turn one SEL entry into an alert draft
///
/// Returns `Ok(None)` for entries that yield no alert: unknown sensors and
/// classification misses. Only a missing ipmitool is an error.
pub fn build_draft(
    device: DeviceType,
    entry: &LogEntry,
    sensor_id: &str,
    terminal: bool,
    source: &dyn IpmiSource,
) -> Result<Option<AlertDraft>, CollectorError> {
    let Some((alert_type, severity)) = device.classify(&entry.description, entry.status) else {
        warn!(
            "Unknown {} event: {}, status: {}",
            device.as_str(),
            entry.description,
            entry.status.as_str()
        );
        return Ok(None);
    };

    let props = sensor_props(device, sensor_id, source)?;
    let mut specific_info = Attributes::new();

    let (resource_id, event) = match device {
        DeviceType::Fan => {
            for key in FAN_THRESHOLD_KEYS {
                if let Some(value) = props.static_props.get(key) {
                    specific_info.insert(key.to_string(), value.clone());
                }
            }
            (sensor_id.to_string(), entry.description.clone())
        }
        DeviceType::PowerSupply | DeviceType::PowerUnit => {
            specific_info.extend(props.static_props.clone());
            if let Some(id) = &props.sensor_id {
                specific_info.insert(SensorProps::SENSOR_ID.to_string(), id.clone());
            }
            if let Some(entity) = &props.entity_id {
                specific_info.insert(SensorProps::ENTITY_ID.to_string(), entity.clone());
            }
            (entry.device_label.clone(), entry.description.clone())
        }
        DeviceType::DriveSlot => {
            if props.is_empty() {
                specific_info.insert(
                    SensorProps::STATES_ASSERTED.to_string(),
                    NOT_AVAILABLE.to_string(),
                );
                specific_info.insert(SENSOR_TYPE_DISCRETE.to_string(), NOT_AVAILABLE.to_string());
            } else {
                specific_info.extend(props.static_props.clone());
            }
            (
                entry.device_label.clone(),
                format!("{} - {}", entry.description, entry.status.as_str()),
            )
        }
    };
    specific_info.insert("fru_id".to_string(), entry.device_label.clone());
    specific_info.insert("event".to_string(), event);

    Ok(Some(AlertDraft {
        origin: AlertOrigin::NodeData,
        resource_type: device.resource_type().to_string(),
        resource_id,
        alert_type,
        severity,
        event_time: sel_event_time(&entry.date, &entry.time),
        specific_info,
        dynamic_info: props.dynamic(),
        terminal,
    }))
}

/// Fetch sensor properties; transient failures degrade to empty properties
fn sensor_props(
    device: DeviceType,
    sensor_id: &str,
    source: &dyn IpmiSource,
) -> Result<SensorProps, CollectorError> {
    let result = match device.props_command() {
        PropsCommand::SensorGet => source.sensor_get(sensor_id).map(|text| parse_sensor_get(&text)),
        PropsCommand::SdrGet => source.sdr_get(sensor_id).map(|text| parse_sdr_get(&text)),
    };
    match result {
        Ok(props) => Ok(props),
        Err(e) if e.is_terminal() => Err(e),
        Err(e) => {
            warn!("Failed to read properties of sensor {:?}: {}", sensor_id, e);
            Ok(SensorProps::default())
        }
    }
}

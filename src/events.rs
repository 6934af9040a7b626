//! Core record types shared by the log tailer, the snapshot differ and the
//! alert factory.

use crate::error::CollectorError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Open-ended vendor attributes, ordered by key
pub type Attributes = BTreeMap<String, String>;

/// Assertion state of a System Event Log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssertionStatus {
    Asserted,
    Deasserted,
}

impl AssertionStatus {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "Asserted" => Some(AssertionStatus::Asserted),
            "Deasserted" => Some(AssertionStatus::Deasserted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssertionStatus::Asserted => "Asserted",
            AssertionStatus::Deasserted => "Deasserted",
        }
    }
}

/// One parsed line of `ipmitool sel list`
///
/// Sample line:
/// `2 | 04/16/2019 | 05:29:09 | Fan #0x30 | Lower Non-critical going low  | Asserted`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// Log-local record number, printed in hex by the BMC
    pub index: u64,
    pub date: String,
    pub time: String,
    /// Full device label, e.g. `Fan #0x30`
    pub device_label: String,
    /// Device type part of the label, e.g. `Fan`
    pub device_type: String,
    /// Lowercase hex sensor number from the `#0x..` suffix, if any
    pub device_number: Option<String>,
    pub description: String,
    pub status: AssertionStatus,
}

impl LogEntry {
    /// Parse a single pipe-delimited SEL record
    ///
    /// Trailing fields beyond the sixth (some BMCs append reading details)
    /// are ignored.
    pub fn from_sel_line(line: &str) -> Result<Self, CollectorError> {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 6 {
            return Err(CollectorError::ParseError(format!(
                "expected 6 fields in SEL line, got {}: {:?}",
                fields.len(),
                line
            )));
        }

        let index = parse_hex_index(fields[0]).ok_or_else(|| {
            CollectorError::ParseError(format!("invalid SEL index {:?}", fields[0]))
        })?;
        let status = AssertionStatus::parse(fields[5]).ok_or_else(|| {
            CollectorError::ParseError(format!("invalid SEL status {:?}", fields[5]))
        })?;
        let (device_type, device_number) = split_device_label(fields[3]);

        Ok(Self {
            index,
            date: fields[1].to_string(),
            time: fields[2].to_string(),
            device_label: fields[3].to_string(),
            device_type,
            device_number,
            description: fields[4].to_string(),
            status,
        })
    }
}

/// Parse the leading index field of a SEL line (hex without `0x`)
pub fn parse_hex_index(field: &str) -> Option<u64> {
    let field = field.trim();
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Split `Fan #0x30` into (`Fan`, `Some("30")`); labels without a number
/// suffix are returned whole.
fn split_device_label(label: &str) -> (String, Option<String>) {
    if let Some((device_type, suffix)) = label.rsplit_once(" #0x") {
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            return (
                device_type.trim().to_string(),
                Some(suffix.to_ascii_lowercase()),
            );
        }
    }
    (label.trim().to_string(), None)
}

/// Health reported for a field-replaceable unit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Ok,
    Degraded,
    Fault,
}

impl Health {
    /// Case-insensitive parse; values such as `N/A` or `Unknown` yield `None`
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "ok" => Some(Health::Ok),
            "degraded" => Some(Health::Degraded),
            "fault" => Some(Health::Fault),
            _ => None,
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Health::Ok => "ok",
            Health::Degraded => "degraded",
            Health::Fault => "fault",
        };
        f.write_str(text)
    }
}

/// Installation status value that marks a FRU as physically absent
pub const STATUS_NOT_INSTALLED: &str = "not installed";

/// One resource from a polled enclosure snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FruStatus {
    /// Durable id, stable across polls
    pub resource_id: String,
    pub health: Health,
    /// Lowercased installation status, e.g. `operational` or `not installed`
    pub status: String,
    /// Every field of the raw record, flattened to strings
    pub attributes: Attributes,
}

impl FruStatus {
    pub fn is_not_installed(&self) -> bool {
        let status = self.status.replace('-', " ");
        status == STATUS_NOT_INSTALLED
    }

    /// Decode one record of the enclosure API response
    pub fn from_json(record: &serde_json::Value) -> Result<Self, CollectorError> {
        let object = record.as_object().ok_or_else(|| {
            CollectorError::ParseError(format!("snapshot record is not an object: {}", record))
        })?;

        let field = |key: &str| -> Result<&str, CollectorError> {
            object
                .get(key)
                .and_then(|v| v.as_str())
                .ok_or_else(|| CollectorError::ParseError(format!("missing `{}` field", key)))
        };

        let resource_id = field("durable-id")?.to_string();
        let health_text = field("health")?;
        let health = Health::parse(health_text).ok_or_else(|| {
            CollectorError::ParseError(format!(
                "unrecognised health {:?} for {}",
                health_text, resource_id
            ))
        })?;
        let status = field("status")?.trim().to_ascii_lowercase();

        let attributes = object
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect();

        Ok(Self {
            resource_id,
            health,
            status,
            attributes,
        })
    }
}

/// Direction of a threshold crossing on a numeric sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdDirection {
    Low,
    High,
}

/// Kind of alert emitted downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AlertType {
    Fault,
    FaultResolved,
    Missing,
    Insertion,
    ThresholdBreached(ThresholdDirection),
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Fault => "fault",
            AlertType::FaultResolved => "fault_resolved",
            AlertType::Missing => "missing",
            AlertType::Insertion => "insertion",
            AlertType::ThresholdBreached(ThresholdDirection::Low) => "threshold_breached:low",
            AlertType::ThresholdBreached(ThresholdDirection::High) => "threshold_breached:high",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "fault" => Some(AlertType::Fault),
            "fault_resolved" => Some(AlertType::FaultResolved),
            "missing" => Some(AlertType::Missing),
            "insertion" => Some(AlertType::Insertion),
            "threshold_breached:low" => {
                Some(AlertType::ThresholdBreached(ThresholdDirection::Low))
            }
            "threshold_breached:high" => {
                Some(AlertType::ThresholdBreached(ThresholdDirection::High))
            }
            _ => None,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AlertType> for String {
    fn from(value: AlertType) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for AlertType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AlertType::parse(&value).ok_or_else(|| format!("unknown alert type {:?}", value))
    }
}

/// Severity attached to an outbound alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Informational => "informational",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which downstream handler an alert is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOrigin {
    /// Server FRU events read from the System Event Log
    NodeData,
    /// Enclosure FRU transitions read from the management API
    EnclosureAlert,
}

/// Common envelope fields of an alert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertInfo {
    pub site_id: u32,
    pub rack_id: u32,
    pub node_id: u32,
    pub cluster_id: u32,
    pub resource_type: String,
    pub resource_id: String,
    /// Epoch seconds, as text
    pub event_time: String,
}

/// Fully assembled, ready-to-send alert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertRecord {
    #[serde(skip_serializing, default = "default_origin")]
    pub origin: AlertOrigin,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub alert_id: String,
    pub host_id: String,
    pub info: AlertInfo,
    pub specific_info: Attributes,
}

fn default_origin() -> AlertOrigin {
    AlertOrigin::NodeData
}

impl AlertRecord {
    /// Wrap the record in the request envelope expected by downstream handlers
    pub fn to_envelope(&self) -> serde_json::Value {
        let mut body = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        let key = match self.origin {
            AlertOrigin::NodeData => "node_data",
            AlertOrigin::EnclosureAlert => {
                if let Some(object) = body.as_object_mut() {
                    object.insert("status".to_string(), serde_json::json!("update"));
                }
                "enclosure_alert"
            }
        };
        serde_json::json!({ "sensor_request_type": { key: body } })
    }
}

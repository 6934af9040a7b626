use crate::config::SystemInformation;
use crate::events::{AlertInfo, AlertOrigin, AlertRecord, AlertType, Attributes, Severity};
use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use log::warn;

/// Keys whose values arrive as bracketed, multi-line listings
pub const LISTING_KEYS: [&str; 4] = [
    "Deassertions Enabled",
    "Assertions Enabled",
    "Assertion Events",
    "States Asserted",
];

/// Process-wide identity stamped on every alert
///
/// Built once at startup and handed to each sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertContext {
    pub site_id: u32,
    pub rack_id: u32,
    pub node_id: u32,
    pub cluster_id: u32,
    pub host_id: String,
}

impl AlertContext {
    pub fn new(system: &SystemInformation, host_id: String) -> Self {
        Self {
            site_id: system.site_id,
            rack_id: system.rack_id,
            node_id: system.node_id,
            cluster_id: system.cluster_id,
            host_id,
        }
    }

    /// Host name of this machine, or `localhost` if it cannot be read
    pub fn local_host_id() -> String {
        match hostname::get() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                warn!("Unable to read host name: {}", e);
                "localhost".to_string()
            }
        }
    }
}

/// Inputs for one alert, produced by the log tailer or the snapshot differ
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub origin: AlertOrigin,
    pub resource_type: String,
    pub resource_id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub event_time: String,
    pub specific_info: Attributes,
    /// Live readings; only published for terminal entries
    pub dynamic_info: Attributes,
    pub terminal: bool,
}

/// Assembles outbound [`AlertRecord`]s
#[derive(Debug, Clone)]
pub struct AlertFactory {
    context: AlertContext,
}

impl AlertFactory {
    pub fn new(context: AlertContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AlertContext {
        &self.context
    }

    /// Merge the common envelope with resource-specific fields
    pub fn assemble(&self, draft: AlertDraft) -> AlertRecord {
        let mut specific_info = draft.specific_info;
        if draft.terminal {
            specific_info.extend(draft.dynamic_info);
        }
        for key in LISTING_KEYS {
            if let Some(value) = specific_info.get_mut(key) {
                *value = flatten_listing(value);
            }
        }

        let alert_id = new_alert_id(&draft.event_time);
        AlertRecord {
            origin: draft.origin,
            alert_type: draft.alert_type,
            severity: draft.severity,
            alert_id,
            host_id: self.context.host_id.clone(),
            info: AlertInfo {
                site_id: self.context.site_id,
                rack_id: self.context.rack_id,
                node_id: self.context.node_id,
                cluster_id: self.context.cluster_id,
                resource_type: draft.resource_type,
                resource_id: draft.resource_id,
                event_time: draft.event_time,
            },
            specific_info,
        }
    }
}

/// Flatten a bracketed multi-line listing into comma-separated text
///
/// `"[Lower Non-critical going low ]\n [Upper Critical going high ]"`
/// becomes `"Lower Non-critical going low, Upper Critical going high"`.
pub fn flatten_listing(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| *c != '[' && *c != ']').collect();
    stripped
        .lines()
        .flat_map(|line| line.split(','))
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Event time followed by a random salt; unique, not sortable
pub fn new_alert_id(event_time: &str) -> String {
    format!("{}{}", event_time, uuid::Uuid::new_v4().simple())
}

/// Current time as epoch seconds
pub fn now_event_time() -> String {
    Utc::now().timestamp().to_string()
}

/// Convert SEL `MM/DD/YYYY` + `HH:MM:SS` (BMC local time) to epoch seconds
pub fn sel_event_time(date: &str, time: &str) -> String {
    let text = format!("{} {}", date.trim(), time.trim());
    let parsed = NaiveDateTime::parse_from_str(&text, "%m/%d/%Y %H:%M:%S")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());
    match parsed {
        Some(local) => local.timestamp().to_string(),
        None => {
            warn!("Unparsable SEL timestamp {:?}, using current time", text);
            now_event_time()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ThresholdDirection;
    use quickcheck_macros::quickcheck;

    fn factory() -> AlertFactory {
        AlertFactory::new(AlertContext {
            site_id: 1,
            rack_id: 2,
            node_id: 3,
            cluster_id: 4,
            host_id: "srvnode-1".to_string(),
        })
    }

    fn draft(terminal: bool) -> AlertDraft {
        let mut specific_info = Attributes::new();
        specific_info.insert("fru_id".into(), "Fan #0x30".into());
        specific_info.insert(
            "Assertions Enabled".into(),
            "[Lower Non-critical going low ]\n  [Upper Critical going high ]".into(),
        );
        let mut dynamic_info = Attributes::new();
        dynamic_info.insert("Sensor Reading".into(), "5332 (+/- 0) RPM".into());
        dynamic_info.insert(
            "States Asserted".into(),
            "[Lower Non-critical]\n[Lower Critical]".into(),
        );

        AlertDraft {
            origin: AlertOrigin::NodeData,
            resource_type: "node:fru:fan".into(),
            resource_id: "Sys Fan 2B".into(),
            alert_type: AlertType::ThresholdBreached(ThresholdDirection::Low),
            severity: Severity::Warning,
            event_time: "1555392549".into(),
            specific_info,
            dynamic_info,
            terminal,
        }
    }

    #[test]
    fn test_assemble_terminal_merges_dynamic() {
        let record = factory().assemble(draft(true));
        assert_eq!(record.host_id, "srvnode-1");
        assert_eq!(record.info.site_id, 1);
        assert_eq!(record.info.cluster_id, 4);
        assert_eq!(record.info.resource_id, "Sys Fan 2B");
        assert_eq!(record.specific_info["Sensor Reading"], "5332 (+/- 0) RPM");
        assert_eq!(
            record.specific_info["States Asserted"],
            "Lower Non-critical, Lower Critical"
        );
        assert!(record.alert_id.starts_with("1555392549"));
    }

    #[test]
    fn test_assemble_non_terminal_omits_dynamic() {
        let record = factory().assemble(draft(false));
        assert!(!record.specific_info.contains_key("Sensor Reading"));
        assert!(!record.specific_info.contains_key("States Asserted"));
        assert_eq!(
            record.specific_info["Assertions Enabled"],
            "Lower Non-critical going low, Upper Critical going high"
        );
    }

    #[test]
    fn test_alert_ids_are_unique() {
        let a = new_alert_id("1555392549");
        let b = new_alert_id("1555392549");
        assert_ne!(a, b);
        assert_eq!(a.len(), "1555392549".len() + 32);
    }

    #[test]
    fn test_flatten_listing() {
        assert_eq!(flatten_listing("[a]\n [b]\n[c d  ]"), "a, b, c d");
        assert_eq!(flatten_listing("Presence detected"), "Presence detected");
        assert_eq!(flatten_listing("x,   y"), "x, y");
        assert_eq!(flatten_listing(""), "");
    }

    #[quickcheck]
    fn prop_flatten_listing_is_flat(text: String) -> bool {
        let flat = flatten_listing(&text);
        !flat.contains('\n') && !flat.contains('[') && !flat.contains(']') && !flat.contains("  ")
    }

    #[test]
    fn test_sel_event_time_parses() {
        let epoch: i64 = sel_event_time("04/16/2019", "05:29:09").parse().unwrap();
        let expected = Local
            .from_local_datetime(
                &NaiveDateTime::parse_from_str("04/16/2019 05:29:09", "%m/%d/%Y %H:%M:%S")
                    .unwrap(),
            )
            .earliest()
            .unwrap()
            .timestamp();
        assert_eq!(epoch, expected);
    }

    #[test]
    fn test_sel_event_time_falls_back_to_now() {
        let before = Utc::now().timestamp();
        let epoch: i64 = sel_event_time("Pre-Init", "Time-stamp").parse().unwrap();
        assert!(epoch >= before);
    }
}

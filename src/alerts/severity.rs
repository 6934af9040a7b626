use crate::events::{AlertType, Severity};

/// Severity of each known alert type; anything else is informational
const SEVERITY_TABLE: &[(&str, Severity)] = &[
    ("fault", Severity::Critical),
    ("missing", Severity::Critical),
    ("fault_resolved", Severity::Informational),
    ("insertion", Severity::Informational),
    ("threshold_breached:low", Severity::Warning),
    ("threshold_breached:high", Severity::Warning),
];

/// Map an alert type name to its severity, never failing
pub fn classify_name(alert_type: &str) -> Severity {
    SEVERITY_TABLE
        .iter()
        .find(|(name, _)| *name == alert_type)
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Informational)
}

pub fn classify(alert_type: AlertType) -> Severity {
    classify_name(alert_type.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ThresholdDirection;

    #[test]
    fn test_known_types() {
        assert_eq!(classify(AlertType::Fault), Severity::Critical);
        assert_eq!(classify(AlertType::Missing), Severity::Critical);
        assert_eq!(classify(AlertType::FaultResolved), Severity::Informational);
        assert_eq!(classify(AlertType::Insertion), Severity::Informational);
        assert_eq!(
            classify(AlertType::ThresholdBreached(ThresholdDirection::High)),
            Severity::Warning
        );
    }

    #[test]
    fn test_unknown_defaults_to_informational() {
        assert_eq!(classify_name("threshold_breached:sideways"), Severity::Informational);
        assert_eq!(classify_name(""), Severity::Informational);
    }

    #[test]
    fn test_every_alert_type_has_an_entry() {
        for alert_type in [
            AlertType::Fault,
            AlertType::FaultResolved,
            AlertType::Missing,
            AlertType::Insertion,
            AlertType::ThresholdBreached(ThresholdDirection::Low),
            AlertType::ThresholdBreached(ThresholdDirection::High),
        ] {
            assert!(SEVERITY_TABLE
                .iter()
                .any(|(name, _)| *name == alert_type.as_str()));
        }
    }
}

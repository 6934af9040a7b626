use crate::collectors::ipmi_parser::parse_sel_info;
use crate::collectors::IpmiSource;
use crate::config::SelConfig;
use crate::error::CollectorError;
use crate::events::Attributes;
use log::{debug, error, warn};
use std::time::{Duration, Instant};

const PERCENT_USED: &str = "Percent Used";
const ENTRIES: &str = "Entries";
const FREE_SPACE: &str = "Free Space";

/// Clears the SEL when it fills past a threshold
///
/// `sel info` is queried at most once per `interval`; the clock only
/// advances after a successful query so a failing BMC is retried next cycle.
#[derive(Debug, Clone)]
pub struct SelUsageMonitor {
    interval: Duration,
    threshold: f64,
    entry_size: u64,
    last_queried: Option<Instant>,
}

impl SelUsageMonitor {
    pub fn new(config: &SelConfig) -> Self {
        Self {
            interval: config.query_interval(),
            threshold: f64::from(config.usage_threshold),
            entry_size: config.entry_size_bytes,
            last_queried: None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_queried {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Run the check if due; returns `true` when the SEL was cleared
    pub fn check(&mut self, source: &dyn IpmiSource, now: Instant) -> Result<bool, CollectorError> {
        if !self.is_due(now) {
            return Ok(false);
        }

        let info = parse_sel_info(&source.sel_info()?);
        self.last_queried = Some(now);

        let Some(used) = percent_used(&info, self.entry_size) else {
            warn!("Unable to determine SEL usage from sel info: {:?}", info);
            return Ok(false);
        };
        debug!("SEL usage {:.1}%", used);

        if used <= self.threshold {
            return Ok(false);
        }

        warn!(
            "SEL usage {:.1}% above threshold {}%, clearing SEL",
            used, self.threshold
        );
        if let Err(e) = source.sel_clear() {
            error!(
                "Error clearing SEL, overflow may lose future node alerts: {}",
                e
            );
            return if e.is_terminal() { Err(e) } else { Ok(false) };
        }
        Ok(true)
    }
}

/// Percent of the SEL in use
///
/// Uses `Percent Used` when the BMC reports a number, otherwise estimates
/// it from the entry count and free space assuming `entry_size` bytes per
/// entry.
pub fn percent_used(info: &Attributes, entry_size: u64) -> Option<f64> {
    if let Some(text) = info.get(PERCENT_USED) {
        if let Ok(value) = text.replace('%', "").trim().parse::<f64>() {
            return Some(value);
        }
    }

    let entries: u64 = info.get(ENTRIES)?.trim().parse().ok()?;
    let free: u64 = info
        .get(FREE_SPACE)?
        .chars()
        .filter(|c| !c.is_ascii_alphabetic())
        .collect::<String>()
        .trim()
        .parse()
        .ok()?;

    let used_bytes = entries.saturating_mul(entry_size);
    let total = free.saturating_add(used_bytes);
    if total == 0 {
        return None;
    }
    Some(100.0 * used_bytes as f64 / total as f64)
}

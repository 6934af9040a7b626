use crate::error::AlertError;
use crate::events::AlertRecord;
use log::{debug, error, log, Level};
use std::io::Write;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Downstream consumer of assembled alerts
///
/// Implementations are shared by every sensor thread and must tolerate
/// concurrent `publish` calls.
#[cfg_attr(test, mockall::automock)]
pub trait AlertSink: Send + Sync {
    fn publish(&self, alert: &AlertRecord) -> Result<(), AlertError>;
}

/// Writes each alert envelope as one JSON line
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> AlertSink for JsonLinesSink<W> {
    fn publish(&self, alert: &AlertRecord) -> Result<(), AlertError> {
        let line = serde_json::to_string(&alert.to_envelope())?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| AlertError::DeliveryFailed("alert writer lock poisoned".to_string()))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Forwards alerts to an in-process consumer
pub struct ChannelSink {
    sender: Sender<AlertRecord>,
}

impl ChannelSink {
    pub fn new(sender: Sender<AlertRecord>) -> Self {
        Self { sender }
    }
}

impl AlertSink for ChannelSink {
    fn publish(&self, alert: &AlertRecord) -> Result<(), AlertError> {
        self.sender
            .send(alert.clone())
            .map_err(|e| AlertError::DeliveryFailed(format!("alert channel closed: {}", e)))
    }
}

/// Mirrors alerts as Important Event Messages through the logging facade
pub struct IemLogSink {
    level: Level,
}

impl Default for IemLogSink {
    fn default() -> Self {
        Self::new(Level::Warn)
    }
}

impl IemLogSink {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Build the logging request carrying the alert envelope
    pub fn format_iem(alert: &AlertRecord) -> Result<String, AlertError> {
        // serde_json::Value keeps keys sorted, so the embedded message is stable
        let log_msg = serde_json::to_string(&alert.to_envelope())?;
        let request = serde_json::json!({
            "actuator_request_type": {
                "logging": {
                    "log_level": "LOG_WARNING",
                    "log_type": "IEM",
                    "log_msg": log_msg,
                }
            }
        });
        Ok(serde_json::to_string(&request)?)
    }
}

impl AlertSink for IemLogSink {
    fn publish(&self, alert: &AlertRecord) -> Result<(), AlertError> {
        let message = Self::format_iem(alert)?;
        log!(target: "iem", self.level, "IEC: {}", message);
        Ok(())
    }
}

/// Fans an alert out to the primary sink and an optional IEM mirror
///
/// Delivery failures are logged here and never retried; the mirror is
/// best-effort and independent of the primary.
///
/// The mirror receives the same record, `alert_id` included, so an IEM
/// line can be matched to its primary alert.
#[derive(Clone)]
pub struct AlertDispatcher {
    primary: Arc<dyn AlertSink>,
    mirror: Option<Arc<dyn AlertSink>>,
}

impl AlertDispatcher {
    pub fn new(primary: Arc<dyn AlertSink>) -> Self {
        Self {
            primary,
            mirror: None,
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn AlertSink>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Deliver one alert; returns whether the primary sink accepted it
    pub fn deliver(&self, alert: &AlertRecord) -> bool {
        let delivered = match self.primary.publish(alert) {
            Ok(()) => {
                debug!(
                    "Published {} alert {} for {}",
                    alert.alert_type, alert.alert_id, alert.info.resource_id
                );
                true
            }
            Err(e) => {
                error!(
                    "Failed to publish {} alert for {}: {}",
                    alert.alert_type, alert.info.resource_id, e
                );
                false
            }
        };

        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.publish(alert) {
                error!("Failed to mirror alert {} as IEM: {}", alert.alert_id, e);
            }
        }
        delivered
    }
}

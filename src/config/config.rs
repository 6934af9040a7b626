use crate::error::ConfigError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub system_information: SystemInformation,
    pub sel: SelConfig,
    pub enclosure: EnclosureConfig,
    pub output: OutputConfig,
}

/// Site identifiers stamped on every alert, plus the state directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SystemInformation {
    pub site_id: u32,
    pub rack_id: u32,
    pub node_id: u32,
    pub cluster_id: u32,
    pub data_path: PathBuf,
}

impl Default for SystemInformation {
    fn default() -> Self {
        Self {
            site_id: 0,
            rack_id: 0,
            node_id: 0,
            cluster_id: 0,
            data_path: PathBuf::from("/var/hwwatch/data"),
        }
    }
}

/// System Event Log tailing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelConfig {
    pub enabled: bool,
    pub poll_interval_seconds: u64,
    /// Percent used above which the SEL is cleared
    pub usage_threshold: u32,
    /// Minimum spacing between two `sel info` usage checks
    pub query_interval_seconds: u64,
    /// Bytes per entry assumed when the BMC does not report percent used
    pub entry_size_bytes: u64,
    pub use_sudo: bool,
}

impl Default for SelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 30,
            usage_threshold: 90,
            query_interval_seconds: 300,
            entry_size_bytes: 16,
            use_sudo: true,
        }
    }
}

impl SelConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn query_interval(&self) -> Duration {
        Duration::from_secs(self.query_interval_seconds)
    }
}

/// FRU categories polled from the enclosure management API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FruKind {
    Controller,
    Psu,
    Fan,
    Disk,
}

/// Enclosure management API settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnclosureConfig {
    pub enabled: bool,
    pub api_url: String,
    pub poll_interval_seconds: u64,
    pub request_timeout_seconds: u64,
    pub frus: Vec<FruKind>,
}

impl Default for EnclosureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "http://127.0.0.1".to_string(),
            poll_interval_seconds: 10,
            request_timeout_seconds: 30,
            frus: vec![
                FruKind::Controller,
                FruKind::Psu,
                FruKind::Fan,
                FruKind::Disk,
            ],
        }
    }
}

impl EnclosureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Where assembled alerts are written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// JSON-lines file for alerts; stdout when unset
    pub alerts_file: Option<PathBuf>,
    /// Mirror every alert as an IEM log line
    pub iem_mirror: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            alerts_file: None,
            iem_mirror: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults when the file is absent
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject values the sensors cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sel.usage_threshold == 0 || self.sel.usage_threshold > 100 {
            return Err(ConfigError::ValidationError(format!(
                "sel.usage_threshold must be within 1..=100, got {}",
                self.sel.usage_threshold
            )));
        }
        if self.sel.poll_interval_seconds == 0 || self.enclosure.poll_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.sel.query_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "sel.query_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.sel.entry_size_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "sel.entry_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.enclosure.enabled && self.enclosure.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "enclosure.api_url must not be empty".to_string(),
            ));
        }
        // Two sensors of one kind would share a fault map file
        for (i, kind) in self.enclosure.frus.iter().enumerate() {
            if self.enclosure.frus[..i].contains(kind) {
                return Err(ConfigError::ValidationError(format!(
                    "enclosure.frus lists {:?} more than once",
                    kind
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.system_information.site_id, 0);
        assert_eq!(config.sel.usage_threshold, 90);
        assert_eq!(config.sel.query_interval(), Duration::from_secs(300));
        assert_eq!(config.sel.entry_size_bytes, 16);
        assert_eq!(config.enclosure.frus.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [system_information]
            site_id = 7
            rack_id = 3
            data_path = "/tmp/hw"

            [sel]
            usage_threshold = 75

            [enclosure]
            frus = ["controller", "disk"]
            "#,
        )
        .unwrap();

        assert_eq!(config.system_information.site_id, 7);
        assert_eq!(config.system_information.rack_id, 3);
        assert_eq!(config.system_information.node_id, 0);
        assert_eq!(config.system_information.data_path, PathBuf::from("/tmp/hw"));
        assert_eq!(config.sel.usage_threshold, 75);
        assert_eq!(config.sel.query_interval_seconds, 300);
        assert_eq!(
            config.enclosure.frus,
            vec![FruKind::Controller, FruKind::Disk]
        );
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let result = Config::from_toml_str("[sel]\nusage_threshold = 150\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = Config::from_toml_str("[enclosure]\npoll_interval_seconds = 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_duplicate_fru_kind_rejected() {
        let result = Config::from_toml_str("[enclosure]\nfrus = [\"fan\", \"psu\", \"fan\"]\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml_str("[sel\nusage_threshold = ");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = Config::load(Some(Path::new("/nonexistent/hwwatch.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[output]\nalerts_file = \"/tmp/alerts.jsonl\"\niem_mirror = false"
        )
        .unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(
            config.output.alerts_file,
            Some(PathBuf::from("/tmp/alerts.jsonl"))
        );
        assert!(!config.output.iem_mirror);
    }
}

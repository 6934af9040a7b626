use thiserror::Error;

/// Errors raised while fetching raw data from hardware collaborators
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Failed to spawn subprocess: {0}")]
    SubprocessSpawn(String),

    #[error("Command `{command}` exited with status {code}: {output}")]
    CommandFailed {
        command: String,
        code: i32,
        output: String,
    },

    /// A required tool or service is absent; the sensor must stop polling
    #[error("Required dependency unavailable: {0}")]
    DependencyMissing(String),

    #[error("HTTP request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Failed to parse output: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CollectorError {
    /// Whether this failure should end the sensor instead of being retried next cycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, CollectorError::DependencyMissing(_))
    }
}

/// Errors raised by the on-disk state stores
#[derive(Error, Debug)]
pub enum StateError {
    #[error("State I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed state in {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StateError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Errors that keep a sensor from starting
#[derive(Error, Debug)]
pub enum SensorError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Collector(#[from] CollectorError),
}

/// Errors that can occur when sending alerts
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to deliver alert: {0}")]
    DeliveryFailed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

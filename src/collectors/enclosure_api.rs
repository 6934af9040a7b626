use crate::collectors::SnapshotSource;
use crate::error::CollectorError;
use log::debug;
use reqwest::blocking::Client;
use reqwest::Url;
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;

/// Blocking client for the enclosure management REST API
///
/// Each `fetch` is a single GET; retries are left to the next poll cycle.
pub struct EnclosureApiClient {
    base_url: Url,
    client: Client,
    local: bool,
}

impl EnclosureApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CollectorError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            CollectorError::ParseError(format!("invalid API url {:?}: {}", base_url, e))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectorError::Transport(format!("failed to build HTTP client: {}", e)))?;
        let local = is_loopback(&base_url);

        Ok(Self {
            base_url,
            client,
            local,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CollectorError> {
        self.base_url
            .join(path)
            .map_err(|e| CollectorError::ParseError(format!("invalid API path {:?}: {}", path, e)))
    }
}

/// Whether `url` points at this host
fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_matches(|c| c == '[' || c == ']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}

/// Pull the record list stored under `key` out of a response body
pub(crate) fn extract_records(mut body: Value, key: &str) -> Result<Vec<Value>, CollectorError> {
    match body.get_mut(key).map(Value::take) {
        Some(Value::Array(records)) => Ok(records),
        Some(other) => Err(CollectorError::ParseError(format!(
            "`{}` is not a list: {}",
            key, other
        ))),
        None => Err(CollectorError::ParseError(format!(
            "response has no `{}` field",
            key
        ))),
    }
}

impl SnapshotSource for EnclosureApiClient {
    fn fetch(&self, path: &str, key: &str) -> Result<Vec<Value>, CollectorError> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);

        let response = self.client.get(url.clone()).send().map_err(|e| {
            if e.is_connect() && self.local {
                CollectorError::DependencyMissing(format!(
                    "enclosure API not reachable at {}: {}",
                    url, e
                ))
            } else {
                CollectorError::Transport(format!("request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .map_err(|e| CollectorError::ParseError(format!("invalid JSON from {}: {}", url, e)))?;
        extract_records(body, key)
    }

    fn is_local(&self) -> bool {
        self.local
    }
}

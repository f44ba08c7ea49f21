//! Delivery of flushed records to the local plugin manager.
//!
//! The plugin manager is a companion process listening on localhost. Each
//! flushed record is POSTed to `<base_url>/data` as a [`KeystrokePayload`].

use crate::core::{KeystrokePayload, PLUGIN_ID};
use chrono::{Local, Offset};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Default base URL of the plugin manager API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:19234/api/v1";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Plugin name reported in request headers.
pub const PLUGIN_NAME: &str = "keystroke-agent";

/// Plugin manager connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionConfig {
    /// API base URL, without a trailing slash
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl CompanionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Endpoint keystroke payloads are posted to.
    pub fn data_url(&self) -> String {
        format!("{}/data", self.base())
    }

    /// Liveness endpoint.
    pub fn ping_url(&self) -> String {
        format!("{}/ping", self.base())
    }
}

/// Delivery error types.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Client could not be built
    #[error("Delivery config error: {0}")]
    Config(String),
    /// Plugin manager unreachable, timed out, etc.
    #[error("Delivery network error: {0}")]
    Network(String),
    /// Plugin manager answered with a non-success status
    #[error("Plugin manager error ({status}): {message}")]
    Server { status: u16, message: String },
}

/// Anything that can take a flushed payload off our hands.
pub trait DeliverySink: Send + Sync + 'static {
    fn deliver(
        &self,
        payload: KeystrokePayload,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Whether a status code counts as success for the plugin manager.
pub fn is_response_ok(status: u16) -> bool {
    (1..300).contains(&status)
}

/// HTTP client for the plugin manager.
#[derive(Debug, Clone)]
pub struct CompanionClient {
    config: CompanionConfig,
    client: reqwest::Client,
}

impl CompanionClient {
    /// Create a client that identifies itself with `plugin_uuid`.
    pub fn new(
        config: CompanionConfig,
        version: &str,
        plugin_uuid: &str,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(plugin_headers(version, plugin_uuid)?)
            .build()
            .map_err(|e| DeliveryError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &CompanionConfig {
        &self.config
    }

    /// Check whether the plugin manager is up.
    pub async fn is_available(&self) -> bool {
        match self.client.get(self.config.ping_url()).send().await {
            Ok(response) => is_response_ok(response.status().as_u16()),
            Err(e) => {
                tracing::debug!("ping failed: {}", e);
                false
            }
        }
    }

    /// POST one payload to the data endpoint.
    pub async fn post_data(&self, payload: &KeystrokePayload) -> Result<(), DeliveryError> {
        tracing::debug!(
            project = payload.project_key(),
            files = payload.source.len(),
            "sending keystroke payload"
        );

        let response = self
            .client
            .post(self.config.data_url())
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if !is_response_ok(status.as_u16()) {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeliveryError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

impl DeliverySink for CompanionClient {
    async fn deliver(&self, payload: KeystrokePayload) -> Result<(), DeliveryError> {
        self.post_data(&payload).await
    }
}

/// Identification headers sent with every request.
fn plugin_headers(version: &str, plugin_uuid: &str) -> Result<HeaderMap, DeliveryError> {
    let offset_minutes = Local::now().offset().fix().local_minus_utc() / 60;

    let pairs = [
        ("x-swdc-plugin-id", PLUGIN_ID.to_string()),
        ("x-swdc-plugin-name", PLUGIN_NAME.to_string()),
        ("x-swdc-plugin-version", version.to_string()),
        ("x-swdc-plugin-os", std::env::consts::OS.to_string()),
        ("x-swdc-plugin-tz", local_timezone_name(offset_minutes)),
        ("x-swdc-plugin-offset", offset_minutes.to_string()),
        ("x-swdc-plugin-uuid", plugin_uuid.to_string()),
    ];

    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let value = HeaderValue::from_str(&value)
            .map_err(|e| DeliveryError::Config(format!("Invalid {name} header: {e}")))?;
        headers.insert(HeaderName::from_static(name), value);
    }
    Ok(headers)
}

/// IANA name of the local timezone.
///
/// Tried in order: `TZ`, the `/etc/localtime` link target, then an `Etc/GMT`
/// zone matching `offset_minutes`. Offsets that are not whole hours have no
/// such zone and fall back to `UTC`; the offset header stays authoritative.
fn local_timezone_name(offset_minutes: i32) -> String {
    std::env::var("TZ")
        .ok()
        .and_then(|tz| parse_zone(&tz))
        .or_else(zone_from_localtime)
        .map(|tz| tz.name().to_string())
        .unwrap_or_else(|| fixed_offset_zone(offset_minutes))
}

fn parse_zone(name: &str) -> Option<chrono_tz::Tz> {
    name.trim_start_matches(':').parse().ok()
}

fn zone_from_localtime() -> Option<chrono_tz::Tz> {
    let target = std::fs::read_link("/etc/localtime").ok()?;
    let target = target.to_string_lossy();
    let (_, name) = target.split_once("zoneinfo/")?;
    parse_zone(name)
}

/// `Etc/GMT` names invert the sign: UTC+2 is `Etc/GMT-2`.
fn fixed_offset_zone(offset_minutes: i32) -> String {
    if offset_minutes == 0 || offset_minutes % 60 != 0 {
        return chrono_tz::Tz::UTC.name().to_string();
    }
    parse_zone(&format!("Etc/GMT{:+}", -offset_minutes / 60))
        .unwrap_or(chrono_tz::Tz::UTC)
        .name()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_companion_urls() {
        let config = CompanionConfig::default();
        assert_eq!(config.data_url(), "http://localhost:19234/api/v1/data");
        assert_eq!(config.ping_url(), "http://localhost:19234/api/v1/ping");

        let config = CompanionConfig::new("http://127.0.0.1:9000/api/v1/");
        assert_eq!(config.data_url(), "http://127.0.0.1:9000/api/v1/data");
    }

    #[test]
    fn test_response_ok_range() {
        assert!(is_response_ok(200));
        assert!(is_response_ok(204));
        assert!(!is_response_ok(300));
        assert!(!is_response_ok(401));
        assert!(!is_response_ok(500));
        assert!(!is_response_ok(0));
    }

    #[test]
    fn test_fixed_offset_zone_matches_offset() {
        assert_eq!(fixed_offset_zone(120), "Etc/GMT-2");
        assert_eq!(fixed_offset_zone(-300), "Etc/GMT+5");
        assert_eq!(fixed_offset_zone(0), "UTC");
        assert_eq!(fixed_offset_zone(330), "UTC");
    }

    #[test]
    fn test_parse_zone() {
        assert_eq!(
            parse_zone(":Europe/Berlin").map(|tz| tz.name()),
            Some("Europe/Berlin")
        );
        assert_eq!(
            parse_zone("America/New_York").map(|tz| tz.name()),
            Some("America/New_York")
        );
        assert!(parse_zone("Not/AZone").is_none());
    }

    #[test]
    fn test_plugin_headers() {
        let headers = plugin_headers("0.1.4", "abc-123").unwrap();
        assert_eq!(headers["x-swdc-plugin-id"], "2");
        assert_eq!(headers["x-swdc-plugin-version"], "0.1.4");
        assert_eq!(headers["x-swdc-plugin-uuid"], "abc-123");
        assert!(headers.contains_key("x-swdc-plugin-tz"));
        assert!(headers.contains_key("x-swdc-plugin-offset"));
    }

    #[test]
    fn test_invalid_header_value_is_config_error() {
        let result = plugin_headers("0.1.4", "bad\nuuid");
        assert!(matches!(result, Err(DeliveryError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_manager() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let mut config = CompanionConfig::new("http://127.0.0.1:9/api/v1");
        config.timeout_secs = 2;
        let client = CompanionClient::new(config, "0.1.4", "test").unwrap();

        assert!(!client.is_available().await);

        let mut record = crate::core::AggregationRecord::new(
            "/w",
            None,
            chrono::Utc::now(),
            chrono::Duration::seconds(60),
        );
        record.record_open("/w/a.rs");
        let err = client.deliver(record.to_payload("0.1.4")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Network(_)));
    }
}

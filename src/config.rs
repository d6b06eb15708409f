//! Configuration for the Synheart Tracker.
//!
//! [`TrackerOptions`] is what a host passes at construction; it is merged
//! over the defaults and validated into the agent's [`TrackerState`].
//! [`Config`] is the on-disk form used by the CLI.

use crate::transport::BeaconConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Caller-supplied construction options.
///
/// Every field is optional on the wire; unset flags default to false.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerOptions {
    /// Collection endpoint. Required by [`TrackerState::from_options`].
    pub request_url: Option<String>,
    /// Capture `pushState`, `replaceState` and `popstate` as `history-pv`
    pub history_tracker: bool,
    /// Capture `hashchange` as `hash-pv`
    pub hash_tracker: bool,
    /// Capture pointer interactions on elements carrying a tracking marker
    pub dom_tracker: bool,
    /// Capture uncaught errors and unhandled rejections
    pub js_error: bool,
    /// Initial user/session identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Initial free-form context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
}

impl TrackerOptions {
    pub fn new(request_url: impl Into<String>) -> Self {
        Self {
            request_url: Some(request_url.into()),
            ..Self::default()
        }
    }

    pub fn history_tracker(mut self, enabled: bool) -> Self {
        self.history_tracker = enabled;
        self
    }

    pub fn hash_tracker(mut self, enabled: bool) -> Self {
        self.hash_tracker = enabled;
        self
    }

    pub fn dom_tracker(mut self, enabled: bool) -> Self {
        self.dom_tracker = enabled;
        self
    }

    pub fn js_error(mut self, enabled: bool) -> Self {
        self.js_error = enabled;
        self
    }

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Overlay `other` on top of `self`: set values and true flags win.
    pub fn merge(mut self, other: TrackerOptions) -> Self {
        if other.request_url.is_some() {
            self.request_url = other.request_url;
        }
        self.history_tracker |= other.history_tracker;
        self.hash_tracker |= other.hash_tracker;
        self.dom_tracker |= other.dom_tracker;
        self.js_error |= other.js_error;
        if other.uuid.is_some() {
            self.uuid = other.uuid;
        }
        if other.extra.is_some() {
            self.extra = other.extra;
        }
        self
    }
}

/// The agent's configuration state, merged into every outbound envelope.
///
/// Flags are fixed once the agent is installed; only `uuid` and `extra`
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    pub sdk_version: String,
    pub request_url: String,
    pub history_tracker: bool,
    pub hash_tracker: bool,
    pub dom_tracker: bool,
    pub js_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
}

impl TrackerState {
    /// Validate options and merge them over the defaults.
    pub fn from_options(options: TrackerOptions) -> Result<Self, ConfigError> {
        let request_url = options
            .request_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingRequestUrl)?;
        validate_request_url(&request_url)?;

        Ok(Self {
            sdk_version: crate::VERSION.to_string(),
            request_url,
            history_tracker: options.history_tracker,
            hash_tracker: options.hash_tracker,
            dom_tracker: options.dom_tracker,
            js_error: options.js_error,
            uuid: options.uuid,
            extra: options.extra,
        })
    }

    pub fn set_uuid(&mut self, uuid: String) {
        self.uuid = Some(uuid);
    }

    pub fn set_extra(&mut self, extra: Map<String, Value>) {
        self.extra = Some(extra);
    }
}

/// Endpoints must be absolute http(s) URLs with a host.
fn validate_request_url(url: &str) -> Result<(), ConfigError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ConfigError::InvalidRequestUrl(url.to_string()))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidRequestUrl(url.to_string()));
    }
    Ok(())
}

/// On-disk configuration used by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default tracker options; CLI flags are merged over these
    pub tracker: TrackerOptions,
    /// Beacon delivery settings
    pub beacon: BeaconConfig,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from JSON text.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-tracker")
            .join("config.json")
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingRequestUrl,
    InvalidRequestUrl(String),
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingRequestUrl => write!(f, "requestUrl is required"),
            ConfigError::InvalidRequestUrl(url) => write!(f, "Invalid requestUrl: {url}"),
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_merge_under_options() {
        let options: TrackerOptions =
            serde_json::from_value(json!({"requestUrl": "https://x.test", "domTracker": true}))
                .unwrap();
        let state = TrackerState::from_options(options).unwrap();

        assert_eq!(state.sdk_version, crate::VERSION);
        assert_eq!(state.request_url, "https://x.test");
        assert!(state.dom_tracker);
        assert!(!state.history_tracker);
        assert!(!state.hash_tracker);
        assert!(!state.js_error);
        assert!(state.uuid.is_none());
    }

    #[test]
    fn test_missing_request_url_fails_fast() {
        assert_eq!(
            TrackerState::from_options(TrackerOptions::default()),
            Err(ConfigError::MissingRequestUrl)
        );
        assert_eq!(
            TrackerState::from_options(TrackerOptions::new("   ")),
            Err(ConfigError::MissingRequestUrl)
        );
    }

    #[test]
    fn test_invalid_request_url() {
        for url in ["ftp://x.test", "https://", "collector.test/beacon", "http:// x"] {
            assert!(
                matches!(
                    TrackerState::from_options(TrackerOptions::new(url)),
                    Err(ConfigError::InvalidRequestUrl(_))
                ),
                "accepted {url}"
            );
        }
    }

    #[test]
    fn test_state_serializes_camel_case_without_unset_identity() {
        let state = TrackerState::from_options(TrackerOptions::new("https://x.test")).unwrap();
        let value = serde_json::to_value(&state).unwrap();

        assert_eq!(value["requestUrl"], "https://x.test");
        assert_eq!(value["historyTracker"], false);
        assert!(value.get("sdkVersion").is_some());
        assert!(value.get("uuid").is_none());
        assert!(value.get("extra").is_none());
    }

    #[test]
    fn test_options_merge() {
        let file = TrackerOptions::new("https://file.test").hash_tracker(true);
        let cli = TrackerOptions {
            uuid: Some("u-1".to_string()),
            js_error: true,
            ..TrackerOptions::default()
        };
        let merged = file.merge(cli);

        assert_eq!(merged.request_url.as_deref(), Some("https://file.test"));
        assert!(merged.hash_tracker);
        assert!(merged.js_error);
        assert_eq!(merged.uuid.as_deref(), Some("u-1"));
    }

    #[test]
    fn test_config_from_json() {
        let config = Config::from_json(
            r#"{"tracker": {"requestUrl": "https://x.test", "jsError": true},
                "beacon": {"queueCapacity": 8}}"#,
        )
        .unwrap();
        assert!(config.tracker.js_error);
        assert_eq!(config.beacon.queue_capacity, 8);
        assert_eq!(
            config.beacon.max_payload_bytes,
            BeaconConfig::default().max_payload_bytes
        );

        assert!(matches!(
            Config::from_json("not json"),
            Err(ConfigError::ParseError(_))
        ));
    }
}

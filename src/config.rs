// src/config.rs

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use url::Url;

fn default_video_url() -> String {
    "https://veox.example.com".to_string()
}

fn default_image_url() -> String {
    "https://gemx.example.com".to_string()
}

fn default_cooldown_seconds() -> u32 {
    10
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_identity_header() -> String {
    "x-caller-username".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

/// Base URLs of the proxy backends, one per media kind. A user-selected
/// override replaces the default for the whole session.
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_video_url")]
    pub video_url: String,
    #[serde(default = "default_image_url")]
    pub image_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            video_url: default_video_url(),
            image_url: default_image_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Tuning for the generation-slot admission loop.
///
/// Defaults reproduce the original behavior: a 10 second slot cooldown and
/// an unbounded fixed 2 second poll. `max_wait_secs` and
/// `exponential_backoff` are opt-in.
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
    #[serde(default)]
    pub exponential_backoff: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown_seconds(),
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: None,
            exponential_backoff: false,
        }
    }
}

impl AdmissionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backends: BackendConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backends: BackendConfig::default(),
            admission: AdmissionConfig::default(),
            identity_header: default_identity_header(),
        }
    }
}

/// Loads and validates the configuration. A missing file is not an error:
/// defaults and environment-specific overrides cover that case.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let config = if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)?
    } else {
        info!(config.path = %path.display(), "Optional configuration file not found. Using defaults.");
        AppConfig::default()
    };
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &AppConfig) -> Result<()> {
    for (name, raw) in [
        ("backends.video_url", &config.backends.video_url),
        ("backends.image_url", &config.backends.image_url),
    ] {
        let url = Url::parse(raw)
            .map_err(|e| AppError::Config(format!("{name}: invalid URL '{raw}': {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AppError::Config(format!(
                "{name}: unsupported scheme '{}'",
                url.scheme()
            )));
        }
    }

    if config.admission.poll_interval_secs == 0 {
        return Err(AppError::Config(
            "admission.poll_interval_secs must be at least 1".to_string(),
        ));
    }
    if config.identity_header.is_empty() {
        return Err(AppError::Config(
            "identity_header must not be empty".to_string(),
        ));
    }
    Ok(())
}

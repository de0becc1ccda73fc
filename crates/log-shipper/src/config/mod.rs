// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration Module
//!
//! This module handles all configuration for the log shipper, including parsing from
//! environment variables, YAML files, and providing sensible defaults.
//!
//! ## Configuration Priority
//!
//! Configuration sources are applied in the following order (later sources override earlier):
//!
//! 1. **Defaults** - Hard-coded defaults in the code
//! 2. **YAML file** - Configuration from a file such as `log-shipper.yaml` (if present)
//! 3. **Environment variables** - `LOG_SHIPPER_*` environment variables (highest priority)
//!
//! ## Edge Cases and Behaviors
//!
//! ### Shared key
//!
//! - Must be standard base64. [`Config::validate`] rejects anything else before a
//!   client is started, so a bad key never surfaces from a logging call.
//!
//! ### Endpoint
//!
//! - Defaults to `https://{workspace_id}.{ingestion_domain}`.
//! - `endpoint` overrides the whole base URL (forward proxies, local sinks, tests).
//! - **Missing protocol** on `endpoint`: `https://` is added.
//!
//! ### Proxy
//!
//! - `HTTPS_PROXY` is used when `proxy_https` is not configured.
//!
//! ### Whitespace Handling
//!
//! String values are trimmed; empty strings after trimming are treated as unset.

pub mod env;
pub mod log_level;
pub mod yaml;

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::{env::EnvConfigSource, log_level::LogLevel, yaml::YamlConfigSource};
use crate::error::ShipperError;
use crate::logs::constants;

/// Helper macro to merge `Option<String>` fields to `String` fields
///
/// Providing one field argument will merge the value from the source config field into the config
/// field.
///
/// Providing two field arguments will merge the value from the source config field into the
/// differently named config field.
#[macro_export]
macro_rules! merge_string {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if let Some(value) = &$source.$source_field {
            $config.$config_field.clone_from(value);
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = &$source.$field {
            $config.$field.clone_from(value);
        }
    };
}

/// Helper macro to merge `Option<T>` fields where T implements Clone
#[macro_export]
macro_rules! merge_option {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if $source.$source_field.is_some() {
            $config.$config_field.clone_from(&$source.$source_field);
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if $source.$field.is_some() {
            $config.$field.clone_from(&$source.$field);
        }
    };
}

/// Helper macro to merge `Option<T>` fields to `T` fields when `Option<T>` is Some
#[macro_export]
macro_rules! merge_option_to_value {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if let Some(value) = &$source.$source_field {
            $config.$config_field = value.clone();
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = &$source.$field {
            $config.$field = value.clone();
        }
    };
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    ParseError(String),
}

pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Default)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(&mut self) -> Config {
        let mut failed_sources = 0;
        for source in &self.sources {
            match source.load(&mut self.config) {
                Ok(()) => (),
                Err(e) => {
                    error!("Failed to load config: {:?}", e);
                    failed_sources += 1;
                }
            }
        }

        if !self.sources.is_empty() && failed_sources == self.sources.len() {
            debug!("All sources failed to load config, using default config.");
        }

        if self.config.ingestion_domain.is_empty() {
            self.config.ingestion_domain = constants::DEFAULT_INGESTION_DOMAIN.to_string();
        }

        if self.config.default_component.is_empty() {
            self.config.default_component = constants::DEFAULT_COMPONENT.to_string();
        }

        // If `proxy_https` is not set, set it from `HTTPS_PROXY` environment variable
        // if it exists
        if let Ok(https_proxy) = std::env::var("HTTPS_PROXY") {
            if self.config.proxy_https.is_none() && !https_proxy.trim().is_empty() {
                self.config.proxy_https = Some(https_proxy.trim().to_string());
            }
        }

        if let Some(endpoint) = &self.config.endpoint {
            self.config.endpoint = Some(normalize_url(endpoint));
        }

        self.config.clone()
    }
}

/// Normalize a URL by ensuring it has a valid protocol
///
/// If the URL doesn't start with http:// or https://, adds https:// prefix.
/// A trailing slash is removed so paths can be appended directly.
fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');

    if url.starts_with("http://") || url.starts_with("https://") || url.is_empty() {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Config {
    /// Workspace (tenant) identifier; also the first label of the ingestion host.
    pub workspace_id: String,
    /// Base64 encoded shared key used to sign requests.
    pub shared_key: String,
    /// Stream the records land in, sent as the `Log-Type` header.
    pub log_type: String,
    pub ingestion_domain: String,
    /// Full base URL override, e.g. `http://127.0.0.1:8080`.
    pub endpoint: Option<String>,
    pub proxy_https: Option<String>,

    pub batch_size: usize,
    pub batch_timeout_seconds: u64,
    pub max_queued_batches: usize,

    pub retry_count: u32,
    pub retry_delay_seconds: u64,
    pub request_timeout_seconds: u64,
    pub shutdown_timeout_seconds: u64,

    /// Component tag used when a caller passes an empty one.
    pub default_component: String,
    pub log_level: LogLevel,
    /// Echo every record as a local `tracing` event.
    pub echo_records: bool,
    /// Structured local log file (JSON lines).
    pub local_log_path: Option<PathBuf>,
    /// Where dropped batches are spooled (JSON lines).
    pub fallback_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_id: String::new(),
            shared_key: String::new(),
            log_type: constants::DEFAULT_LOG_TYPE.to_string(),
            ingestion_domain: constants::DEFAULT_INGESTION_DOMAIN.to_string(),
            endpoint: None,
            proxy_https: None,
            batch_size: constants::DEFAULT_BATCH_SIZE,
            batch_timeout_seconds: constants::DEFAULT_BATCH_TIMEOUT_SECONDS,
            max_queued_batches: constants::DEFAULT_MAX_QUEUED_BATCHES,
            retry_count: constants::DEFAULT_RETRY_COUNT,
            retry_delay_seconds: constants::DEFAULT_RETRY_DELAY_SECONDS,
            request_timeout_seconds: constants::DEFAULT_REQUEST_TIMEOUT_SECONDS,
            shutdown_timeout_seconds: constants::DEFAULT_SHUTDOWN_TIMEOUT_SECONDS,
            default_component: constants::DEFAULT_COMPONENT.to_string(),
            log_level: LogLevel::default(),
            echo_records: true,
            local_log_path: None,
            fallback_path: None,
        }
    }
}

impl Config {
    /// Validates the configuration for consistency.
    ///
    /// Runs before a client is started so configuration mistakes fail once, loudly,
    /// instead of on every flush.
    pub fn validate(&self) -> Result<(), ShipperError> {
        if self.workspace_id.trim().is_empty() {
            return Err(ShipperError::InvalidConfig(
                "workspace_id cannot be empty".to_string(),
            ));
        }
        if self.log_type.trim().is_empty() {
            return Err(ShipperError::InvalidConfig(
                "log_type cannot be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ShipperError::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_queued_batches == 0 {
            return Err(ShipperError::InvalidConfig(
                "max_queued_batches must be greater than 0".to_string(),
            ));
        }
        if self.shared_key.trim().is_empty() {
            return Err(ShipperError::InvalidConfig(
                "shared_key cannot be empty".to_string(),
            ));
        }
        if let Err(e) = STANDARD.decode(self.shared_key.trim()) {
            return Err(ShipperError::Signer(
                crate::logs::signer::SignError::InvalidKeyEncoding(e.to_string()),
            ));
        }
        Ok(())
    }

    /// Base URL of the ingestion endpoint, without path or query.
    #[must_use]
    pub fn ingestion_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) if !endpoint.is_empty() => endpoint.clone(),
            _ => format!("https://{}.{}", self.workspace_id, self.ingestion_domain),
        }
    }

    #[must_use]
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_seconds)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// Load configuration from an optional YAML file and environment variables.
///
/// This loads configuration in priority order:
/// 1. Defaults
/// 2. YAML file (when a path is given)
/// 3. Environment variables (highest priority)
#[must_use]
pub fn get_config(config_file: Option<&Path>) -> Config {
    let mut builder = ConfigBuilder::default();
    if let Some(path) = config_file {
        builder = builder.add_source(Box::new(YamlConfigSource {
            path: path.to_path_buf(),
        }));
    }
    builder.add_source(Box::new(EnvConfigSource)).build()
}

/// Accepts strings and numbers, trimming strings and treating empty ones as unset.
pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Null => Ok(None),
        other => {
            error!("Expected a string, got {:?}, ignoring", other);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            let config = get_config(None);
            assert_eq!(config.batch_size, 100);
            assert_eq!(config.retry_count, 3);
            assert_eq!(config.retry_delay_seconds, 5);
            assert_eq!(config.request_timeout_seconds, 30);
            assert_eq!(config.ingestion_domain, "ods.opinsights.azure.com");
            assert_eq!(config.default_component, "General");
            assert!(config.echo_records);
            Ok(())
        });
    }

    #[test]
    fn test_parse_env() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("LOG_SHIPPER_WORKSPACE_ID", "ws-1234");
            jail.set_env("LOG_SHIPPER_SHARED_KEY", "c2VjcmV0");
            jail.set_env("LOG_SHIPPER_LOG_TYPE", "ProvisioningLog");
            jail.set_env("LOG_SHIPPER_BATCH_SIZE", "25");
            jail.set_env("LOG_SHIPPER_BATCH_TIMEOUT_SECONDS", "10");
            jail.set_env("LOG_SHIPPER_RETRY_COUNT", "5");
            jail.set_env("LOG_SHIPPER_RETRY_DELAY_SECONDS", "2");
            jail.set_env("LOG_SHIPPER_LOG_LEVEL", "debug");
            jail.set_env("LOG_SHIPPER_ECHO_RECORDS", "false");
            let config = get_config(None);
            assert_eq!(config.workspace_id, "ws-1234");
            assert_eq!(config.shared_key, "c2VjcmV0");
            assert_eq!(config.log_type, "ProvisioningLog");
            assert_eq!(config.batch_size, 25);
            assert_eq!(config.batch_timeout_seconds, 10);
            assert_eq!(config.retry_count, 5);
            assert_eq!(config.retry_delay_seconds, 2);
            assert_eq!(config.log_level, LogLevel::Debug);
            assert!(!config.echo_records);
            Ok(())
        });
    }

    #[test]
    fn test_precedence() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "log-shipper.yaml",
                r"
workspace_id: from-yaml
log_type: YamlLog
batching:
  batch_size: 50
",
            )?;
            jail.set_env("LOG_SHIPPER_WORKSPACE_ID", "from-env");
            let config = get_config(Some(Path::new("log-shipper.yaml")));
            assert_eq!(config.workspace_id, "from-env");
            assert_eq!(config.log_type, "YamlLog");
            assert_eq!(config.batch_size, 50);
            Ok(())
        });
    }

    #[test]
    fn test_numeric_workspace_id_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("LOG_SHIPPER_WORKSPACE_ID", "123456");
            let config = get_config(None);
            assert_eq!(config.workspace_id, "123456");
            Ok(())
        });
    }

    #[test]
    fn test_https_proxy_fallback() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("HTTPS_PROXY", "http://proxy.corp:3128");
            let config = get_config(None);
            assert_eq!(config.proxy_https, Some("http://proxy.corp:3128".to_string()));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_proxy_wins_over_https_proxy() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("HTTPS_PROXY", "http://proxy.corp:3128");
            jail.set_env("LOG_SHIPPER_PROXY_HTTPS", "http://other.corp:8080");
            let config = get_config(None);
            assert_eq!(config.proxy_https, Some("http://other.corp:8080".to_string()));
            Ok(())
        });
    }

    #[test]
    fn test_endpoint_normalized() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("LOG_SHIPPER_ENDPOINT", "sink.internal:8443/");
            let config = get_config(None);
            assert_eq!(config.ingestion_url(), "https://sink.internal:8443");
            Ok(())
        });
    }

    #[test]
    fn test_ingestion_url_default() {
        let config = Config {
            workspace_id: "ws-1".to_string(),
            ..Default::default()
        };
        assert_eq!(config.ingestion_url(), "https://ws-1.ods.opinsights.azure.com");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("http://localhost:1234"), "http://localhost:1234");
        assert_eq!(normalize_url(" example.com "), "https://example.com");
        assert_eq!(normalize_url(""), "");
    }

    #[test]
    fn test_validate() {
        let valid = Config {
            workspace_id: "ws".to_string(),
            shared_key: "c2VjcmV0".to_string(),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let empty_workspace = Config {
            workspace_id: "  ".to_string(),
            ..valid.clone()
        };
        assert!(matches!(
            empty_workspace.validate(),
            Err(ShipperError::InvalidConfig(_))
        ));

        let zero_batch = Config {
            batch_size: 0,
            ..valid.clone()
        };
        assert!(matches!(
            zero_batch.validate(),
            Err(ShipperError::InvalidConfig(_))
        ));

        let blank_key = Config {
            shared_key: " \t ".to_string(),
            ..valid.clone()
        };
        assert!(matches!(
            blank_key.validate(),
            Err(ShipperError::InvalidConfig(msg)) if msg.contains("shared_key")
        ));

        let bad_key = Config {
            shared_key: "not base64!".to_string(),
            ..valid
        };
        assert!(matches!(bad_key.validate(), Err(ShipperError::Signer(_))));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.batch_timeout(), Duration::from_secs(30));
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! YAML file-based configuration.
//!
//! The file groups related settings into sections; top-level keys cover the
//! sink identity.
//!
//! # Example Configuration
//!
//! ```yaml
//! workspace_id: 0b2f6c1e-0000-4000-8000-000000000000
//! shared_key: c3VwZXItc2VjcmV0LXNoYXJlZC1rZXk=
//! log_type: OperationsLog
//! log_level: info
//! default_component: Installer
//!
//! batching:
//!   batch_size: 100
//!   batch_timeout_seconds: 30
//!
//! retry:
//!   retry_count: 3
//!   retry_delay_seconds: 5
//!
//! proxy:
//!   https: http://proxy.corp:3128
//!
//! files:
//!   local_log_path: /var/log/log-shipper/records.jsonl
//!   fallback_path: /var/log/log-shipper/dropped.jsonl
//! ```

use std::path::PathBuf;

use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::Deserialize;

use crate::{
    config::{
        deserialize_optional_string, log_level::LogLevel, Config, ConfigError, ConfigSource,
    },
    merge_option, merge_option_to_value, merge_string,
};

/// `YamlConfig` mirrors the layout of the YAML file.
///
/// It is deserialized on its own and then merged into [`Config`].
#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfig {
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub workspace_id: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub shared_key: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub log_type: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub ingestion_domain: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub endpoint: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub default_component: Option<String>,
    pub log_level: Option<LogLevel>,
    pub echo_records: Option<bool>,

    pub batching: BatchingConfig,
    pub retry: RetryConfig,
    pub proxy: ProxyConfig,
    pub files: FilesConfig,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BatchingConfig {
    pub batch_size: Option<usize>,
    pub batch_timeout_seconds: Option<u64>,
    pub max_queued_batches: Option<usize>,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RetryConfig {
    pub retry_count: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
    pub request_timeout_seconds: Option<u64>,
    pub shutdown_timeout_seconds: Option<u64>,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProxyConfig {
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub https: Option<String>,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FilesConfig {
    pub local_log_path: Option<PathBuf>,
    pub fallback_path: Option<PathBuf>,
}

fn merge_config(config: &mut Config, yaml_config: &YamlConfig) {
    merge_string!(config, yaml_config, workspace_id);
    merge_string!(config, yaml_config, shared_key);
    merge_string!(config, yaml_config, log_type);
    merge_string!(config, yaml_config, ingestion_domain);
    merge_option!(config, yaml_config, endpoint);
    merge_string!(config, yaml_config, default_component);
    merge_option_to_value!(config, yaml_config, log_level);
    merge_option_to_value!(config, yaml_config, echo_records);

    // Batching
    merge_option_to_value!(config, yaml_config.batching, batch_size);
    merge_option_to_value!(config, yaml_config.batching, batch_timeout_seconds);
    merge_option_to_value!(config, yaml_config.batching, max_queued_batches);

    // Retry
    merge_option_to_value!(config, yaml_config.retry, retry_count);
    merge_option_to_value!(config, yaml_config.retry, retry_delay_seconds);
    merge_option_to_value!(config, yaml_config.retry, request_timeout_seconds);
    merge_option_to_value!(config, yaml_config.retry, shutdown_timeout_seconds);

    // Proxy
    merge_option!(config, proxy_https, yaml_config.proxy, https);

    // Files
    merge_option!(config, yaml_config.files, local_log_path);
    merge_option!(config, yaml_config.files, fallback_path);
}

#[derive(Debug, PartialEq, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfigSource {
    pub path: PathBuf,
}

impl ConfigSource for YamlConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Yaml::file(self.path.clone()));

        match figment.extract::<YamlConfig>() {
            Ok(yaml_config) => merge_config(config, &yaml_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from yaml file {}: {e}, using default config.",
                    self.path.display()
                )));
            }
        }

        Ok(())
    }
}

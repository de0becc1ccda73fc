// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Environment variable configuration source.
//!
//! Every field of [`Config`] can be set through a `LOG_SHIPPER_` prefixed
//! variable, e.g. `LOG_SHIPPER_WORKSPACE_ID` or `LOG_SHIPPER_RETRY_COUNT`.
//! This source is applied last, so it overrides the YAML file.

use std::path::PathBuf;

use figment::{providers::Env, Figment};
use serde::Deserialize;

use crate::{
    config::{
        deserialize_optional_string, log_level::LogLevel, Config, ConfigError, ConfigSource,
    },
    merge_option, merge_option_to_value, merge_string,
};

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfig {
    /// @env `LOG_SHIPPER_WORKSPACE_ID`
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub workspace_id: Option<String>,
    /// @env `LOG_SHIPPER_SHARED_KEY`
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub shared_key: Option<String>,
    /// @env `LOG_SHIPPER_LOG_TYPE`
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub log_type: Option<String>,
    /// @env `LOG_SHIPPER_INGESTION_DOMAIN`
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub ingestion_domain: Option<String>,
    /// @env `LOG_SHIPPER_ENDPOINT`
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub endpoint: Option<String>,
    /// @env `LOG_SHIPPER_PROXY_HTTPS`
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub proxy_https: Option<String>,

    /// @env `LOG_SHIPPER_BATCH_SIZE`
    pub batch_size: Option<usize>,
    /// @env `LOG_SHIPPER_BATCH_TIMEOUT_SECONDS`
    pub batch_timeout_seconds: Option<u64>,
    /// @env `LOG_SHIPPER_MAX_QUEUED_BATCHES`
    pub max_queued_batches: Option<usize>,

    /// @env `LOG_SHIPPER_RETRY_COUNT`
    pub retry_count: Option<u32>,
    /// @env `LOG_SHIPPER_RETRY_DELAY_SECONDS`
    pub retry_delay_seconds: Option<u64>,
    /// @env `LOG_SHIPPER_REQUEST_TIMEOUT_SECONDS`
    pub request_timeout_seconds: Option<u64>,
    /// @env `LOG_SHIPPER_SHUTDOWN_TIMEOUT_SECONDS`
    pub shutdown_timeout_seconds: Option<u64>,

    /// @env `LOG_SHIPPER_DEFAULT_COMPONENT`
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub default_component: Option<String>,
    /// @env `LOG_SHIPPER_LOG_LEVEL`
    pub log_level: Option<LogLevel>,
    /// @env `LOG_SHIPPER_ECHO_RECORDS`
    pub echo_records: Option<bool>,
    /// @env `LOG_SHIPPER_LOCAL_LOG_PATH`
    pub local_log_path: Option<PathBuf>,
    /// @env `LOG_SHIPPER_FALLBACK_PATH`
    pub fallback_path: Option<PathBuf>,
}

fn merge_config(config: &mut Config, env_config: &EnvConfig) {
    // Sink
    merge_string!(config, env_config, workspace_id);
    merge_string!(config, env_config, shared_key);
    merge_string!(config, env_config, log_type);
    merge_string!(config, env_config, ingestion_domain);
    merge_option!(config, env_config, endpoint);
    merge_option!(config, env_config, proxy_https);

    // Batching
    merge_option_to_value!(config, env_config, batch_size);
    merge_option_to_value!(config, env_config, batch_timeout_seconds);
    merge_option_to_value!(config, env_config, max_queued_batches);

    // Transport
    merge_option_to_value!(config, env_config, retry_count);
    merge_option_to_value!(config, env_config, retry_delay_seconds);
    merge_option_to_value!(config, env_config, request_timeout_seconds);
    merge_option_to_value!(config, env_config, shutdown_timeout_seconds);

    // Local output
    merge_string!(config, env_config, default_component);
    merge_option_to_value!(config, env_config, log_level);
    merge_option_to_value!(config, env_config, echo_records);
    merge_option!(config, env_config, local_log_path);
    merge_option!(config, env_config, fallback_path);
}

#[derive(Debug, PartialEq, Clone, Copy)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Env::prefixed("LOG_SHIPPER_"));

        match figment.extract::<EnvConfig>() {
            Ok(env_config) => merge_config(config, &env_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from environment variables: {e}, using default config.",
                )));
            }
        }

        Ok(())
    }
}

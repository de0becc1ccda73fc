// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Verbosity of the shipper's own diagnostic output.
//!
//! This is not the severity of shipped records (see
//! [`crate::logs::record::Severity`]); it only controls what the `tracing`
//! subscriber installed by the CLI lets through.
//!
//! # Configuration
//!
//! - **Environment variable**: `LOG_SHIPPER_LOG_LEVEL=debug`
//! - **YAML config**: `log_level: debug`
//!
//! Unknown values fall back to **INFO**.

use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;

/// Diagnostic log level, ordered from least to most verbose.
///
/// ```
/// use log_shipper::config::log_level::LogLevel;
/// use std::str::FromStr;
///
/// assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
/// assert!(LogLevel::from_str("verbose").is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Very serious errors that prevent records from being shipped.
    Error,
    /// Dropped batches, local file failures.
    Warn,
    /// Startup, shutdown, and flush summaries. This is the **default**.
    #[default]
    Info,
    /// Per-attempt transport details.
    Debug,
    /// Everything, including every echoed record.
    Trace,
}

impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl LogLevel {
    /// Builds an `EnvFilter` directive string for this level.
    ///
    /// HTTP stack crates are silenced so a debug run does not drown in
    /// connection-pool chatter.
    #[must_use]
    pub fn as_env_filter(self) -> String {
        format!("h2=off,hyper=off,hyper_util=off,rustls=off,reqwest=warn,{}", self.as_ref())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Invalid log level: '{s}'. Valid levels are: error, warn, info, debug, trace",
            )),
        }
    }
}

/// Lenient deserialization: invalid input logs an error and yields the default.
impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            match LogLevel::from_str(&s) {
                Ok(level) => Ok(level),
                Err(e) => {
                    error!("{}", e);
                    Ok(LogLevel::default())
                }
            }
        } else {
            error!("Expected a string for log level, got {:?}", value);
            Ok(LogLevel::default())
        }
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Reads records from stdin and ships them.
//!
//! Each line is either a JSON object
//!
//! ```json
//! {"message": "Copied 42 files", "level": "success", "component": "Blob", "metrics": {"Files": 42}}
//! ```
//!
//! or plain text, which is shipped as an `Info` message. Configuration comes
//! from the YAML file named by `LOG_SHIPPER_CONFIG_FILE` and `LOG_SHIPPER_*`
//! environment variables.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use log_shipper::{config, logger::Formatter, RecordOptions, Severity, TelemetryClient};

#[derive(Debug, Deserialize)]
struct InputLine {
    message: String,
    level: Option<String>,
    component: Option<String>,
    event_name: Option<String>,
    correlation_id: Option<Uuid>,
    operation_id: Option<Uuid>,
    duration_ms: Option<f64>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
    #[serde(default)]
    metrics: BTreeMap<String, f64>,
}

#[derive(Debug, PartialEq)]
struct Entry {
    message: String,
    level: Severity,
    component: String,
    options: RecordOptions,
}

/// Parses one input line. Blank lines yield `None`.
fn parse_line(line: &str) -> Result<Option<Entry>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if !trimmed.starts_with('{') {
        return Ok(Some(Entry {
            message: trimmed.to_string(),
            level: Severity::Info,
            component: String::new(),
            options: RecordOptions::default(),
        }));
    }

    let input: InputLine =
        serde_json::from_str(trimmed).map_err(|e| format!("invalid JSON record: {e}"))?;
    let level = match input.level.as_deref() {
        Some(level) => Severity::from_str(level).map_err(|e| e.to_string())?,
        None => Severity::Info,
    };

    Ok(Some(Entry {
        message: input.message,
        level,
        component: input.component.unwrap_or_default(),
        options: RecordOptions {
            correlation_id: input.correlation_id,
            operation_id: input.operation_id,
            event_name: input.event_name,
            duration_ms: input.duration_ms,
            properties: input.properties,
            metrics: input.metrics,
        },
    }))
}

#[tokio::main]
pub async fn main() {
    let config_file = env::var("LOG_SHIPPER_CONFIG_FILE").ok().map(PathBuf::from);
    let config = config::get_config(config_file.as_deref());

    let env_filter = EnvFilter::try_new(config.log_level.as_env_filter())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .event_format(Formatter)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("LOG_SHIPPER | ERROR | Failed to install subscriber: {e}");
    }

    debug!("Logging subsystem enabled");

    let client = match TelemetryClient::start(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to start log shipper: {}", e);
            process::exit(1);
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(entry)) => {
                        if let Err(e) = client.log(&entry.message, entry.level, &entry.component, entry.options) {
                            warn!("Skipping record: {}", e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Skipping line: {}", e),
                },
                Ok(None) => {
                    debug!("End of input");
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shipping pending records");
                break;
            }
        }
    }

    let timeout = client.config().shutdown_timeout();
    if let Err(e) = client.shutdown(timeout).await {
        error!("Shutdown failed: {}", e);
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for the ingestion endpoint.
//!
//! The client supports:
//! - **Proxy support**: HTTPS proxy from `proxy_https` (or `HTTPS_PROXY`)
//! - **Timeouts**: `request_timeout_seconds` applied to every attempt
//! - **Connection pooling**: Idle timeout and TCP keep-alive
//!
//! A misconfigured proxy is logged and the client falls back to a direct
//! connection so records still have a chance to be shipped.

use std::error::Error;
use std::time::Duration;

use tracing::error;

use crate::config::Config;
use crate::error::ShipperError;

/// Creates a configured HTTP client.
///
/// If the proxy configuration is invalid, logs an error and builds a client
/// without the proxy.
pub fn get_client(config: &Config) -> Result<reqwest::Client, ShipperError> {
    match build_client(config, true) {
        Ok(client) => Ok(client),
        Err(e) => {
            error!(
                "HTTP | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client(config, false).map_err(|inner| ShipperError::HttpClient(inner.to_string()))
        }
    }
}

fn build_client(config: &Config, allow_proxy: bool) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        // Detect dead connections between sparse flushes
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.proxy_https {
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}

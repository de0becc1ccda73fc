// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hostname detection utilities

use std::env;
use tracing::warn;

/// Get the system hostname
///
/// This function tries multiple methods to determine the hostname:
/// 1. COMPUTERNAME environment variable (set on Windows hosts)
/// 2. HOSTNAME environment variable
/// 3. System hostname via the `hostname` crate
/// 4. Fallback to "unknown" if all methods fail
#[must_use]
pub fn get_hostname() -> String {
    for var in ["COMPUTERNAME", "HOSTNAME"] {
        if let Ok(hostname) = env::var(var) {
            // Empty string means not set
            if !hostname.trim().is_empty() {
                return hostname.trim().to_string();
            }
        }
    }

    match hostname::get() {
        Ok(hostname_osstr) => {
            // Non-UTF8 hostnames are ignored
            if let Some(hostname_str) = hostname_osstr.to_str() {
                if !hostname_str.is_empty() {
                    return hostname_str.to_string();
                }
            }
        }
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
        }
    }

    warn!("Could not determine hostname, using 'unknown'");
    "unknown".to_string()
}

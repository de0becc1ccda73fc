// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `SharedKey` request signing.
//!
//! The ingestion API authenticates each request with an HMAC-SHA256 over a
//! canonical string built from the request:
//!
//! ```text
//! POST\n{content-length}\napplication/json\nx-ms-date:{rfc1123 date}\n/api/logs
//! ```
//!
//! keyed with the base64-decoded workspace shared key. The header value is
//! `SharedKey {workspace_id}:{base64(hmac)}`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignError {
    #[error("shared key is not valid base64: {0}")]
    InvalidKeyEncoding(String),
}

/// Formats a timestamp for the `x-ms-date` header, e.g. `Mon, 19 Oct 2026 12:00:00 GMT`.
#[must_use]
pub fn rfc1123_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Builds the string that gets signed.
#[must_use]
pub fn canonical_string(
    method: &str,
    content_length: usize,
    content_type: &str,
    date: &str,
    resource_path: &str,
) -> String {
    format!("{method}\n{content_length}\n{content_type}\nx-ms-date:{date}\n{resource_path}")
}

/// Signs requests for one workspace. The key is decoded once, here.
#[derive(Clone)]
pub struct SharedKeySigner {
    workspace_id: String,
    mac: HmacSha256,
}

// Keeps the decoded key out of debug output.
impl std::fmt::Debug for SharedKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeySigner")
            .field("workspace_id", &self.workspace_id)
            .finish_non_exhaustive()
    }
}

impl SharedKeySigner {
    pub fn new(workspace_id: impl Into<String>, shared_key: &str) -> Result<Self, SignError> {
        let key = STANDARD
            .decode(shared_key.trim())
            .map_err(|e| SignError::InvalidKeyEncoding(e.to_string()))?;
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| SignError::InvalidKeyEncoding(e.to_string()))?;
        Ok(Self {
            workspace_id: workspace_id.into(),
            mac,
        })
    }

    #[must_use]
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Returns the `Authorization` header value for a request.
    #[must_use]
    pub fn sign(
        &self,
        method: &str,
        content_length: usize,
        content_type: &str,
        date: &str,
        resource_path: &str,
    ) -> String {
        let canonical =
            canonical_string(method, content_length, content_type, date, resource_path);
        let mut mac = self.mac.clone();
        mac.update(canonical.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        format!("SharedKey {}:{signature}", self.workspace_id)
    }
}

/// One-shot signing with an encoded key.
pub fn sign(
    workspace_id: &str,
    shared_key: &str,
    method: &str,
    content_length: usize,
    content_type: &str,
    date: &str,
    resource_path: &str,
) -> Result<String, SignError> {
    Ok(SharedKeySigner::new(workspace_id, shared_key)?.sign(
        method,
        content_length,
        content_type,
        date,
        resource_path,
    ))
}

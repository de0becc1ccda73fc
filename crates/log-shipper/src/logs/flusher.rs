// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch delivery to the ingestion endpoint with fixed-delay retries.
//!
//! ```text
//!   detached batch
//!        │
//!        v
//!   ┌─────────────┐
//!   │  Serialize  │ (JSON array of flattened records)
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │    Sign     │ (SharedKey, fresh x-ms-date per attempt)
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │  HTTP POST  │ (per-attempt timeout)
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │   Retry?    │ (network error, timeout, any non-2xx)
//!   └─────────────┘
//! ```
//!
//! Attempts are strictly sequential: the first attempt plus up to
//! `retry_count` retries, separated by a fixed `retry_delay`. When all
//! attempts fail the batch is given up on; the caller decides what to record.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::ShipperError;
use crate::logs::constants;
use crate::logs::record::LogRecord;
use crate::logs::signer::{rfc1123_date, SharedKeySigner};

/// Response bodies are only kept for diagnostics, so they are cut short.
const MAX_ERROR_BODY_LEN: usize = 512;

/// Why a single attempt failed. Every variant is retryable.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("ingestion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to serialize batch: {0}")]
    Serialization(String),

    #[error("failed to build request: {0}")]
    Request(String),

    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: AttemptError,
    },
}

/// Successful outcome of [`BatchSender::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The endpoint accepted the batch.
    Sent { status: u16, attempts: u32 },
    /// Nothing to send; no request was made.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retry_count: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry_count: config.retry_count,
            retry_delay: config.retry_delay(),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }
}

/// Seam between the sender task and the network.
#[async_trait]
pub trait BatchSender: Send + Sync {
    async fn send(&self, batch: &[LogRecord]) -> Result<Ack, TransportError>;
}

#[derive(Debug, Clone)]
pub struct Flusher {
    client: reqwest::Client,
    url: String,
    signer: SharedKeySigner,
    headers: HeaderMap,
    policy: RetryPolicy,
    request_timeout: Duration,
}

impl Flusher {
    /// Builds a flusher for the configured workspace.
    ///
    /// Fails if the shared key is not base64 or a header value cannot be
    /// represented, so those mistakes surface at startup.
    pub fn new(config: &Config, client: reqwest::Client) -> Result<Self, ShipperError> {
        let signer = SharedKeySigner::new(config.workspace_id.trim(), &config.shared_key)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "Log-Type",
            HeaderValue::from_str(&config.log_type).map_err(|e| {
                ShipperError::InvalidConfig(format!("log_type is not a valid header value: {e}"))
            })?,
        );
        headers.insert(
            "time-generated-field",
            HeaderValue::from_static(constants::TIME_GENERATED_FIELD),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(constants::CONTENT_TYPE));

        // The workspace id ends up in the Authorization header.
        HeaderValue::from_str(&signer.sign("POST", 0, constants::CONTENT_TYPE, "", "")).map_err(
            |e| ShipperError::InvalidConfig(format!("workspace_id is not a valid header value: {e}")),
        )?;

        let url = format!(
            "{}{}?api-version={}",
            config.ingestion_url(),
            constants::RESOURCE_PATH,
            constants::API_VERSION
        );

        Ok(Flusher {
            client,
            url,
            signer,
            headers,
            policy: RetryPolicy::from_config(config),
            request_timeout: config.request_timeout(),
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sends a batch, retrying with a fixed delay.
    pub async fn send(&self, batch: &[LogRecord]) -> Result<Ack, TransportError> {
        if batch.is_empty() {
            return Ok(Ack::Skipped);
        }

        let body =
            serde_json::to_vec(batch).map_err(|e| TransportError::Serialization(e.to_string()))?;
        let max_attempts = self.policy.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let time = Instant::now();
            let request = self.create_request(body.clone())?;
            let result = self.attempt(request).await;
            let elapsed = time.elapsed();

            match result {
                Ok(status) => {
                    debug!(
                        "LOGS | Sent {} records in {} ms after {} attempt(s)",
                        batch.len(),
                        elapsed.as_millis(),
                        attempts
                    );
                    return Ok(Ack::Sent { status, attempts });
                }
                Err(e) if attempts >= max_attempts => {
                    error!(
                        "LOGS | Failed to send {} records after {} attempts: {}",
                        batch.len(),
                        attempts,
                        e
                    );
                    return Err(TransportError::Exhausted { attempts, last: e });
                }
                Err(e) => {
                    warn!(
                        "LOGS | Attempt {}/{} failed after {} ms: {}, retrying in {:?}",
                        attempts,
                        max_attempts,
                        elapsed.as_millis(),
                        e,
                        self.policy.retry_delay
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        }
    }

    fn create_request(&self, body: Vec<u8>) -> Result<reqwest::RequestBuilder, TransportError> {
        let date = rfc1123_date(Utc::now());
        let authorization = self.signer.sign(
            "POST",
            body.len(),
            constants::CONTENT_TYPE,
            &date,
            constants::RESOURCE_PATH,
        );

        let mut headers = self.headers.clone();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization)
                .map_err(|e| TransportError::Request(e.to_string()))?,
        );
        headers.insert(
            "x-ms-date",
            HeaderValue::from_str(&date).map_err(|e| TransportError::Request(e.to_string()))?,
        );

        Ok(self
            .client
            .post(&self.url)
            .timeout(self.request_timeout)
            .headers(headers)
            .body(body))
    }

    async fn attempt(&self, request: reqwest::RequestBuilder) -> Result<u16, AttemptError> {
        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(status.as_u16());
                }
                let mut body = resp.text().await.unwrap_or_default();
                if body.len() > MAX_ERROR_BODY_LEN {
                    let mut end = MAX_ERROR_BODY_LEN;
                    while !body.is_char_boundary(end) {
                        end -= 1;
                    }
                    body.truncate(end);
                }
                Err(AttemptError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
            Err(e) if e.is_timeout() => Err(AttemptError::Timeout(self.request_timeout)),
            Err(e) => Err(AttemptError::Network(e.to_string())),
        }
    }
}

#[async_trait]
impl BatchSender for Flusher {
    async fn send(&self, batch: &[LogRecord]) -> Result<Ack, TransportError> {
        Flusher::send(self, batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::aggregator::tests::record;
    use mockito::{Matcher, Server};

    const KEY: &str = "c3VwZXItc2VjcmV0LXNoYXJlZC1rZXk=";

    fn config(endpoint: String) -> Config {
        Config {
            workspace_id: "workspace-123".to_string(),
            shared_key: KEY.to_string(),
            log_type: "ProvisioningLog".to_string(),
            endpoint: Some(endpoint),
            ..Default::default()
        }
    }

    fn flusher(config: &Config, retry_count: u32) -> Flusher {
        Flusher::new(config, reqwest::Client::new())
            .expect("valid flusher")
            .with_retry_policy(RetryPolicy {
                retry_count,
                retry_delay: Duration::from_millis(20),
            })
    }

    fn api_version() -> Matcher {
        Matcher::UrlEncoded("api-version".into(), "2016-04-01".into())
    }

    #[test]
    fn test_url_from_workspace() {
        let config = Config {
            workspace_id: "ws-1".to_string(),
            shared_key: KEY.to_string(),
            ..Default::default()
        };
        let flusher = Flusher::new(&config, reqwest::Client::new()).unwrap();
        assert_eq!(
            flusher.url(),
            "https://ws-1.ods.opinsights.azure.com/api/logs?api-version=2016-04-01"
        );
        assert_eq!(flusher.retry_policy().max_attempts(), 4);
    }

    #[test]
    fn test_invalid_key_fails_construction() {
        let config = Config {
            shared_key: "%%%".to_string(),
            ..config("http://127.0.0.1:1".to_string())
        };
        assert!(matches!(
            Flusher::new(&config, reqwest::Client::new()),
            Err(ShipperError::Signer(_))
        ));
    }

    #[test]
    fn test_invalid_log_type_fails_construction() {
        let config = Config {
            log_type: "bad\nlog".to_string(),
            ..config("http://127.0.0.1:1".to_string())
        };
        assert!(matches!(
            Flusher::new(&config, reqwest::Client::new()),
            Err(ShipperError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_sends_signed_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/logs")
            .match_query(api_version())
            .match_header("Log-Type", "ProvisioningLog")
            .match_header("time-generated-field", "TimeGenerated")
            .match_header("Content-Type", "application/json")
            .match_header(
                "Authorization",
                Matcher::Regex(r"^SharedKey workspace-123:[A-Za-z0-9+/]{43}=$".to_string()),
            )
            .match_header(
                "x-ms-date",
                Matcher::Regex(r"^[A-Z][a-z]{2}, \d{2} [A-Z][a-z]{2} \d{4} \d{2}:\d{2}:\d{2} GMT$".to_string()),
            )
            .match_body(Matcher::Regex(r#""Message":"hello""#.to_string()))
            .with_status(200)
            .create_async()
            .await;

        let flusher = flusher(&config(server.url()), 3);
        let ack = flusher.send(&[record("hello")]).await.unwrap();

        assert_eq!(ack, Ack::Sent { status: 200, attempts: 1 });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("POST", "/api/logs")
            .match_query(api_version())
            .with_status(500)
            .expect(2)
            .create_async()
            .await;
        let succeeding = server
            .mock("POST", "/api/logs")
            .match_query(api_version())
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let flusher = flusher(&config(server.url()), 3);
        let ack = flusher.send(&[record("retry me")]).await.unwrap();

        assert_eq!(ack, Ack::Sent { status: 200, attempts: 3 });
        failing.assert_async().await;
        succeeding.assert_async().await;
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_count() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/logs")
            .match_query(api_version())
            .with_status(403)
            .with_body("forbidden")
            .expect(3)
            .create_async()
            .await;

        let flusher = flusher(&config(server.url()), 2);
        let start = Instant::now();
        let err = flusher.send(&[record("nope")]).await.unwrap_err();

        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(
            err,
            TransportError::Exhausted {
                attempts: 3,
                last: AttemptError::Status {
                    status: 403,
                    body: "forbidden".to_string()
                }
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_sent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/logs")
            .match_query(api_version())
            .expect(0)
            .create_async()
            .await;

        let flusher = flusher(&config(server.url()), 3);
        assert_eq!(flusher.send(&[]).await.unwrap(), Ack::Skipped);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        // Accepts connections into the backlog but never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let config = Config {
            request_timeout_seconds: 1,
            ..config(endpoint)
        };
        let flusher = flusher(&config, 1);

        let err = flusher.send(&[record("slow")]).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Exhausted {
                attempts: 2,
                last: AttemptError::Timeout(Duration::from_secs(1))
            }
        );
        drop(listener);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let flusher = flusher(&config(endpoint), 0);
        let err = flusher.send(&[record("refused")]).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Exhausted {
                attempts: 1,
                last: AttemptError::Network(_)
            }
        ));
    }
}

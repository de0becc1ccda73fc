// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Constants for the log ingestion API and pipeline defaults.
//!
//! The ingestion endpoint is addressed as
//! `https://{workspace_id}.{ingestion_domain}{RESOURCE_PATH}?api-version={API_VERSION}`.

/// Data collector API version sent as the `api-version` query parameter.
pub const API_VERSION: &str = "2016-04-01";

/// Resource path of the ingestion endpoint. Also the last line of the signed
/// canonical string.
pub const RESOURCE_PATH: &str = "/api/logs";

/// Content type of every batch payload.
pub const CONTENT_TYPE: &str = "application/json";

/// Name of the payload field the service should use as the record time.
pub const TIME_GENERATED_FIELD: &str = "TimeGenerated";

/// Prefix applied to metric names when they are flattened into a record.
pub const METRIC_PREFIX: &str = "Metric_";

pub const DEFAULT_LOG_TYPE: &str = "OperationsLog";
pub const DEFAULT_INGESTION_DOMAIN: &str = "ods.opinsights.azure.com";
pub const DEFAULT_COMPONENT: &str = "General";

/// Records per batch before an automatic flush.
///
/// # Value: 100 records
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Time since the last detach after which pending records are shipped.
pub const DEFAULT_BATCH_TIMEOUT_SECONDS: u64 = 30;

/// Detached batches that may wait for the sender task. A full queue drops the
/// newest batch instead of blocking the logging call.
pub const DEFAULT_MAX_QUEUED_BATCHES: usize = 16;

/// Retries after the first attempt.
pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECONDS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 5;

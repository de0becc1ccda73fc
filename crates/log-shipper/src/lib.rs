// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Log Shipper
//!
//! Structured operational logging for provisioning and maintenance scripts,
//! shipped in batches to a remote log-ingestion endpoint that authenticates
//! requests with the `SharedKey` HMAC-SHA256 scheme.
//!
//! ## Overview
//!
//! ```text
//!   log() / log_immediate()
//!          │
//!          v
//!   ┌──────────────┐
//!   │ RecordBuilder│  (validate, stamp time + process context)
//!   └──────┬───────┘
//!          │
//!          v
//!   ┌──────────────┐
//!   │  Aggregator  │  (mutex-protected pending batch, size/age thresholds)
//!   └──────┬───────┘
//!          │ detached batches (bounded queue)
//!          v
//!   ┌──────────────┐
//!   │ FlushService │  (single sender task, stale timer, final drain)
//!   └──────┬───────┘
//!          │
//!          v
//!   ┌──────────────┐
//!   │   Flusher    │  (JSON, SharedKey signature, fixed-delay retry)
//!   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: configuration defaults, YAML file and environment sources
//! - [`logs`]: the record → batch → transport pipeline and the client handle
//! - [`logger`]: formatter for the shipper's own diagnostic output
//! - [`http`]: reqwest client construction
//! - [`proc`]: host, user, process and thread identity

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::module_name_repetitions)]

/// Configuration - YAML files, environment variables, and defaults
pub mod config;

/// Crate-level error type for startup failures
pub mod error;

/// HTTP client construction for the ingestion endpoint
pub mod http;

/// Diagnostic logging formatter
pub mod logger;

/// Record building, batching, signing, and delivery
pub mod logs;

/// Process utilities - hostname, user, process and thread identity
pub mod proc;

pub use error::ShipperError;
pub use logs::client::TelemetryClient;
pub use logs::record::{LogRecord, RecordOptions, Severity};

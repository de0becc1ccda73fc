// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured log shipping to a SharedKey-authenticated ingestion endpoint.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────────┐
//!              │  TelemetryClient │  log() / log_immediate() / flush()
//!              └────────┬─────────┘
//!                       │ RecordBuilder
//!                       v
//!              ┌──────────────────┐
//!              │    Aggregator    │  (Buffer, batch by count/age)
//!              └────────┬─────────┘
//!                       │ detached batches (bounded queue)
//!                       v
//!              ┌──────────────────┐
//!              │   FlushService   │  (single sender task + ticker)
//!              └────────┬─────────┘
//!                       │
//!                       v
//!              ┌──────────────────┐
//!              │     Flusher      │  (Sign, POST, fixed-delay retry)
//!              └────────┬─────────┘
//!                       │
//!                       v
//!              ┌──────────────────┐
//!              │ Ingestion API    │
//!              └──────────────────┘
//! ```
//!
//! # Components
//!
//! - **[`record`]**: Builds and serializes individual log records
//! - **[`aggregator`]**: Buffers records and decides when a batch is due
//! - **[`signer`]**: Computes the `SharedKey` authorization header
//! - **[`flusher`]**: Sends a batch with per-attempt timeout and retries
//! - **[`flush_service`]**: The sender task that owns the flusher
//! - **[`client`]**: The public entry point tying the pipeline together
//! - **[`local`]**: Optional JSON-lines files for records and dropped batches
//! - **[`constants`]**: API paths and pipeline defaults
//!
//! # Failure Model
//!
//! Only record construction errors reach the caller. Transport failures are
//! retried, then the batch is dropped and recorded locally.

pub mod aggregator;
pub mod client;
pub mod constants;
pub mod flush_service;
pub mod flusher;
pub mod local;
pub mod record;
pub mod signer;

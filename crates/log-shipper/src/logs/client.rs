// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The public entry point of the pipeline.
//!
//! A [`TelemetryClient`] owns its buffer, its sender task and its
//! configuration; several clients can live side by side.
//!
//! # Example
//!
//! ```rust,ignore
//! use log_shipper::{config, RecordOptions, Severity, TelemetryClient};
//!
//! let client = TelemetryClient::start(config::get_config(None))?;
//! client.log(
//!     "Feature installed",
//!     Severity::Success,
//!     "Installer",
//!     RecordOptions::default().with_property("FeatureName", "IIS-WebServer"),
//! )?;
//! client.shutdown(client.config().shutdown_timeout()).await?;
//! ```
//!
//! # State
//!
//! | State          | Meaning                                           |
//! |----------------|---------------------------------------------------|
//! | `Idle`         | nothing pending, nothing being sent               |
//! | `Accumulating` | records pending, nothing being sent               |
//! | `Flushing`     | the sender task is delivering a batch             |

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::error::ShipperError;
use crate::http;
use crate::logs::aggregator::Aggregator;
use crate::logs::flush_service::{
    DeliveryError, FlushHandle, FlushService, FlushServiceConfig, SharedBuffer,
};
use crate::logs::flusher::{Ack, BatchSender, Flusher};
use crate::logs::local::LocalFiles;
use crate::logs::record::{LogRecord, RecordBuilder, RecordError, RecordOptions, Severity};
use crate::proc::ProcessContext;

/// Extra time given to the sender task beyond the drain budget before it is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Accumulating,
    Flushing,
}

/// Call [`TelemetryClient::shutdown`] before the runtime stops. A client
/// dropped without it records its pending records in the fallback file and
/// leaves only already queued batches to the sender task.
pub struct TelemetryClient {
    config: Arc<Config>,
    builder: RecordBuilder,
    buffer: Arc<SharedBuffer>,
    handle: FlushHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryClient {
    /// Validates the configuration and starts the sender task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: Config) -> Result<Self, ShipperError> {
        config.validate()?;
        let client = http::get_client(&config)?;
        let flusher = Flusher::new(&config, client)?;
        info!(
            "LOGS | Shipping {} records to {}",
            config.log_type,
            flusher.url()
        );
        Ok(Self::with_sender(
            config,
            Arc::new(flusher),
            ProcessContext::detect(),
        ))
    }

    /// Starts a client on top of any [`BatchSender`].
    #[must_use]
    pub fn with_sender(
        config: Config,
        sender: Arc<dyn BatchSender>,
        context: ProcessContext,
    ) -> Self {
        let config = Arc::new(config);
        let builder = RecordBuilder::new(context, config.default_component.clone());
        let buffer = Arc::new(SharedBuffer::new(
            Aggregator::new(config.batch_size, config.batch_timeout()),
            LocalFiles::from_config(&config),
        ));
        let (service, handle) = FlushService::new(
            sender,
            buffer.clone(),
            FlushServiceConfig::from_config(&config),
        );
        let task = tokio::spawn(service.run());

        Self {
            config,
            builder,
            buffer,
            handle,
            task: Mutex::new(Some(task)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds a record and queues it for delivery.
    ///
    /// Never waits for the network. Only invalid input is reported; delivery
    /// problems are logged and recorded locally.
    pub fn log(
        &self,
        message: &str,
        level: Severity,
        component: &str,
        options: RecordOptions,
    ) -> Result<(), RecordError> {
        let record = self.build(message, level, component, options)?;

        let decision = match self.buffer.append(record) {
            Ok(decision) => decision,
            Err(record) => {
                self.buffer
                    .local()
                    .write_dropped(&[record], "client is shut down");
                return Ok(());
            }
        };
        if let Some(batch) = decision.into_batch() {
            debug!("LOGS | Dispatching batch of {} records", batch.len());
            if let Err(e) = self.handle.dispatch(batch) {
                let reason = e.reason();
                self.buffer.local().write_dropped(&e.into_batch(), reason);
            }
        }
        Ok(())
    }

    /// Builds a record and sends it on its own, waiting for the outcome.
    ///
    /// The send goes through the sender task, after anything already queued.
    /// Unlike [`TelemetryClient::log`], delivery failures are returned to the
    /// caller; the record is also written to the fallback file.
    pub async fn log_immediate(
        &self,
        message: &str,
        level: Severity,
        component: &str,
        options: RecordOptions,
    ) -> Result<Ack, DeliveryError> {
        let record = self.build(message, level, component, options)?;
        let result = self.handle.send_immediate(vec![record.clone()]).await;
        if matches!(result, Err(DeliveryError::NotRunning)) {
            self.buffer
                .local()
                .write_dropped(&[record], "sender task stopped");
        }
        result
    }

    /// Sends everything pending and waits until the sender task is done with it.
    pub async fn flush(&self) -> Result<(), ShipperError> {
        self.handle.flush().await
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        if self.buffer.is_flushing() {
            ClientState::Flushing
        } else if self.buffer.lock_aggregator().is_empty() {
            ClientState::Idle
        } else {
            ClientState::Accumulating
        }
    }

    /// Number of records waiting for a threshold.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.lock_aggregator().len()
    }

    /// Final drain: sends what is pending within `timeout`, records the rest
    /// locally, and stops the sender task.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShipperError> {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut task) = task else {
            return Err(ShipperError::NotRunning);
        };

        debug!("LOGS | Shutting down with a budget of {:?}", timeout);
        self.handle.begin_shutdown(timeout);

        match tokio::time::timeout(timeout + SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("LOGS | Sender task failed during shutdown: {}", e);
                self.drop_pending("sender task failed");
            }
            Err(_) => {
                error!("LOGS | Sender task did not stop in time, aborting it");
                task.abort();
                self.drop_pending("shutdown budget exhausted");
            }
        }
        Ok(())
    }

    fn drop_pending(&self, reason: &str) {
        let leftovers = self.buffer.close();
        if !leftovers.is_empty() {
            self.buffer.local().write_dropped(&leftovers, reason);
        }
    }

    fn build(
        &self,
        message: &str,
        level: Severity,
        component: &str,
        options: RecordOptions,
    ) -> Result<LogRecord, RecordError> {
        let record = self.builder.build(message, level, component, options)?;
        if self.config.echo_records {
            echo(&record);
        }
        self.buffer.local().write_record(&record);
        Ok(record)
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        let task = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if task.is_none() {
            return;
        }

        // The runtime may already be gone; the task cannot be relied on here.
        self.drop_pending("client dropped without shutdown");
        self.handle.begin_shutdown(self.config.shutdown_timeout());
    }
}

/// Mirrors a record as a local `tracing` event.
fn echo(record: &LogRecord) {
    let component = record.component.as_str();
    let operation_id = record.operation_id;
    match record.level {
        Severity::Trace => trace!(component, %operation_id, "{}", record.message),
        Severity::Debug => debug!(component, %operation_id, "{}", record.message),
        Severity::Info | Severity::Success => {
            info!(component, %operation_id, level = record.level.as_str(), "{}", record.message);
        }
        Severity::Warning => warn!(component, %operation_id, "{}", record.message),
        Severity::Error | Severity::Critical => {
            error!(component, %operation_id, level = record.level.as_str(), "{}", record.message);
        }
    }
}

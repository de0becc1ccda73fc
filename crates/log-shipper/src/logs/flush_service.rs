// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The sender task.
//!
//! A single [`FlushService`] owns the [`BatchSender`] and consumes detached
//! batches from a bounded queue, so at most one send is in flight and batches
//! leave in the order they were detached. It also ticks at the batch timeout
//! to ship records from processes that went quiet.
//!
//! ```text
//!   FlushHandle ──(bounded mpsc)──> FlushService::run
//!                                     │  Batch     -> send, record drop on failure
//!                                     │  Immediate -> send, reply with the outcome
//!                                     │  Flush     -> detach pending, send, reply
//!                                     │  tick      -> detach if stale, send
//!                                     └─ cancelled -> final drain within budget
//! ```
//!
//! # Shutdown
//!
//! [`FlushHandle::begin_shutdown`] cancels the loop. An interrupted send is
//! put back in front of the drain queue, queued commands and the pending
//! buffer follow, and everything is sent until the shutdown budget runs out.
//! Whatever is left is recorded locally as dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::ShipperError;
use crate::logs::aggregator::{Aggregator, FlushDecision};
use crate::logs::flusher::{Ack, BatchSender, TransportError};
use crate::logs::local::LocalFiles;
use crate::logs::record::{LogRecord, RecordError};

/// State shared between the logging call sites and the sender task.
#[derive(Debug)]
pub struct SharedBuffer {
    aggregator: Mutex<Aggregator>,
    local: LocalFiles,
    flushing: AtomicBool,
}

impl SharedBuffer {
    #[must_use]
    pub fn new(aggregator: Aggregator, local: LocalFiles) -> Self {
        Self {
            aggregator: Mutex::new(aggregator),
            local,
            flushing: AtomicBool::new(false),
        }
    }

    /// Locks the pending buffer. A poisoned lock is recovered: the buffer is
    /// only ever mutated by push or swap, so it is always consistent.
    pub fn lock_aggregator(&self) -> MutexGuard<'_, Aggregator> {
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record unless the buffer was closed by shutdown, in which
    /// case the record is handed back.
    pub fn append(&self, record: LogRecord) -> Result<FlushDecision, LogRecord> {
        let mut aggregator = self.lock_aggregator();
        if aggregator.is_closed() {
            return Err(record);
        }
        Ok(aggregator.append(record))
    }

    /// Closes the buffer to further appends and detaches what is pending.
    pub fn close(&self) -> Vec<LogRecord> {
        self.lock_aggregator().close()
    }

    #[must_use]
    pub fn local(&self) -> &LocalFiles {
        &self.local
    }

    /// Whether the sender task is currently sending a batch.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("sender task is not running")]
    NotRunning,
}

#[derive(Debug)]
pub enum FlushCommand {
    /// A batch detached by a threshold decision.
    Batch(Vec<LogRecord>),
    /// A batch whose outcome the caller waits for.
    Immediate(Vec<LogRecord>, oneshot::Sender<Result<Ack, TransportError>>),
    /// Detach and send whatever is pending, then reply.
    Flush(oneshot::Sender<()>),
}

/// Why a batch could not be queued for the sender task.
#[derive(Debug, PartialEq)]
pub enum DispatchError {
    QueueFull(Vec<LogRecord>),
    Closed(Vec<LogRecord>),
}

impl DispatchError {
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::QueueFull(_) => "sender queue full",
            DispatchError::Closed(_) => "sender task stopped",
        }
    }

    #[must_use]
    pub fn into_batch(self) -> Vec<LogRecord> {
        match self {
            DispatchError::QueueFull(batch) | DispatchError::Closed(batch) => batch,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FlushHandle {
    tx: mpsc::Sender<FlushCommand>,
    cancel: CancellationToken,
    shutdown_budget_ms: Arc<AtomicU64>,
}

impl FlushHandle {
    /// Queues a batch without waiting. The batch is handed back if the queue
    /// is full or the task has stopped.
    pub fn dispatch(&self, batch: Vec<LogRecord>) -> Result<(), DispatchError> {
        if self.cancel.is_cancelled() {
            return Err(DispatchError::Closed(batch));
        }
        self.tx
            .try_send(FlushCommand::Batch(batch))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(FlushCommand::Batch(batch)) => {
                    DispatchError::QueueFull(batch)
                }
                mpsc::error::TrySendError::Closed(FlushCommand::Batch(batch)) => {
                    DispatchError::Closed(batch)
                }
                // Only batches are sent through this path.
                _ => DispatchError::Closed(Vec::new()),
            })
    }

    /// Sends a batch through the sender task and waits for the outcome.
    pub async fn send_immediate(&self, batch: Vec<LogRecord>) -> Result<Ack, DeliveryError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(FlushCommand::Immediate(batch, response_tx))
            .await
            .map_err(|_| DeliveryError::NotRunning)?;

        match response_rx.await {
            Ok(result) => result.map_err(DeliveryError::from),
            Err(_) => Err(DeliveryError::NotRunning),
        }
    }

    /// Waits until everything dispatched so far and everything pending has
    /// been handed to the sender.
    pub async fn flush(&self) -> Result<(), ShipperError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(FlushCommand::Flush(response_tx))
            .await
            .map_err(|_| ShipperError::NotRunning)?;

        response_rx.await.map_err(|_| ShipperError::NotRunning)
    }

    /// Stops the loop; the task then drains within `budget`.
    pub fn begin_shutdown(&self, budget: Duration) {
        let budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        self.shutdown_budget_ms.store(budget_ms, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushServiceConfig {
    /// Tick period for shipping stale records.
    pub batch_timeout: Duration,
    /// Capacity of the queue in front of the sender task.
    pub max_queued_batches: usize,
    /// Drain budget when the task stops without an explicit shutdown.
    pub shutdown_timeout: Duration,
}

impl FlushServiceConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_timeout: config.batch_timeout(),
            max_queued_batches: config.max_queued_batches,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

struct Unsent {
    batch: Vec<LogRecord>,
    reply: Option<oneshot::Sender<Result<Ack, TransportError>>>,
}

pub struct FlushService {
    sender: Arc<dyn BatchSender>,
    buffer: Arc<SharedBuffer>,
    rx: mpsc::Receiver<FlushCommand>,
    cancel: CancellationToken,
    shutdown_budget_ms: Arc<AtomicU64>,
    batch_timeout: Duration,
    unsent: VecDeque<Unsent>,
}

impl FlushService {
    #[must_use]
    pub fn new(
        sender: Arc<dyn BatchSender>,
        buffer: Arc<SharedBuffer>,
        config: FlushServiceConfig,
    ) -> (Self, FlushHandle) {
        let (tx, rx) = mpsc::channel(config.max_queued_batches.max(1));
        let cancel = CancellationToken::new();
        // Used when every handle is dropped without an explicit shutdown.
        let shutdown_budget_ms = Arc::new(AtomicU64::new(
            u64::try_from(config.shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
        ));

        let service = Self {
            sender,
            buffer,
            rx,
            cancel: cancel.clone(),
            shutdown_budget_ms: shutdown_budget_ms.clone(),
            batch_timeout: config.batch_timeout,
            unsent: VecDeque::new(),
        };
        let handle = FlushHandle {
            tx,
            cancel,
            shutdown_budget_ms,
        };

        (service, handle)
    }

    pub async fn run(mut self) {
        debug!("LOGS | Flush service started");

        // A zero period would make `interval` panic.
        let period = self.batch_timeout.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = ticker.tick() => self.flush_stale().await,
            }
        }

        self.drain().await;
        debug!("LOGS | Flush service stopped");
    }

    async fn handle(&mut self, command: FlushCommand) {
        match command {
            FlushCommand::Batch(batch) => {
                self.ship(batch, None).await;
            }
            FlushCommand::Immediate(batch, reply) => {
                self.ship(batch, Some(reply)).await;
            }
            FlushCommand::Flush(reply) => {
                let batch = self.buffer.lock_aggregator().flush();
                self.ship(batch, None).await;
                if reply.send(()).is_err() {
                    debug!("LOGS | Flush requester went away before completion");
                }
            }
        }
    }

    async fn flush_stale(&mut self) {
        let stale = self.buffer.lock_aggregator().take_if_stale(Instant::now());
        if let Some(batch) = stale {
            debug!("LOGS | Shipping {} stale records", batch.len());
            self.ship(batch, None).await;
        }
    }

    /// Sends one batch unless shutdown interrupts it, in which case the batch
    /// goes to the front of the drain queue.
    async fn ship(
        &mut self,
        batch: Vec<LogRecord>,
        reply: Option<oneshot::Sender<Result<Ack, TransportError>>>,
    ) {
        if batch.is_empty() {
            if let Some(reply) = reply {
                let _ = reply.send(Ok(Ack::Skipped));
            }
            return;
        }

        self.buffer.flushing.store(true, Ordering::SeqCst);
        let outcome = tokio::select! {
            biased;
            result = self.sender.send(&batch) => Some(result),
            () = self.cancel.cancelled() => None,
        };
        self.buffer.flushing.store(false, Ordering::SeqCst);

        match outcome {
            Some(result) => self.complete(&batch, result, reply),
            None => self.unsent.push_front(Unsent { batch, reply }),
        }
    }

    fn complete(
        &self,
        batch: &[LogRecord],
        result: Result<Ack, TransportError>,
        reply: Option<oneshot::Sender<Result<Ack, TransportError>>>,
    ) {
        match &result {
            Ok(Ack::Sent { status, attempts }) => debug!(
                "LOGS | Batch of {} records accepted with status {} after {} attempt(s)",
                batch.len(),
                status,
                attempts
            ),
            Ok(Ack::Skipped) => {}
            Err(e) => self.buffer.local.write_dropped(batch, &e.to_string()),
        }
        if let Some(reply) = reply {
            if reply.send(result).is_err() {
                debug!("LOGS | Immediate sender went away before completion");
            }
        }
    }

    async fn drain(&mut self) {
        self.rx.close();
        let mut flush_replies = Vec::new();
        while let Some(command) = self.rx.recv().await {
            match command {
                FlushCommand::Batch(batch) => self.unsent.push_back(Unsent { batch, reply: None }),
                FlushCommand::Immediate(batch, reply) => self.unsent.push_back(Unsent {
                    batch,
                    reply: Some(reply),
                }),
                FlushCommand::Flush(reply) => flush_replies.push(reply),
            }
        }

        let pending = self.buffer.close();
        if !pending.is_empty() {
            self.unsent.push_back(Unsent {
                batch: pending,
                reply: None,
            });
        }

        let budget = Duration::from_millis(self.shutdown_budget_ms.load(Ordering::SeqCst));
        if tokio::time::timeout(budget, self.send_unsent()).await.is_err() {
            error!(
                "LOGS | Shutdown budget of {:?} exhausted with {} batches unsent",
                budget,
                self.unsent.len()
            );
        }
        self.buffer.flushing.store(false, Ordering::SeqCst);

        for unsent in self.unsent.drain(..) {
            self.buffer
                .local
                .write_dropped(&unsent.batch, "shutdown budget exhausted");
        }
        for reply in flush_replies {
            let _ = reply.send(());
        }
    }

    async fn send_unsent(&mut self) {
        while let Some(next) = self.unsent.front() {
            self.buffer.flushing.store(true, Ordering::SeqCst);
            let result = self.sender.send(&next.batch).await;
            self.buffer.flushing.store(false, Ordering::SeqCst);
            if let Some(unsent) = self.unsent.pop_front() {
                self.complete(&unsent.batch, result, unsent.reply);
            }
        }
    }
}

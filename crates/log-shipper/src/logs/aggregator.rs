// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch accumulation for log records.
//!
//! # Batching Strategy
//!
//! Records are buffered until one of these happens:
//! 1. **Count limit**: the buffer holds `max_batch_size` records ([`FlushDecision::FlushNow`])
//! 2. **Age limit**: `batch_timeout` has elapsed since the last flush ([`FlushDecision::FlushStale`])
//! 3. **Manual flush**: [`Aggregator::flush`] detaches whatever is pending
//!
//! Detaching swaps the buffer for an empty one, so ownership of every record
//! moves to exactly one batch.
//!
//! The aggregator itself is not synchronized. The client keeps it behind a
//! `std::sync::Mutex` that is only held for an append and its threshold check.

use std::mem;
use std::time::{Duration, Instant};

use crate::logs::record::LogRecord;

/// Outcome of appending a record.
#[derive(Debug, PartialEq)]
pub enum FlushDecision {
    /// Thresholds not reached; the record stays pending.
    NoFlush,
    /// The buffer reached `max_batch_size`; the detached batch is returned.
    FlushNow(Vec<LogRecord>),
    /// `batch_timeout` elapsed since the last flush; the detached batch is returned.
    FlushStale(Vec<LogRecord>),
}

impl FlushDecision {
    /// Consumes the decision, returning the detached batch if there is one.
    #[must_use]
    pub fn into_batch(self) -> Option<Vec<LogRecord>> {
        match self {
            FlushDecision::NoFlush => None,
            FlushDecision::FlushNow(batch) | FlushDecision::FlushStale(batch) => Some(batch),
        }
    }
}

/// Buffers records and decides when a batch is due.
#[derive(Debug)]
pub struct Aggregator {
    pending: Vec<LogRecord>,
    max_batch_size: usize,
    batch_timeout: Duration,
    last_flush: Instant,
    closed: bool,
}

impl Aggregator {
    /// Creates an empty aggregator. A `max_batch_size` of 0 is treated as 1.
    #[must_use]
    pub fn new(max_batch_size: usize, batch_timeout: Duration) -> Self {
        let max_batch_size = max_batch_size.max(1);
        Aggregator {
            pending: Vec::with_capacity(max_batch_size),
            max_batch_size,
            batch_timeout,
            last_flush: Instant::now(),
            closed: false,
        }
    }

    pub fn append(&mut self, record: LogRecord) -> FlushDecision {
        self.append_at(record, Instant::now())
    }

    /// Appends a record, judging staleness against `now`.
    pub fn append_at(&mut self, record: LogRecord, now: Instant) -> FlushDecision {
        self.pending.push(record);

        if self.pending.len() >= self.max_batch_size {
            FlushDecision::FlushNow(self.detach(now))
        } else if self.is_stale(now) {
            FlushDecision::FlushStale(self.detach(now))
        } else {
            FlushDecision::NoFlush
        }
    }

    /// Detaches all pending records regardless of thresholds.
    ///
    /// Returns an empty batch when nothing is pending.
    pub fn flush(&mut self) -> Vec<LogRecord> {
        self.detach(Instant::now())
    }

    /// Detaches a non-empty buffer whose age reached `batch_timeout`.
    pub fn take_if_stale(&mut self, now: Instant) -> Option<Vec<LogRecord>> {
        if !self.pending.is_empty() && self.is_stale(now) {
            Some(self.detach(now))
        } else {
            None
        }
    }

    /// Marks the aggregator as closed and detaches whatever is pending.
    ///
    /// Closing does not stop [`Aggregator::append`]; callers sharing the
    /// aggregator check [`Aggregator::is_closed`] under the same lock.
    pub fn close(&mut self) -> Vec<LogRecord> {
        self.closed = true;
        self.flush()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending records in append order.
    #[must_use]
    pub fn pending(&self) -> &[LogRecord] {
        &self.pending
    }

    #[must_use]
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    #[must_use]
    pub fn batch_timeout(&self) -> Duration {
        self.batch_timeout
    }

    fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) >= self.batch_timeout
    }

    fn detach(&mut self, now: Instant) -> Vec<LogRecord> {
        self.last_flush = now;
        mem::replace(&mut self.pending, Vec::with_capacity(self.max_batch_size))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::logs::record::{RecordBuilder, RecordOptions, Severity};
    use crate::proc::ProcessContext;
    use proptest::prelude::*;

    pub(crate) fn record(message: &str) -> LogRecord {
        RecordBuilder::new(
            ProcessContext {
                host: "test-host".to_string(),
                user: "test-user".to_string(),
            },
            "General",
        )
        .build(message, Severity::Info, "Test", RecordOptions::default())
        .expect("valid record")
    }

    fn messages(batch: &[LogRecord]) -> Vec<&str> {
        batch.iter().map(|r| r.message.as_str()).collect()
    }

    #[test]
    fn test_below_threshold_keeps_records() {
        let mut aggregator = Aggregator::new(3, Duration::from_secs(30));
        assert_eq!(aggregator.append(record("one")), FlushDecision::NoFlush);
        assert_eq!(aggregator.append(record("two")), FlushDecision::NoFlush);
        assert_eq!(aggregator.len(), 2);
        assert_eq!(messages(aggregator.pending()), vec!["one", "two"]);
    }

    #[test]
    fn test_count_threshold_flushes_now() {
        let mut aggregator = Aggregator::new(2, Duration::from_secs(30));
        assert_eq!(aggregator.append(record("one")), FlushDecision::NoFlush);
        match aggregator.append(record("two")) {
            FlushDecision::FlushNow(batch) => assert_eq!(messages(&batch), vec!["one", "two"]),
            other => panic!("expected FlushNow, got {other:?}"),
        }
        assert!(aggregator.is_empty());

        assert_eq!(aggregator.append(record("three")), FlushDecision::NoFlush);
        assert_eq!(messages(aggregator.pending()), vec!["three"]);
    }

    #[test]
    fn test_age_threshold_flushes_stale() {
        let mut aggregator = Aggregator::new(100, Duration::from_secs(30));
        let start = Instant::now();
        assert_eq!(
            aggregator.append_at(record("early"), start),
            FlushDecision::NoFlush
        );

        let later = start + Duration::from_secs(31);
        match aggregator.append_at(record("late"), later) {
            FlushDecision::FlushStale(batch) => assert_eq!(messages(&batch), vec!["early", "late"]),
            other => panic!("expected FlushStale, got {other:?}"),
        }

        // The age is measured from the last flush.
        assert_eq!(
            aggregator.append_at(record("next"), later + Duration::from_secs(1)),
            FlushDecision::NoFlush
        );
    }

    #[test]
    fn test_manual_flush_detaches_everything() {
        let mut aggregator = Aggregator::new(100, Duration::from_secs(30));
        aggregator.append(record("a"));
        aggregator.append(record("b"));
        let batch = aggregator.flush();
        assert_eq!(messages(&batch), vec!["a", "b"]);
        assert!(aggregator.is_empty());
        assert!(aggregator.flush().is_empty());
    }

    #[test]
    fn test_take_if_stale() {
        let mut aggregator = Aggregator::new(100, Duration::from_secs(5));
        let start = Instant::now();
        assert!(aggregator
            .take_if_stale(start + Duration::from_secs(10))
            .is_none());

        aggregator.append_at(record("idle"), start);
        assert!(aggregator.take_if_stale(start).is_none());
        let batch = aggregator
            .take_if_stale(start + Duration::from_secs(60))
            .expect("stale batch");
        assert_eq!(messages(&batch), vec!["idle"]);
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_close_detaches_pending() {
        let mut aggregator = Aggregator::new(100, Duration::from_secs(30));
        aggregator.append(record("last"));
        assert!(!aggregator.is_closed());

        let batch = aggregator.close();
        assert_eq!(messages(&batch), vec!["last"]);
        assert!(aggregator.is_closed());
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_zero_batch_size_is_one() {
        let mut aggregator = Aggregator::new(0, Duration::from_secs(30));
        assert_eq!(aggregator.max_batch_size(), 1);
        assert!(matches!(
            aggregator.append(record("solo")),
            FlushDecision::FlushNow(_)
        ));
    }

    #[test]
    fn test_into_batch() {
        assert!(FlushDecision::NoFlush.into_batch().is_none());
        let batch = FlushDecision::FlushStale(vec![record("x")]).into_batch();
        assert_eq!(batch.map(|b| b.len()), Some(1));
    }

    proptest! {
        #[test]
        fn below_batch_size_never_flushes(batch_size in 2usize..50, fill in 1usize..50) {
            let n = fill % (batch_size - 1) + 1;
            let start = Instant::now();
            let mut aggregator = Aggregator::new(batch_size, Duration::from_secs(30));
            for i in 0..n {
                let decision = aggregator.append_at(record(&format!("r{i}")), start);
                prop_assert_eq!(decision, FlushDecision::NoFlush);
            }
            prop_assert_eq!(aggregator.len(), n);
            let expected: Vec<String> = (0..n).map(|i| format!("r{i}")).collect();
            let actual: Vec<String> = aggregator.pending().iter().map(|r| r.message.clone()).collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn every_record_lands_in_exactly_one_batch(batch_size in 1usize..20, total in 0usize..120) {
            let start = Instant::now();
            let mut aggregator = Aggregator::new(batch_size, Duration::from_secs(30));
            let mut shipped = Vec::new();
            let mut flushes = 0;
            for i in 0..total {
                if let Some(batch) = aggregator.append_at(record(&format!("r{i}")), start).into_batch() {
                    prop_assert_eq!(batch.len(), batch_size);
                    flushes += 1;
                    shipped.extend(batch);
                }
            }
            prop_assert_eq!(flushes, total / batch_size);
            prop_assert_eq!(aggregator.len(), total % batch_size);
            shipped.extend(aggregator.flush());
            let actual: Vec<String> = shipped.into_iter().map(|r| r.message).collect();
            let expected: Vec<String> = (0..total).map(|i| format!("r{i}")).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}

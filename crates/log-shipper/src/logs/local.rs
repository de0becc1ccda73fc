// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Optional local JSON-lines files.
//!
//! - The **record log** receives every built record, in the same flattened
//!   form that goes over the wire.
//! - The **fallback file** receives the records of every batch that was given
//!   up on, each wrapped with the drop time and reason.
//!
//! Both are best effort: I/O failures become `tracing` warnings and never
//! reach the logging caller.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::Config;
use crate::logs::record::LogRecord;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DroppedRecord<'a> {
    dropped_at: String,
    reason: &'a str,
    record: &'a LogRecord,
}

/// A JSON-lines file opened on first write and kept open for appending.
#[derive(Debug)]
struct AppendFile {
    path: PathBuf,
    // The lock also keeps lines from concurrent writers from interleaving.
    file: Mutex<Option<File>>,
}

impl AppendFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    fn append_lines(&self, lines: &[String]) -> io::Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut buf = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            buf.push_str(line);
            buf.push('\n');
        }

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if file.is_none() {
            *file = Some(open_append(&self.path)?);
        }
        let result = match file.as_mut() {
            Some(handle) => handle.write_all(buf.as_bytes()),
            None => Ok(()),
        };
        if result.is_err() {
            // Reopened on the next write.
            *file = None;
        }
        result
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[derive(Debug, Default)]
pub struct LocalFiles {
    record_log: Option<AppendFile>,
    fallback: Option<AppendFile>,
}

impl LocalFiles {
    #[must_use]
    pub fn new(record_log: Option<PathBuf>, fallback: Option<PathBuf>) -> Self {
        Self {
            record_log: record_log.map(AppendFile::new),
            fallback: fallback.map(AppendFile::new),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.local_log_path.clone(), config.fallback_path.clone())
    }

    /// Appends a record to the record log, if one is configured.
    pub fn write_record(&self, record: &LogRecord) {
        let Some(sink) = &self.record_log else {
            return;
        };
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!("LOGS | Failed to serialize record for local log: {}", e);
                return;
            }
        };
        if let Err(e) = sink.append_lines(&[line]) {
            warn!(
                "LOGS | Failed to write local log {}: {}",
                sink.path.display(),
                e
            );
        }
    }

    /// Records a batch that will not be delivered.
    pub fn write_dropped(&self, batch: &[LogRecord], reason: &str) {
        warn!(
            "LOGS | Dropping batch of {} records: {}",
            batch.len(),
            reason
        );
        let Some(sink) = &self.fallback else {
            return;
        };

        let dropped_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut lines = Vec::with_capacity(batch.len());
        for record in batch {
            let entry = DroppedRecord {
                dropped_at: dropped_at.clone(),
                reason,
                record,
            };
            match serde_json::to_string(&entry) {
                Ok(line) => lines.push(line),
                Err(e) => warn!("LOGS | Failed to serialize dropped record: {}", e),
            }
        }

        if let Err(e) = sink.append_lines(&lines) {
            warn!(
                "LOGS | Failed to write fallback file {}: {}",
                sink.path.display(),
                e
            );
        }
    }
}

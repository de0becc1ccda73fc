// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tracing formatter for the shipper's own diagnostic output.
//!
//! Every line is prefixed with `LOG_SHIPPER` so it can be told apart from the
//! output of the script that embeds the shipper.
//!
//! # Format
//!
//! ```text
//! LOG_SHIPPER | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! # Examples
//!
//! ```text
//! LOG_SHIPPER | INFO | LOGS | Shipping OperationsLog records to https://ws.ods.opinsights.azure.com/api/logs?api-version=2016-04-01
//! LOG_SHIPPER | WARN | LOGS | Attempt 1/4 failed after 30001 ms: request timed out after 30s, retrying in 5s
//! LOG_SHIPPER | INFO | Feature installed component="Installer" operation_id=5f0c...
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use tracing_subscriber::EnvFilter;
//! use log_shipper::logger::Formatter;
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter(EnvFilter::new(config.log_level.as_env_filter()))
//!     .with_ansi(false)
//!     .event_format(Formatter)
//!     .init();
//! ```

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "LOG_SHIPPER | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                // Stored by the `fmt` layer when the span was created.
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

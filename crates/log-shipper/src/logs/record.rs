// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured log records and the builder that stamps them.
//!
//! A [`LogRecord`] is immutable once built. It serializes to the flat JSON
//! object the ingestion API expects:
//!
//! ```json
//! {
//!   "TimeGenerated": "2026-10-19T12:00:00.000Z",
//!   "Level": "Info",
//!   "Message": "Feature installed",
//!   "Component": "Installer",
//!   "Computer": "WIN-PROVISION-01",
//!   "User": "svc-provision",
//!   "ProcessId": 4242,
//!   "ThreadId": "7",
//!   "OperationId": "5f0c...",
//!   "DurationMs": 1520.5,
//!   "Metric_FilesCopied": 42.0,
//!   "FeatureName": "IIS-WebServer"
//! }
//! ```
//!
//! Built-in fields always win over a custom property of the same name.
//! Metrics are prefixed with `Metric_`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::logs::constants;
use crate::proc::{self, ProcessContext};

/// Names of the fields every serialized record carries.
pub const BUILTIN_FIELDS: [&str; 12] = [
    "TimeGenerated",
    "Level",
    "Message",
    "Component",
    "Computer",
    "User",
    "ProcessId",
    "ThreadId",
    "OperationId",
    "CorrelationId",
    "EventName",
    "DurationMs",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("property '{name}' has unsupported type {kind}, expected string, number or boolean")]
    UnsupportedPropertyType { name: String, kind: &'static str },
}

/// Severity of a shipped record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Success,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Trace => "Trace",
            Severity::Debug => "Debug",
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Critical => "Critical",
            Severity::Success => "Success",
        }
    }

    /// Level used when the record is echoed as a local `tracing` event.
    #[must_use]
    pub fn tracing_level(self) -> tracing::Level {
        match self {
            Severity::Trace => tracing::Level::TRACE,
            Severity::Debug => tracing::Level::DEBUG,
            Severity::Info | Severity::Success => tracing::Level::INFO,
            Severity::Warning => tracing::Level::WARN,
            Severity::Error | Severity::Critical => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            "success" => Ok(Severity::Success),
            _ => Err(RecordError::InvalidArgument(format!(
                "unknown severity '{s}'"
            ))),
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Scalar value of a custom property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Number(Number),
    Bool(bool),
}

impl PropertyValue {
    fn from_json(name: &str, value: Value) -> Result<Self, RecordError> {
        let kind = match value {
            Value::String(s) => return Ok(PropertyValue::String(s)),
            Value::Number(n) => return Ok(PropertyValue::Number(n)),
            Value::Bool(b) => return Ok(PropertyValue::Bool(b)),
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        };
        Err(RecordError::UnsupportedPropertyType {
            name: name.to_string(),
            kind,
        })
    }
}

/// Optional parts of a record supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordOptions {
    pub correlation_id: Option<Uuid>,
    /// Generated when absent.
    pub operation_id: Option<Uuid>,
    pub event_name: Option<String>,
    pub duration_ms: Option<f64>,
    /// Validated at build time; only scalars are accepted.
    pub properties: BTreeMap<String, Value>,
    pub metrics: BTreeMap<String, f64>,
}

impl RecordOptions {
    #[must_use]
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_operation_id(mut self, id: Uuid) -> Self {
        self.operation_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// One structured telemetry event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    pub message: String,
    pub component: String,
    pub host: String,
    pub user: String,
    pub process_id: u32,
    pub thread_id: String,
    pub operation_id: Uuid,
    pub correlation_id: Option<Uuid>,
    pub event_name: Option<String>,
    pub duration_ms: Option<f64>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub metrics: BTreeMap<String, f64>,
}

impl LogRecord {
    /// `TimeGenerated` value: ISO-8601 UTC with millisecond precision.
    #[must_use]
    pub fn time_generated(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn is_shadowed(&self, name: &str) -> bool {
        BUILTIN_FIELDS
            .iter()
            .any(|builtin| builtin.eq_ignore_ascii_case(name))
            || name
                .strip_prefix(constants::METRIC_PREFIX)
                .is_some_and(|metric| self.metrics.contains_key(metric))
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("TimeGenerated", &self.time_generated())?;
        map.serialize_entry("Level", &self.level)?;
        map.serialize_entry("Message", &self.message)?;
        map.serialize_entry("Component", &self.component)?;
        map.serialize_entry("Computer", &self.host)?;
        map.serialize_entry("User", &self.user)?;
        map.serialize_entry("ProcessId", &self.process_id)?;
        map.serialize_entry("ThreadId", &self.thread_id)?;
        map.serialize_entry("OperationId", &self.operation_id)?;
        if let Some(correlation_id) = &self.correlation_id {
            map.serialize_entry("CorrelationId", correlation_id)?;
        }
        if let Some(event_name) = &self.event_name {
            map.serialize_entry("EventName", event_name)?;
        }
        if let Some(duration_ms) = self.duration_ms {
            map.serialize_entry("DurationMs", &duration_ms)?;
        }
        for (name, value) in &self.metrics {
            map.serialize_entry(&format!("{}{name}", constants::METRIC_PREFIX), value)?;
        }
        for (name, value) in &self.properties {
            if !self.is_shadowed(name) {
                map.serialize_entry(name, value)?;
            }
        }
        map.end()
    }
}

/// Builds records stamped with process identity and a monotonic timestamp.
///
/// Building does no I/O. Host and user are resolved once, when the builder is
/// created.
#[derive(Debug)]
pub struct RecordBuilder {
    context: ProcessContext,
    default_component: String,
    last_timestamp_ms: AtomicI64,
}

impl RecordBuilder {
    #[must_use]
    pub fn new(context: ProcessContext, default_component: impl Into<String>) -> Self {
        Self {
            context,
            default_component: default_component.into(),
            last_timestamp_ms: AtomicI64::new(i64::MIN),
        }
    }

    pub fn build(
        &self,
        message: &str,
        level: Severity,
        component: &str,
        options: RecordOptions,
    ) -> Result<LogRecord, RecordError> {
        self.build_at(Utc::now(), message, level, component, options)
    }

    /// Same as [`RecordBuilder::build`] with an explicit wall clock reading.
    pub fn build_at(
        &self,
        now: DateTime<Utc>,
        message: &str,
        level: Severity,
        component: &str,
        options: RecordOptions,
    ) -> Result<LogRecord, RecordError> {
        if message.trim().is_empty() {
            return Err(RecordError::InvalidArgument(
                "message cannot be empty".to_string(),
            ));
        }

        if let Some(duration_ms) = options.duration_ms {
            if !duration_ms.is_finite() || duration_ms < 0.0 {
                return Err(RecordError::InvalidArgument(format!(
                    "duration must be a finite, non-negative number of milliseconds, got {duration_ms}"
                )));
            }
        }

        if let Some((name, value)) = options.metrics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(RecordError::InvalidArgument(format!(
                "metric '{name}' must be finite, got {value}"
            )));
        }

        let mut properties = BTreeMap::new();
        for (name, value) in options.properties {
            let value = PropertyValue::from_json(&name, value)?;
            properties.insert(name, value);
        }

        let component = if component.trim().is_empty() {
            self.default_component.clone()
        } else {
            component.trim().to_string()
        };

        Ok(LogRecord {
            timestamp: self.next_timestamp(now),
            level,
            message: message.to_string(),
            component,
            host: self.context.host.clone(),
            user: self.context.user.clone(),
            process_id: proc::process_id(),
            thread_id: proc::thread_id(),
            operation_id: options.operation_id.unwrap_or_else(Uuid::new_v4),
            correlation_id: options.correlation_id,
            event_name: options.event_name.filter(|name| !name.trim().is_empty()),
            duration_ms: options.duration_ms,
            properties,
            metrics: options.metrics,
        })
    }

    /// Clamps `now` so timestamps never go backwards, even across threads.
    fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now_ms = now.timestamp_millis();
        let previous = self.last_timestamp_ms.fetch_max(now_ms, Ordering::SeqCst);
        let stamped = previous.max(now_ms);
        DateTime::from_timestamp_millis(stamped).unwrap_or(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::json;

    fn builder() -> RecordBuilder {
        RecordBuilder::new(
            ProcessContext {
                host: "WIN-PROVISION-01".to_string(),
                user: "svc-provision".to_string(),
            },
            "General",
        )
    }

    #[test]
    fn test_build_sets_identity_and_operation_id() {
        let record = builder()
            .build("Feature installed", Severity::Info, "Installer", RecordOptions::default())
            .unwrap();

        assert_eq!(record.host, "WIN-PROVISION-01");
        assert_eq!(record.user, "svc-provision");
        assert_eq!(record.component, "Installer");
        assert_eq!(record.process_id, std::process::id());
        assert_eq!(record.operation_id.get_version_num(), 4);
    }

    #[test]
    fn test_build_keeps_supplied_operation_id() {
        let id = Uuid::new_v4();
        let record = builder()
            .build(
                "copy",
                Severity::Debug,
                "Blob",
                RecordOptions::default().with_operation_id(id),
            )
            .unwrap();
        assert_eq!(record.operation_id, id);
    }

    #[test]
    fn test_empty_component_uses_default() {
        let record = builder()
            .build("hello", Severity::Info, "  ", RecordOptions::default())
            .unwrap();
        assert_eq!(record.component, "General");
    }

    #[test]
    fn test_empty_message_rejected() {
        let err = builder()
            .build("   ", Severity::Info, "Installer", RecordOptions::default())
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidArgument(_)));
    }

    #[test]
    fn test_negative_and_nan_duration_rejected() {
        for duration in [-1.0, f64::NAN, f64::INFINITY] {
            let err = builder()
                .build(
                    "slow step",
                    Severity::Warning,
                    "Oracle",
                    RecordOptions::default().with_duration_ms(duration),
                )
                .unwrap_err();
            assert!(matches!(err, RecordError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_non_finite_metric_rejected() {
        let err = builder()
            .build(
                "metrics",
                Severity::Info,
                "Oracle",
                RecordOptions::default().with_metric("Rows", f64::NAN),
            )
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidArgument(_)));
    }

    #[test]
    fn test_unsupported_property_types_rejected() {
        for (value, kind) in [
            (Value::Null, "null"),
            (json!([1, 2]), "array"),
            (json!({"a": 1}), "object"),
        ] {
            let err = builder()
                .build(
                    "props",
                    Severity::Info,
                    "Installer",
                    RecordOptions::default().with_property("Bad", value),
                )
                .unwrap_err();
            assert_eq!(
                err,
                RecordError::UnsupportedPropertyType {
                    name: "Bad".to_string(),
                    kind,
                }
            );
        }
    }

    #[test]
    fn test_timestamp_is_clamped_monotonic() {
        let builder = builder();
        let later = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 5).unwrap();
        let earlier = later - ChronoDuration::seconds(3);

        let first = builder
            .build_at(later, "a", Severity::Info, "", RecordOptions::default())
            .unwrap();
        let second = builder
            .build_at(earlier, "b", Severity::Info, "", RecordOptions::default())
            .unwrap();

        assert_eq!(first.timestamp, later);
        assert_eq!(second.timestamp, later);
    }

    #[test]
    fn test_sequential_builds_are_non_decreasing() {
        let builder = builder();
        let mut previous = None;
        for i in 0..500 {
            let record = builder
                .build(&format!("record {i}"), Severity::Trace, "", RecordOptions::default())
                .unwrap();
            if let Some(previous) = previous {
                assert!(record.timestamp >= previous);
            }
            previous = Some(record.timestamp);
        }
    }

    #[test]
    fn test_serialize_flattens_fields() {
        let correlation_id = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let record = builder()
            .build_at(
                now,
                "Feature installed",
                Severity::Success,
                "Installer",
                RecordOptions::default()
                    .with_correlation_id(correlation_id)
                    .with_event_name("FeatureInstalled")
                    .with_duration_ms(1520.5)
                    .with_property("FeatureName", "IIS-WebServer")
                    .with_property("RebootRequired", false)
                    .with_property("Attempt", 2)
                    .with_metric("FilesCopied", 42.0),
            )
            .unwrap();

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["TimeGenerated"], "2026-10-19T12:00:00.000Z");
        assert_eq!(value["Level"], "Success");
        assert_eq!(value["Message"], "Feature installed");
        assert_eq!(value["Component"], "Installer");
        assert_eq!(value["Computer"], "WIN-PROVISION-01");
        assert_eq!(value["User"], "svc-provision");
        assert_eq!(value["CorrelationId"], correlation_id.to_string());
        assert_eq!(value["OperationId"], record.operation_id.to_string());
        assert_eq!(value["EventName"], "FeatureInstalled");
        assert_eq!(value["DurationMs"], 1520.5);
        assert_eq!(value["FeatureName"], "IIS-WebServer");
        assert_eq!(value["RebootRequired"], false);
        assert_eq!(value["Attempt"], 2);
        assert_eq!(value["Metric_FilesCopied"], 42.0);
    }

    #[test]
    fn test_optional_fields_omitted_when_unset() {
        let record = builder()
            .build("plain", Severity::Info, "Installer", RecordOptions::default())
            .unwrap();
        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("CorrelationId"));
        assert!(!object.contains_key("EventName"));
        assert!(!object.contains_key("DurationMs"));
    }

    #[test]
    fn test_builtin_fields_shadow_properties() {
        let record = builder()
            .build(
                "real message",
                Severity::Info,
                "Installer",
                RecordOptions::default()
                    .with_property("Message", "spoofed")
                    .with_property("computer", "spoofed-host")
                    .with_property("Metric_Rows", "spoofed-metric")
                    .with_metric("Rows", 7.0),
            )
            .unwrap();
        let text = serde_json::to_string(&record).unwrap();
        assert!(!text.contains("spoofed"));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["Message"], "real message");
        assert_eq!(value["Metric_Rows"], 7.0);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!(" Critical ".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("success".parse::<Severity>().unwrap(), Severity::Success);
        assert!(matches!(
            "fatal".parse::<Severity>(),
            Err(RecordError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_severity_tracing_level() {
        assert_eq!(Severity::Success.tracing_level(), tracing::Level::INFO);
        assert_eq!(Severity::Critical.tracing_level(), tracing::Level::ERROR);
        assert_eq!(Severity::Warning.tracing_level(), tracing::Level::WARN);
        assert_eq!(Severity::Trace.tracing_level(), tracing::Level::TRACE);
    }
}

//! Report request/acknowledgement wire types
//!
//! Both directions use postcard's compact binary encoding. The request carries
//! the reporter identity, the access token and every span drained from the
//! report buffer; the acknowledgement carries collector commands and
//! diagnostics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CollectorError;

/// Identity of the process producing spans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reporter {
    pub reporter_id: u64,
    pub tags: BTreeMap<String, String>,
}

/// Credentials attached to every report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub access_token: String,
}

/// Trace and span identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: u64,
    pub span_id: u64,
}

/// One key/value field of a log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Timestamped log attached to a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Microseconds since the Unix epoch
    pub timestamp_micros: i64,
    pub fields: Vec<KeyValue>,
}

/// A finished span as stored in the report buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub context: SpanContext,
    pub operation_name: String,
    /// Microseconds since the Unix epoch
    pub start_timestamp_micros: i64,
    pub duration_micros: u64,
    pub logs: Vec<LogRecord>,
}

/// Tracer-side counters for one report window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalMetrics {
    pub start_timestamp_micros: i64,
    pub duration_micros: u64,
    pub dropped_spans: u64,
}

/// Payload POSTed to the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub reporter: Reporter,
    pub auth: Auth,
    pub spans: Vec<SpanRecord>,
    pub internal_metrics: InternalMetrics,
}

/// Instruction sent back by the collector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Stop recording spans for the rest of the process lifetime
    pub disable: bool,
    pub dev_mode: bool,
}

/// Collector acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportResponse {
    pub commands: Vec<Command>,
    pub receive_timestamp_micros: i64,
    pub transmit_timestamp_micros: i64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub infos: Vec<String>,
}

impl ReportResponse {
    /// Whether any command asks the tracer to disable itself
    pub fn disables_tracer(&self) -> bool {
        self.commands.iter().any(|c| c.disable)
    }
}

impl ReportRequest {
    pub fn encode(&self) -> Result<Vec<u8>, CollectorError> {
        postcard::to_stdvec(self).map_err(CollectorError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CollectorError> {
        postcard::from_bytes(bytes).map_err(CollectorError::Decode)
    }
}

impl ReportResponse {
    pub fn encode(&self) -> Result<Vec<u8>, CollectorError> {
        postcard::to_stdvec(self).map_err(CollectorError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CollectorError> {
        postcard::from_bytes(bytes).map_err(CollectorError::Decode)
    }
}

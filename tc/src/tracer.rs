//! Tracer handles
//!
//! A [`Tracer`] hands out spans; logs are attached to a span and the span is
//! finished exactly once. [`RecordingTracer`] stores finished spans in a
//! bounded [`ReportBuffer`] until [`RecordingTracer::flush`] delivers them to a
//! [`Collector`]. [`NoopTracer`] records nothing.
//!
//! Tracers are passed around as explicit handles. There is no process-wide
//! active tracer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::buffer::ReportBuffer;
use crate::collector::Collector;
use crate::error::CollectorError;
use crate::wire::{KeyValue, LogRecord, ReportResponse, SpanContext, SpanRecord};

/// Platform name reported in process attributes
pub const TRACER_PLATFORM: &str = "rust";

/// Attribute keys attached to every report
pub const COMPONENT_NAME_KEY: &str = "tracer.component_name";
pub const PLATFORM_KEY: &str = "tracer.platform";
pub const TRACER_VERSION_KEY: &str = "tracer.version";
pub const REPORTER_ID_KEY: &str = "tracer.guid";

/// Source of spans
pub trait Tracer: Send + Sync {
    fn start_span(&self, operation_name: &str) -> Box<dyn Span + '_>;
}

/// An in-flight span
pub trait Span {
    /// Attach a keyed log payload
    fn log_event(&mut self, event: &str, payload: &str);

    /// End the span, handing it to the tracer
    fn finish(self: Box<Self>);
}

/// Tracer that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

struct NoopSpan;

impl Span for NoopSpan {
    fn log_event(&mut self, _event: &str, _payload: &str) {}

    fn finish(self: Box<Self>) {}
}

impl Tracer for NoopTracer {
    fn start_span(&self, _operation_name: &str) -> Box<dyn Span + '_> {
        Box::new(NoopSpan)
    }
}

/// Outcome of one forced flush
#[derive(Debug, Clone)]
pub struct FlushReport {
    pub spans_sent: usize,
    pub spans_dropped: u64,
    pub response: ReportResponse,
}

/// Tracer that buffers finished spans for delivery to a collector
pub struct RecordingTracer {
    buffer: Mutex<ReportBuffer>,
    collector: Arc<dyn Collector>,
    disabled: AtomicBool,
}

impl RecordingTracer {
    pub fn new(collector: Arc<dyn Collector>, max_buffered_spans: usize) -> Self {
        debug!(max_buffered_spans, "RecordingTracer::new: called");
        Self {
            buffer: Mutex::new(ReportBuffer::new(max_buffered_spans)),
            collector,
            disabled: AtomicBool::new(false),
        }
    }

    /// Synchronously deliver everything buffered so far
    ///
    /// The buffer is swapped out under its lock, so spans finished while the
    /// report is in flight land in the next window. An empty buffer is still
    /// reported.
    pub async fn flush(&self) -> Result<FlushReport, CollectorError> {
        let pending = self.buffer.lock().unwrap_or_else(PoisonError::into_inner).drain();
        let spans_sent = pending.spans.len();
        let spans_dropped = pending.internal_metrics.dropped_spans;
        debug!(spans_sent, spans_dropped, "RecordingTracer::flush: reporting");

        let response = self.collector.report(pending).await?;
        self.apply_response(&response);

        Ok(FlushReport {
            spans_sent,
            spans_dropped,
            response,
        })
    }

    fn apply_response(&self, response: &ReportResponse) {
        for error in &response.errors {
            warn!(%error, "RecordingTracer: collector reported error");
        }
        for warning in &response.warnings {
            warn!(%warning, "RecordingTracer: collector reported warning");
        }
        for message in &response.infos {
            debug!(%message, "RecordingTracer: collector info");
        }
        if response.disables_tracer() && !self.disabled.swap(true, Ordering::SeqCst) {
            info!("RecordingTracer: collector requested disable, discarding further spans");
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub fn buffered_spans(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn record(&self, span: SpanRecord) {
        if self.is_disabled() {
            return;
        }
        let stored = self.buffer.lock().unwrap_or_else(PoisonError::into_inner).push(span);
        if !stored {
            debug!("RecordingTracer::record: buffer full, span dropped");
        }
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, operation_name: &str) -> Box<dyn Span + '_> {
        Box::new(RecordingSpan {
            tracer: self,
            context: SpanContext {
                trace_id: rand::random(),
                span_id: rand::random(),
            },
            operation_name: operation_name.to_string(),
            start_timestamp_micros: Utc::now().timestamp_micros(),
            started: Instant::now(),
            logs: Vec::new(),
        })
    }
}

struct RecordingSpan<'a> {
    tracer: &'a RecordingTracer,
    context: SpanContext,
    operation_name: String,
    start_timestamp_micros: i64,
    started: Instant,
    logs: Vec<LogRecord>,
}

impl Span for RecordingSpan<'_> {
    fn log_event(&mut self, event: &str, payload: &str) {
        self.logs.push(LogRecord {
            timestamp_micros: Utc::now().timestamp_micros(),
            fields: vec![KeyValue::new("event", event), KeyValue::new("payload", payload)],
        });
    }

    fn finish(self: Box<Self>) {
        let span = *self;
        let duration_micros = u64::try_from(span.started.elapsed().as_micros()).unwrap_or(u64::MAX);
        span.tracer.record(SpanRecord {
            context: span.context,
            operation_name: span.operation_name,
            start_timestamp_micros: span.start_timestamp_micros,
            duration_micros,
            logs: span.logs,
        });
    }
}

/// Random non-zero reporter identifier
pub fn new_reporter_id() -> u64 {
    loop {
        let id: u64 = rand::random();
        if id != 0 {
            return id;
        }
    }
}

/// Process attributes attached to every report
pub fn process_attributes(
    component_name: &str,
    reporter_id: u64,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut attributes = extra.clone();
    attributes.insert(COMPONENT_NAME_KEY.to_string(), component_name.to_string());
    attributes.insert(PLATFORM_KEY.to_string(), TRACER_PLATFORM.to_string());
    attributes.insert(TRACER_VERSION_KEY.to_string(), env!("CARGO_PKG_VERSION").to_string());
    attributes.insert(REPORTER_ID_KEY.to_string(), format!("{:x}", reporter_id));
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MemoryCollector;
    use crate::wire::Command;

    fn recording(collector: Arc<MemoryCollector>, max: usize) -> RecordingTracer {
        RecordingTracer::new(collector, max)
    }

    #[test]
    fn test_noop_tracer_records_nothing() {
        let tracer = NoopTracer;
        let mut span = tracer.start_span("span/test");
        span.log_event("testlog", "ABC");
        span.finish();
    }

    #[test]
    fn test_recording_tracer_buffers_spans() {
        let collector = Arc::new(MemoryCollector::new(1, "tok"));
        let tracer = recording(collector, 10);

        for _ in 0..3 {
            let mut span = tracer.start_span("span/test");
            span.log_event("testlog", "ABCDE");
            span.finish();
        }

        assert_eq!(tracer.buffered_spans(), 3);
    }

    #[tokio::test]
    async fn test_flush_delivers_and_drains() {
        let collector = Arc::new(MemoryCollector::new(1, "tok"));
        let tracer = recording(collector.clone(), 10);

        let mut span = tracer.start_span("span/test");
        span.log_event("testlog", "ABCDE");
        span.log_event("testlog", "ABCDE");
        span.finish();

        let report = tracer.flush().await.unwrap();
        assert_eq!(report.spans_sent, 1);
        assert_eq!(tracer.buffered_spans(), 0);

        let requests = collector.requests();
        assert_eq!(requests.len(), 1);
        let sent = &requests[0].spans[0];
        assert_eq!(sent.operation_name, "span/test");
        assert_eq!(sent.logs.len(), 2);
        assert_eq!(sent.logs[0].fields[0], KeyValue::new("event", "testlog"));
        assert_eq!(sent.logs[0].fields[1], KeyValue::new("payload", "ABCDE"));
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_still_reports() {
        let collector = Arc::new(MemoryCollector::new(1, "tok"));
        let tracer = recording(collector.clone(), 10);

        let report = tracer.flush().await.unwrap();
        assert_eq!(report.spans_sent, 0);
        assert_eq!(collector.report_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_spans_reported() {
        let collector = Arc::new(MemoryCollector::new(1, "tok"));
        let tracer = recording(collector.clone(), 2);

        for _ in 0..5 {
            tracer.start_span("span/test").finish();
        }

        let report = tracer.flush().await.unwrap();
        assert_eq!(report.spans_sent, 2);
        assert_eq!(report.spans_dropped, 3);
        assert_eq!(collector.requests()[0].internal_metrics.dropped_spans, 3);
    }

    #[tokio::test]
    async fn test_flush_error_propagates() {
        let collector = Arc::new(MemoryCollector::new(1, "tok").failing(500));
        let tracer = recording(collector, 10);
        tracer.start_span("span/test").finish();

        let result = tracer.flush().await;
        assert!(matches!(result, Err(CollectorError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_disable_command_stops_recording() {
        let collector = Arc::new(MemoryCollector::new(1, "tok").with_response(ReportResponse {
            commands: vec![Command {
                disable: true,
                dev_mode: false,
            }],
            ..Default::default()
        }));
        let tracer = recording(collector, 10);

        tracer.flush().await.unwrap();
        assert!(tracer.is_disabled());

        tracer.start_span("span/test").finish();
        assert_eq!(tracer.buffered_spans(), 0);
    }

    #[test]
    fn test_reporter_id_nonzero() {
        for _ in 0..100 {
            assert_ne!(new_reporter_id(), 0);
        }
    }

    #[test]
    fn test_process_attributes() {
        let mut extra = BTreeMap::new();
        extra.insert("region".to_string(), "local".to_string());

        let attributes = process_attributes("bench", 0xff, &extra);
        assert_eq!(attributes.get(COMPONENT_NAME_KEY).map(String::as_str), Some("bench"));
        assert_eq!(attributes.get(PLATFORM_KEY).map(String::as_str), Some("rust"));
        assert_eq!(attributes.get(REPORTER_ID_KEY).map(String::as_str), Some("ff"));
        assert_eq!(attributes.get("region").map(String::as_str), Some("local"));
    }
}

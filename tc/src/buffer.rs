//! Report buffer
//!
//! Accumulates finished spans between flushes. The buffer is bounded: spans
//! finished while it is full are counted as dropped instead of stored.

use chrono::Utc;
use tracing::debug;

use crate::wire::{InternalMetrics, SpanRecord};

/// Default capacity of the report buffer
pub const DEFAULT_MAX_BUFFERED_SPANS: usize = 1000;

/// Contents of the buffer taken by one flush
#[derive(Debug, Clone, Default)]
pub struct PendingReport {
    pub spans: Vec<SpanRecord>,
    pub internal_metrics: InternalMetrics,
}

/// Spans waiting to be delivered to the collector
#[derive(Debug, Clone)]
pub struct ReportBuffer {
    spans: Vec<SpanRecord>,
    max_spans: usize,
    dropped_spans: u64,
    /// Start of the current report window (micros since epoch)
    window_start_micros: i64,
}

impl ReportBuffer {
    pub fn new(max_spans: usize) -> Self {
        debug!(max_spans, "ReportBuffer::new: called");
        Self {
            spans: Vec::new(),
            max_spans,
            dropped_spans: 0,
            window_start_micros: Utc::now().timestamp_micros(),
        }
    }

    /// Add a finished span, returning false if it was dropped
    pub fn push(&mut self, span: SpanRecord) -> bool {
        if self.spans.len() >= self.max_spans {
            self.dropped_spans += 1;
            return false;
        }
        self.spans.push(span);
        true
    }

    /// Take the buffered spans and metrics, leaving an empty buffer whose
    /// window starts now
    pub fn drain(&mut self) -> PendingReport {
        let now = Utc::now().timestamp_micros();
        let internal_metrics = InternalMetrics {
            start_timestamp_micros: self.window_start_micros,
            duration_micros: u64::try_from(now - self.window_start_micros).unwrap_or(0),
            dropped_spans: self.dropped_spans,
        };
        let spans = std::mem::take(&mut self.spans);
        self.dropped_spans = 0;
        self.window_start_micros = now;
        debug!(
            spans = spans.len(),
            dropped = internal_metrics.dropped_spans,
            "ReportBuffer::drain: drained"
        );
        PendingReport { spans, internal_metrics }
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn dropped_spans(&self) -> u64 {
        self.dropped_spans
    }
}

impl Default for ReportBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFERED_SPANS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::SpanContext;

    fn span(id: u64) -> SpanRecord {
        SpanRecord {
            context: SpanContext { trace_id: id, span_id: id },
            operation_name: "op".to_string(),
            start_timestamp_micros: 0,
            duration_micros: 1,
            logs: vec![],
        }
    }

    #[test]
    fn test_push_until_full() {
        let mut buffer = ReportBuffer::new(2);
        assert!(buffer.push(span(1)));
        assert!(buffer.push(span(2)));
        assert!(!buffer.push(span(3)));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped_spans(), 1);
    }

    #[test]
    fn test_drain_resets() {
        let mut buffer = ReportBuffer::new(1);
        buffer.push(span(1));
        buffer.push(span(2));

        let report = buffer.drain();
        assert_eq!(report.spans.len(), 1);
        assert_eq!(report.internal_metrics.dropped_spans, 1);

        assert!(buffer.is_empty());
        assert_eq!(buffer.dropped_spans(), 0);
        assert!(buffer.push(span(3)));
    }

    #[test]
    fn test_drain_empty_buffer() {
        let mut buffer = ReportBuffer::default();
        let report = buffer.drain();
        assert!(report.spans.is_empty());
        assert_eq!(report.internal_metrics.dropped_spans, 0);
    }
}

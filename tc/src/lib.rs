//! TraceCollect - buffered span recording with an HTTP/2 collector client
//!
//! Spans are started from an explicit [`Tracer`] handle, finished into a
//! bounded [`ReportBuffer`], and delivered on demand by
//! [`RecordingTracer::flush`] through a [`Collector`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracecollect::{CollectorClient, CollectorOptions, RecordingTracer, Tracer};
//!
//! let reporter_id = tracecollect::new_reporter_id();
//! let client = CollectorClient::new(&CollectorOptions::default(), reporter_id, Default::default())?;
//! client.connect()?;
//! let tracer = RecordingTracer::new(Arc::new(client), 1000);
//!
//! let mut span = tracer.start_span("span/test");
//! span.log_event("testlog", "ABCDE");
//! span.finish();
//!
//! let report = tracer.flush().await?;
//! ```

mod buffer;
mod collector;
mod error;
mod tracer;
pub mod wire;

pub use buffer::{DEFAULT_MAX_BUFFERED_SPANS, PendingReport, ReportBuffer};
pub use collector::{
    COLLECTOR_CONTENT_TYPE, COLLECTOR_PATH, Collector, CollectorClient, CollectorOptions, DEFAULT_REPORT_TIMEOUT,
};
#[cfg(any(test, feature = "test-util"))]
pub use collector::mock;
pub use error::CollectorError;
pub use tracer::{
    COMPONENT_NAME_KEY, FlushReport, NoopTracer, PLATFORM_KEY, REPORTER_ID_KEY, RecordingTracer, Span,
    TRACER_PLATFORM, TRACER_VERSION_KEY, Tracer, new_reporter_id, process_attributes,
};
pub use wire::{ReportRequest, ReportResponse, SpanRecord};

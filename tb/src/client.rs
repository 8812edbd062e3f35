//! Control loop client
//!
//! Polls the controller for the next specification, runs it through the
//! [`Coordinator`], forces a flush when tracing is on, and reports the result.
//! The loop has two states: it keeps polling until the controller sends a
//! terminate flag, or until an error ends the run. No partial result is ever
//! reported.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracecollect::{NoopTracer, RecordingTracer, Tracer};
use tracing::{debug, info, warn};

use crate::controller::ControllerTransport;
use crate::coordinator::Coordinator;
use crate::error::{ControllerError, HarnessError};
use crate::spec::{ExperimentResult, Specification};
use crate::workload::{LogPayload, Sleeper, ThreadSleeper};

/// Default path handing out specifications
pub const DEFAULT_CONTROL_PATH: &str = "/control";

/// Default path receiving results
pub const DEFAULT_RESULT_PATH: &str = "/result";

/// Control loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Polling,
    Terminated,
}

/// Totals over a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub experiments: u64,
    pub traced_experiments: u64,
    pub total_flush_duration: Duration,
    /// Spans lost to a full report buffer
    pub dropped_spans: u64,
}

impl RunSummary {
    fn record(&mut self, spec: &Specification, result: &ExperimentResult) {
        self.experiments += 1;
        if spec.trace_enabled {
            self.traced_experiments += 1;
        }
        self.total_flush_duration += result.flush_duration;
        self.dropped_spans += result.dropped_spans;
    }
}

/// Drives experiments on behalf of the controller
pub struct BenchClient {
    controller: Arc<dyn ControllerTransport>,
    recorder: Arc<RecordingTracer>,
    payload: Arc<LogPayload>,
    sleeper: Arc<dyn Sleeper>,
    control_path: String,
    result_path: String,
}

impl BenchClient {
    pub fn new(controller: Arc<dyn ControllerTransport>, recorder: Arc<RecordingTracer>, payload: LogPayload) -> Self {
        Self {
            controller,
            recorder,
            payload: Arc::new(payload),
            sleeper: Arc::new(ThreadSleeper),
            control_path: DEFAULT_CONTROL_PATH.to_string(),
            result_path: DEFAULT_RESULT_PATH.to_string(),
        }
    }

    pub fn with_paths(mut self, control_path: impl Into<String>, result_path: impl Into<String>) -> Self {
        self.control_path = control_path.into();
        self.result_path = result_path.into();
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Poll and run experiments until the controller terminates the stream
    pub async fn run(&self) -> Result<RunSummary, HarnessError> {
        let mut summary = RunSummary::default();
        let mut state = LoopState::Polling;
        while state == LoopState::Polling {
            state = self.step(&mut summary).await?;
        }
        info!(
            experiments = summary.experiments,
            traced = summary.traced_experiments,
            "BenchClient::run: controller terminated the run"
        );
        Ok(summary)
    }

    /// One polling iteration
    pub async fn step(&self, summary: &mut RunSummary) -> Result<LoopState, HarnessError> {
        let spec = self.fetch_specification().await?;
        if spec.terminate {
            debug!("BenchClient::step: terminate received");
            return Ok(LoopState::Terminated);
        }

        info!(
            concurrency = spec.concurrency,
            repeat = spec.repeat_count,
            work = spec.work_units,
            num_logs = spec.num_logs,
            bytes_per_log = spec.bytes_per_log,
            sleep = ?spec.sleep_per_cycle,
            sleep_interval = ?spec.sleep_flush_interval,
            trace = spec.trace_enabled,
            "BenchClient::step: running experiment"
        );
        let result = self.run_experiment(&spec).await?;
        info!(
            timing = ?result.total_duration,
            flush = ?result.flush_duration,
            sleep = ?result.total_sleep_duration,
            checksum = result.checksum,
            "BenchClient::step: experiment finished"
        );

        self.report_result(&result).await?;
        summary.record(&spec, &result);
        Ok(LoopState::Polling)
    }

    /// Run one specification and, when tracing, flush its spans
    pub async fn run_experiment(&self, spec: &Specification) -> Result<ExperimentResult, HarnessError> {
        spec.validate(self.payload.len())?;

        let tracer: Arc<dyn Tracer> = if spec.trace_enabled {
            self.recorder.clone()
        } else {
            Arc::new(NoopTracer)
        };
        let payload = Arc::clone(&self.payload);
        let sleeper = Arc::clone(&self.sleeper);
        let worker_spec = spec.clone();

        // Workers block their threads; keep them off the async runtime
        let aggregate = tokio::task::spawn_blocking(move || {
            Coordinator::new(tracer.as_ref(), &payload, sleeper.as_ref()).run(&worker_spec)
        })
        .await??;

        // Every worker has finished, so the buffer is complete
        let (flush_duration, dropped_spans) = if spec.trace_enabled {
            let begin = Instant::now();
            let report = self.recorder.flush().await?;
            let elapsed = begin.elapsed();
            debug!(
                spans = report.spans_sent,
                dropped = report.spans_dropped,
                ?elapsed,
                "BenchClient::run_experiment: flushed"
            );
            if report.spans_dropped > 0 {
                warn!(
                    sent = report.spans_sent,
                    dropped = report.spans_dropped,
                    "BenchClient::run_experiment: report buffer overflowed, flush covers a truncated workload"
                );
            }
            (elapsed, report.spans_dropped)
        } else {
            (Duration::ZERO, 0)
        };

        Ok(ExperimentResult {
            total_duration: aggregate.total_duration,
            flush_duration,
            total_sleep_duration: aggregate.total_sleep_duration,
            checksum: aggregate.checksum,
            dropped_spans,
        })
    }

    async fn fetch_specification(&self) -> Result<Specification, ControllerError> {
        let body = self.controller.get(&self.control_path).await?;
        let spec = serde_json::from_slice(&body)?;
        Ok(spec)
    }

    async fn report_result(&self, result: &ExperimentResult) -> Result<(), ControllerError> {
        let query = result.to_query(&self.result_path);
        debug!(%query, "BenchClient::report_result: called");
        self.controller.get(&query).await?;
        Ok(())
    }
}

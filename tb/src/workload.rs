//! Workload executor
//!
//! One worker runs `repeat_count` cycles of: start a span, do deterministic
//! CPU work, attach logs, finish the span, then pay down sleep debt. Debt is
//! reduced by the time actually slept rather than the time requested, so
//! scheduler over- and undershoot cancel out across cycles instead of
//! accumulating.

use std::hint::black_box;
use std::time::{Duration, Instant};

use tracecollect::Tracer;
use tracing::debug;

use crate::spec::Specification;

/// Multiplier of the work recurrence
pub const PRIME_WORK: i64 = 982_451_653;

/// Operation name of every generated span
pub const SPAN_OPERATION: &str = "span/test";

/// Event key of every generated log
pub const LOG_EVENT: &str = "testlog";

/// Default size of the shared log payload (1 MiB)
pub const DEFAULT_MAX_BYTES_PER_LOG: usize = 1 << 20;

/// Deterministic CPU work: `PRIME_WORK` raised to the power `units + 1`,
/// wrapping on overflow
pub fn work(units: u64) -> i64 {
    let mut x = PRIME_WORK;
    for _ in 0..black_box(units) {
        x = x.wrapping_mul(PRIME_WORK);
    }
    black_box(x)
}

/// Fixed repeating `A..Z` payload that log entries are sliced from
#[derive(Debug, Clone)]
pub struct LogPayload {
    text: String,
}

impl LogPayload {
    pub fn new(size: usize) -> Self {
        debug!(size, "LogPayload::new: called");
        let text = (0..size).map(|i| char::from(b'A' + (i % 26) as u8)).collect();
        Self { text }
    }

    /// First `len` bytes of the payload, clamped to its size
    pub fn slice(&self, len: usize) -> &str {
        &self.text[..len.min(self.text.len())]
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl Default for LogPayload {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES_PER_LOG)
    }
}

/// Blocks the calling thread and reports how long it actually slept
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> Duration;
}

/// Sleeper backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) -> Duration {
        let begin = Instant::now();
        std::thread::sleep(duration);
        begin.elapsed()
    }
}

/// Requested-but-not-yet-slept time of one worker
///
/// Goes negative when a real sleep overshoots; the surplus is credited
/// against later cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SleepDebt {
    nanos: i128,
}

impl SleepDebt {
    pub fn accrue(&mut self, requested: Duration) {
        self.nanos += requested.as_nanos() as i128;
    }

    /// Whether the debt is strictly greater than `threshold`
    pub fn exceeds(&self, threshold: Duration) -> bool {
        self.nanos > threshold.as_nanos() as i128
    }

    /// Outstanding debt, zero when in credit
    pub fn owed(&self) -> Duration {
        u64::try_from(self.nanos).map(Duration::from_nanos).unwrap_or(Duration::ZERO)
    }

    /// Reduce the debt by the time actually slept
    pub fn settle(&mut self, slept: Duration) {
        self.nanos -= slept.as_nanos() as i128;
    }

    pub fn as_nanos(&self) -> i128 {
        self.nanos
    }
}

/// What one worker did
#[derive(Debug, Clone, Copy)]
pub struct WorkerOutcome {
    /// Actual time slept
    pub sleep_total: Duration,
    /// Number of real sleeps performed
    pub sleep_count: u64,
    /// Output of the last work call
    pub answer: i64,
    /// When the worker reached the start barrier, if there was one
    pub arrived_at: Option<Instant>,
    /// When timed work began
    pub started_at: Instant,
    pub finished_at: Instant,
}

/// One worker's view of an experiment
pub struct Workload<'a> {
    spec: &'a Specification,
    tracer: &'a dyn Tracer,
    payload: &'a LogPayload,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Workload<'a> {
    pub fn new(
        spec: &'a Specification,
        tracer: &'a dyn Tracer,
        payload: &'a LogPayload,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            spec,
            tracer,
            payload,
            sleeper,
        }
    }

    /// Run every cycle of the specification on the calling thread
    pub fn run(&self, arrived_at: Option<Instant>) -> WorkerOutcome {
        let started_at = Instant::now();
        let log_payload = self.payload.slice(self.spec.bytes_per_log);

        let mut debt = SleepDebt::default();
        let mut sleep_total = Duration::ZERO;
        let mut sleep_count = 0;
        let mut answer = 0;

        for _ in 0..self.spec.repeat_count {
            let mut span = self.tracer.start_span(SPAN_OPERATION);
            answer = work(self.spec.work_units);
            for _ in 0..self.spec.num_logs {
                span.log_event(LOG_EVENT, log_payload);
            }
            span.finish();

            debt.accrue(self.spec.sleep_per_cycle);
            if !debt.exceeds(self.spec.sleep_flush_interval) {
                continue;
            }
            let slept = self.sleeper.sleep(debt.owed());
            debt.settle(slept);
            sleep_total += slept;
            sleep_count += 1;
        }

        WorkerOutcome {
            sleep_total,
            sleep_count,
            answer,
            arrived_at,
            started_at,
            finished_at: Instant::now(),
        }
    }
}

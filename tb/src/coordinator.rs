//! Concurrency coordinator
//!
//! Fans one specification out to `concurrency` OS threads. Workers rendezvous
//! on a start barrier before timed work and on a completion barrier after it;
//! the coordinator takes part in both, so the measured interval spans exactly
//! the concurrent section. Per-worker outcomes are returned through the join
//! handles and summed after the completion barrier, so no shared counters are
//! touched while workers run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Barrier, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracecollect::Tracer;
use tracing::{debug, warn};

use crate::error::HarnessError;
use crate::spec::Specification;
use crate::workload::{LogPayload, Sleeper, WorkerOutcome, Workload};

/// Combined outcome of every worker
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub total_duration: Duration,
    pub total_sleep_duration: Duration,
    pub checksum: i64,
    pub workers: Vec<WorkerOutcome>,
}

impl Aggregate {
    fn from_outcomes(total_duration: Duration, workers: Vec<WorkerOutcome>) -> Self {
        let total_sleep_duration = workers.iter().map(|w| w.sleep_total).sum();
        let checksum = workers.iter().fold(0i64, |acc, w| acc.wrapping_add(w.answer));
        Self {
            total_duration,
            total_sleep_duration,
            checksum,
            workers,
        }
    }
}

/// Runs one experiment across its workers
pub struct Coordinator<'a> {
    tracer: &'a dyn Tracer,
    payload: &'a LogPayload,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Coordinator<'a> {
    pub fn new(tracer: &'a dyn Tracer, payload: &'a LogPayload, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            tracer,
            payload,
            sleeper,
        }
    }

    /// Run the specification to completion on `spec.concurrency` workers
    pub fn run(&self, spec: &Specification) -> Result<Aggregate, HarnessError> {
        spec.validate(self.payload.len())?;
        let concurrency = spec.concurrency;
        debug!(concurrency, repeat = spec.repeat_count, "Coordinator::run: called");

        settle(concurrency);

        let workload = Workload::new(spec, self.tracer, self.payload, self.sleeper);
        if concurrency == 1 {
            let begin = Instant::now();
            let outcome = workload.run(None);
            let total_duration = begin.elapsed();
            return Ok(Aggregate::from_outcomes(total_duration, vec![outcome]));
        }

        let rendezvous = Rendezvous::new(concurrency);

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(concurrency);
            for worker in 0..concurrency {
                let (workload, rendezvous) = (&workload, &rendezvous);
                let spawned = thread::Builder::new()
                    .name(format!("tb-worker-{}", worker))
                    .spawn_scoped(scope, move || run_worker(worker, workload, rendezvous));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        warn!(worker, error = %source, "Coordinator::run: failed to spawn worker");
                        // Workers already parked at the gate leave without touching the barriers
                        rendezvous.gate.open(false);
                        return Err(HarnessError::Spawn { worker, source });
                    }
                }
            }

            rendezvous.gate.open(true);
            rendezvous.start.wait();
            let begin = Instant::now();
            rendezvous.finish.wait();
            let total_duration = begin.elapsed();

            let mut outcomes = Vec::with_capacity(concurrency);
            for (worker, handle) in handles.into_iter().enumerate() {
                let outcome = handle.join().map_err(|_| HarnessError::WorkerPanicked { worker });
                match outcome {
                    Ok(Some(Ok(outcome))) => outcomes.push(outcome),
                    Ok(None) => {}
                    Ok(Some(Err(e))) | Err(e) => {
                        warn!(worker, error = %e, "Coordinator::run: worker failed");
                        return Err(e);
                    }
                }
            }

            debug!(?total_duration, "Coordinator::run: all workers finished");
            Ok(Aggregate::from_outcomes(total_duration, outcomes))
        })
    }
}

/// One-shot gate workers park on until every worker has been spawned
struct StartGate {
    state: Mutex<Option<bool>>,
    opened: Condvar,
}

impl StartGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(None),
            opened: Condvar::new(),
        }
    }

    /// Release every waiter; `proceed` tells them whether to run
    fn open(&self, proceed: bool) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(proceed);
        self.opened.notify_all();
    }

    fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(proceed) = *state {
                return proceed;
            }
            state = self.opened.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Synchronisation shared by the coordinator and its workers
///
/// Both barriers count the coordinator as a participant.
struct Rendezvous {
    gate: StartGate,
    start: Barrier,
    finish: Barrier,
}

impl Rendezvous {
    fn new(concurrency: usize) -> Self {
        Self {
            gate: StartGate::new(),
            start: Barrier::new(concurrency + 1),
            finish: Barrier::new(concurrency + 1),
        }
    }
}

/// Body of one worker thread; `None` when released without running
fn run_worker(
    worker: usize,
    workload: &Workload<'_>,
    rendezvous: &Rendezvous,
) -> Option<Result<WorkerOutcome, HarnessError>> {
    let arrived_at = Instant::now();
    if !rendezvous.gate.wait() {
        return None;
    }
    rendezvous.start.wait();
    // Catch panics so the completion barrier is always reached
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| workload.run(Some(arrived_at))));
    rendezvous.finish.wait();
    Some(outcome.map_err(|_| HarnessError::WorkerPanicked { worker }))
}

/// Best-effort quieting before a measurement
///
/// Worker threads are spawned one per unit of concurrency, which fixes the
/// experiment's parallelism; there is no collector to nudge, so all that is
/// left is to give up the current timeslice once.
fn settle(concurrency: usize) {
    let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    if concurrency > available {
        debug!(concurrency, available, "settle: concurrency exceeds available parallelism");
    }
    thread::yield_now();
}

//! TraceBench - controller-driven tracer load generator
//!
//! A remote controller hands out experiment specifications. For each one the
//! harness runs a prescribed work/log/sleep pattern on parallel workers,
//! forces the tracer to deliver its buffered spans, and reports precise
//! timings back.
//!
//! # Modules
//!
//! - [`workload`] - per-worker work/log/sleep cycles and sleep-debt accounting
//! - [`coordinator`] - barrier-synchronised fan-out and aggregation
//! - [`client`] - the polling control loop
//! - [`controller`] - controller transport
//! - [`spec`] - specification and result types
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod client;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod spec;
pub mod workload;

pub use client::{BenchClient, LoopState, RunSummary};
pub use config::Config;
pub use controller::{ControllerTransport, HttpController};
pub use coordinator::{Aggregate, Coordinator};
pub use error::{ControllerError, HarnessError, SpecError};
pub use spec::{ExperimentResult, Specification};
pub use workload::{LogPayload, Sleeper, SleepDebt, ThreadSleeper, WorkerOutcome, Workload, work};

//! Experiment specification and result
//!
//! The controller sends one [`Specification`] per iteration as JSON, using its
//! own field names and integer nanosecond durations. Each run produces one
//! [`ExperimentResult`], reported back as query parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// Parameters of one load-generation experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Specification {
    /// Work/log/sleep cycles per worker
    #[serde(rename = "Repeat")]
    pub repeat_count: u64,

    /// Multiplications performed by the work function per cycle
    #[serde(rename = "Work")]
    pub work_units: u64,

    /// Log entries attached to each span
    #[serde(rename = "NumLogs")]
    pub num_logs: u64,

    /// Payload size of each log entry
    #[serde(rename = "BytesPerLog")]
    pub bytes_per_log: usize,

    /// Requested sleep per cycle
    #[serde(rename = "Sleep", with = "nanos")]
    pub sleep_per_cycle: Duration,

    /// Sleep debt that must be exceeded before a real sleep happens
    #[serde(rename = "SleepInterval", with = "nanos")]
    pub sleep_flush_interval: Duration,

    /// Parallel workers
    #[serde(rename = "Concurrent")]
    pub concurrency: usize,

    /// Record spans (true) or use the no-op tracer (false)
    #[serde(rename = "Trace")]
    pub trace_enabled: bool,

    /// The controller has no more experiments
    #[serde(rename = "Exit")]
    pub terminate: bool,
}

impl Default for Specification {
    fn default() -> Self {
        Self {
            repeat_count: 0,
            work_units: 0,
            num_logs: 0,
            bytes_per_log: 0,
            sleep_per_cycle: Duration::ZERO,
            sleep_flush_interval: Duration::ZERO,
            concurrency: 1,
            trace_enabled: false,
            terminate: false,
        }
    }
}

impl Specification {
    /// Check the specification can run against a payload of `max_bytes_per_log`
    pub fn validate(&self, max_bytes_per_log: usize) -> Result<(), SpecError> {
        if self.concurrency == 0 {
            return Err(SpecError::ZeroConcurrency);
        }
        if self.bytes_per_log > max_bytes_per_log {
            return Err(SpecError::LogTooLarge {
                requested: self.bytes_per_log,
                max: max_bytes_per_log,
            });
        }
        Ok(())
    }
}

/// Aggregate timings of one experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExperimentResult {
    /// Wall-clock time for all workers to finish
    pub total_duration: Duration,
    /// Wall-clock time of the forced flush, zero when tracing is off
    pub flush_duration: Duration,
    /// Actual time slept, summed across workers
    pub total_sleep_duration: Duration,
    /// Sum of the workers' final work outputs
    pub checksum: i64,
    /// Spans the tracer dropped for want of buffer space; not reported
    pub dropped_spans: u64,
}

impl ExperimentResult {
    /// Result path with the timings encoded as query parameters
    pub fn to_query(&self, result_path: &str) -> String {
        format!(
            "{}?timing={:.9}&flush={:.9}&s={:.9}&a={}",
            result_path,
            self.total_duration.as_secs_f64(),
            self.flush_duration.as_secs_f64(),
            self.total_sleep_duration.as_secs_f64(),
            self.checksum
        )
    }
}

mod nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_controller_json() {
        let json = r#"{
            "Concurrent": 4,
            "Work": 1000,
            "Repeat": 50,
            "Sleep": 250000,
            "SleepInterval": 1000000,
            "BytesPerLog": 16,
            "NumLogs": 2,
            "Trace": true,
            "Exit": false
        }"#;

        let spec: Specification = serde_json::from_str(json).unwrap();
        assert_eq!(spec.concurrency, 4);
        assert_eq!(spec.work_units, 1000);
        assert_eq!(spec.repeat_count, 50);
        assert_eq!(spec.sleep_per_cycle, Duration::from_micros(250));
        assert_eq!(spec.sleep_flush_interval, Duration::from_millis(1));
        assert_eq!(spec.bytes_per_log, 16);
        assert_eq!(spec.num_logs, 2);
        assert!(spec.trace_enabled);
        assert!(!spec.terminate);
    }

    #[test]
    fn test_exit_only() {
        let spec: Specification = serde_json::from_str(r#"{"Exit": true}"#).unwrap();
        assert!(spec.terminate);
        assert_eq!(spec.concurrency, 1);
    }

    #[test]
    fn test_negative_values_rejected() {
        assert!(serde_json::from_str::<Specification>(r#"{"Repeat": -1}"#).is_err());
        assert!(serde_json::from_str::<Specification>(r#"{"Sleep": -5}"#).is_err());
    }

    #[test]
    fn test_validate() {
        let spec = Specification::default();
        assert!(spec.validate(16).is_ok());

        let spec = Specification {
            concurrency: 0,
            ..Default::default()
        };
        assert_eq!(spec.validate(16), Err(SpecError::ZeroConcurrency));

        let spec = Specification {
            bytes_per_log: 17,
            ..Default::default()
        };
        assert_eq!(
            spec.validate(16),
            Err(SpecError::LogTooLarge {
                requested: 17,
                max: 16
            })
        );
    }

    #[test]
    fn test_result_query() {
        let result = ExperimentResult {
            total_duration: Duration::from_millis(1500),
            flush_duration: Duration::from_nanos(1),
            total_sleep_duration: Duration::ZERO,
            checksum: -42,
            dropped_spans: 3,
        };

        assert_eq!(
            result.to_query("/result"),
            "/result?timing=1.500000000&flush=0.000000001&s=0.000000000&a=-42"
        );
    }
}

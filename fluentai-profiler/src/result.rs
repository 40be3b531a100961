//! Profile results and aggregate statistics

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::tracer::{CpuReading, MemoryReading};

/// Detail key holding the bounded text form of the return value
pub const DETAIL_RETURN_VALUE: &str = "return_value";
/// Detail key holding the error message of a failed call
pub const DETAIL_ERROR: &str = "error";
/// Detail key holding the bounded hot stack summary
pub const DETAIL_CPU_PROFILE: &str = "cpu_profile";
/// Detail key holding seconds spent before a call failed
pub const DETAIL_ELAPSED_BEFORE_ERROR: &str = "elapsed_before_error";
/// Detail key marking a failure caused by a panic
pub const DETAIL_PANICKED: &str = "panicked";
/// Detail key holding the number of raw entries behind an aggregated profile
pub const DETAIL_AGGREGATED_ENTRIES: &str = "aggregated_entries";

/// Serde helpers storing a `Duration` as floating-point seconds
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// One measured unit of work, or one aggregated group of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResult {
    /// Name of the measured function or session
    pub function_name: String,
    /// Wall-clock duration of the span
    #[serde(with = "duration_serde")]
    pub total_time: Duration,
    /// Number of invocations represented
    pub call_count: u64,
    /// Average time per invocation
    #[serde(with = "duration_serde")]
    pub avg_time: Duration,
    /// Fastest invocation
    #[serde(with = "duration_serde")]
    pub min_time: Duration,
    /// Slowest invocation
    #[serde(with = "duration_serde")]
    pub max_time: Duration,
    /// Net change in live allocated bytes, if memory tracing was active
    pub memory_usage: Option<i64>,
    /// Peak growth of live allocated bytes during the span
    pub memory_peak: Option<u64>,
    /// CPU time as a percentage of wall time
    pub cpu_percent: Option<f64>,
    /// Free-form auxiliary data
    pub details: HashMap<String, Value>,
}

impl ProfileResult {
    /// A single completed span
    pub fn single(function_name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            function_name: function_name.into(),
            total_time: elapsed,
            call_count: 1,
            avg_time: elapsed,
            min_time: elapsed,
            max_time: elapsed,
            memory_usage: None,
            memory_peak: None,
            cpu_percent: None,
            details: HashMap::new(),
        }
    }

    /// A span whose callable failed; timing is zeroed and only the error is kept
    pub fn failed(function_name: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::single(function_name, Duration::ZERO);
        result
            .details
            .insert(DETAIL_ERROR.to_string(), Value::String(error.into()));
        result
    }

    /// Build a single-span result from raw instrumentation readings
    pub(crate) fn from_readings(
        function_name: impl Into<String>,
        elapsed: Duration,
        memory: Option<MemoryReading>,
        cpu: Option<CpuReading>,
    ) -> Self {
        let mut result = Self::single(function_name, elapsed);

        if let Some(reading) = memory {
            result.memory_usage = Some(reading.usage);
            result.memory_peak = reading.peak;
        }

        if let Some(reading) = cpu {
            if let Some(cpu_time) = reading.cpu_time {
                result.cpu_percent = Some(cpu_percent(cpu_time, elapsed));
            }
            if let Some(frames) = reading.hot_frames {
                result
                    .details
                    .insert(DETAIL_CPU_PROFILE.to_string(), Value::String(frames));
            }
        }

        result
    }

    /// Attach a detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Error message of a failed call
    pub fn error(&self) -> Option<&str> {
        self.detail_str(DETAIL_ERROR)
    }

    /// Whether the measured callable failed
    pub fn is_error(&self) -> bool {
        self.details.contains_key(DETAIL_ERROR)
    }

    /// Bounded text form of the return value
    pub fn return_value(&self) -> Option<&str> {
        self.detail_str(DETAIL_RETURN_VALUE)
    }

    /// Bounded hot stack summary
    pub fn cpu_profile(&self) -> Option<&str> {
        self.detail_str(DETAIL_CPU_PROFILE)
    }

    /// String-valued detail lookup
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }

    /// Check the timing invariants (`min <= avg <= max`, at least one call)
    pub fn is_consistent(&self) -> bool {
        self.call_count >= 1 && self.min_time <= self.avg_time && self.avg_time <= self.max_time
    }
}

/// `cpu_time / wall_time * 100`, zero for an empty span
pub(crate) fn cpu_percent(cpu_time: Duration, wall_time: Duration) -> f64 {
    let wall = wall_time.as_secs_f64();
    if wall <= 0.0 {
        return 0.0;
    }
    cpu_time.as_secs_f64() / wall * 100.0
}

/// Process-wide aggregate snapshot over a profiler history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingStats {
    /// Distinct function names observed
    pub total_functions: usize,
    /// Sum of all recorded span durations
    #[serde(with = "duration_serde")]
    pub total_time: Duration,
    /// Sum of call counts
    pub total_calls: u64,
    /// `total_time / total_calls`
    #[serde(with = "duration_serde")]
    pub avg_time_per_call: Duration,
    /// Mean CPU percentage over entries that recorded one
    pub cpu_usage: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_result_timing_is_uniform() {
        let result = ProfileResult::single("f", Duration::from_millis(12));
        assert_eq!(result.call_count, 1);
        assert_eq!(result.avg_time, result.total_time);
        assert_eq!(result.min_time, result.total_time);
        assert_eq!(result.max_time, result.total_time);
        assert!(result.is_consistent());
        assert!(!result.is_error());
    }

    #[test]
    fn test_failed_result() {
        let result = ProfileResult::failed("f", "boom");
        assert_eq!(result.error(), Some("boom"));
        assert_eq!(result.total_time, Duration::ZERO);
        assert!(result.memory_usage.is_none());
        assert!(result.cpu_percent.is_none());
        assert!(result.is_consistent());
    }

    #[test]
    fn test_from_readings() {
        let memory = MemoryReading {
            usage: 2048,
            peak: Some(4096),
        };
        let cpu = CpuReading {
            cpu_time: Some(Duration::from_millis(50)),
            hot_frames: Some("work (3)".to_string()),
        };
        let result = ProfileResult::from_readings(
            "job",
            Duration::from_millis(100),
            Some(memory),
            Some(cpu),
        );

        assert_eq!(result.memory_usage, Some(2048));
        assert_eq!(result.memory_peak, Some(4096));
        let cpu = result.cpu_percent.unwrap();
        assert!((cpu - 50.0).abs() < 1e-9);
        assert_eq!(result.cpu_profile(), Some("work (3)"));
    }

    #[test]
    fn test_cpu_percent_of_empty_span() {
        assert_eq!(cpu_percent(Duration::from_millis(1), Duration::ZERO), 0.0);
    }

    #[test]
    fn test_serializes_durations_as_seconds() {
        let result = ProfileResult::single("f", Duration::from_millis(250));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["total_time"], serde_json::json!(0.25));
        assert_eq!(json["call_count"], serde_json::json!(1));
        assert!(json["memory_usage"].is_null());

        let back: ProfileResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.total_time, Duration::from_millis(250));
    }
}

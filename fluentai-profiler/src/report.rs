//! Reporting and optimization heuristics
//!
//! Everything here is a pure function over a snapshot of a profiler's
//! history: per-function aggregation, rankings by time and memory, the
//! overall report, and the point-based performance rating used by
//! [`Profiler::optimize_function`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::engine::Profiler;
use crate::error::Result;
use crate::result::{duration_serde, ProfileResult, ProfilingStats, DETAIL_AGGREGATED_ENTRIES};

const MB: f64 = 1024.0 * 1024.0;

/// Default number of entries returned by the rankings
pub const DEFAULT_LIMIT: usize = 10;

/// Message returned by [`Profiler::get_profiling_report`] for an empty history
pub const NO_DATA_MESSAGE: &str = "No profiling data available";

/// Qualitative performance label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceRating {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl PerformanceRating {
    /// Map a point score to a rating
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 7 => PerformanceRating::Excellent,
            s if s >= 5 => PerformanceRating::Good,
            s if s >= 3 => PerformanceRating::Fair,
            _ => PerformanceRating::Poor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceRating::Poor => "poor",
            PerformanceRating::Fair => "fair",
            PerformanceRating::Good => "good",
            PerformanceRating::Excellent => "excellent",
        }
    }
}

impl fmt::Display for PerformanceRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point score over timing, memory and CPU thresholds (0 to 9).
///
/// Dimensions that were not measured contribute nothing, so a result without
/// memory or CPU data cannot reach the top of the scale.
pub fn performance_score(result: &ProfileResult) -> u32 {
    let mut score = 0;

    let avg = result.avg_time.as_secs_f64();
    score += if avg < 0.01 {
        3
    } else if avg < 0.1 {
        2
    } else if avg < 1.0 {
        1
    } else {
        0
    };

    if let Some(usage) = result.memory_usage {
        let usage = usage as f64;
        score += if usage < MB {
            3
        } else if usage < 10.0 * MB {
            2
        } else if usage < 50.0 * MB {
            1
        } else {
            0
        };
    }

    if let Some(cpu) = result.cpu_percent {
        score += if cpu < 25.0 {
            3
        } else if cpu < 50.0 {
            2
        } else if cpu < 75.0 {
            1
        } else {
            0
        };
    }

    score
}

/// Rate a result
pub fn rate(result: &ProfileResult) -> PerformanceRating {
    PerformanceRating::from_score(performance_score(result))
}

/// Free-text optimization hints for a result
pub fn suggestions(result: &ProfileResult) -> Vec<String> {
    let mut hints = Vec::new();
    let avg = result.avg_time.as_secs_f64();

    if avg > 0.5 {
        hints.push("Consider caching results of repeated calls".to_string());
        hints.push("Consider parallelizing independent parts of the work".to_string());
        hints.push("Profile the sub-functions to find the slowest step".to_string());
    } else if avg > 0.1 {
        hints.push("Review the algorithm for a lower complexity alternative".to_string());
    }

    if let Some(usage) = result.memory_usage {
        if usage as f64 > 100.0 * MB {
            hints.push(
                "Process data in streams or iterators instead of materializing it".to_string(),
            );
        }
    }

    if let Some(cpu) = result.cpu_percent {
        if cpu > 80.0 {
            hints.push("Spread CPU-bound work over multiple threads or processes".to_string());
            hints.push("Consider vectorized or batched operations".to_string());
        }
    }

    hints
}

/// Fold raw results into one synthetic result per function name, in order
/// of first appearance
pub fn aggregate_by_function(history: &[ProfileResult]) -> Vec<ProfileResult> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&ProfileResult>> = HashMap::new();
    for result in history {
        let name = result.function_name.as_str();
        groups
            .entry(name)
            .or_insert_with(|| {
                order.push(name);
                Vec::new()
            })
            .push(result);
    }

    order
        .into_iter()
        .filter_map(|name| groups.get(name).map(|group| aggregate(name, group)))
        .collect()
}

fn aggregate(name: &str, group: &[&ProfileResult]) -> ProfileResult {
    let total_time: Duration = group.iter().map(|r| r.total_time).sum();
    let call_count: u64 = group.iter().map(|r| r.call_count).sum::<u64>().max(1);
    let min_time = group.iter().map(|r| r.min_time).min().unwrap_or_default();
    let max_time = group.iter().map(|r| r.max_time).max().unwrap_or_default();
    let avg_time = Duration::from_nanos((total_time.as_nanos() / call_count as u128) as u64)
        .clamp(min_time, max_time.max(min_time));

    let memory: Vec<i64> = group.iter().filter_map(|r| r.memory_usage).collect();
    let memory_usage = (!memory.is_empty()).then(|| memory.iter().sum());
    let memory_peak = group.iter().filter_map(|r| r.memory_peak).max();

    let cpu: Vec<f64> = group.iter().filter_map(|r| r.cpu_percent).collect();
    let cpu_percent = (!cpu.is_empty()).then(|| cpu.iter().sum::<f64>() / cpu.len() as f64);

    let mut details = HashMap::new();
    details.insert(
        DETAIL_AGGREGATED_ENTRIES.to_string(),
        Value::from(group.len() as u64),
    );

    ProfileResult {
        function_name: name.to_string(),
        total_time,
        call_count,
        avg_time,
        min_time,
        max_time,
        memory_usage,
        memory_peak,
        cpu_percent,
        details,
    }
}

/// Aggregated results ranked by average time, slowest first
pub fn slowest_functions(history: &[ProfileResult], limit: usize) -> Vec<ProfileResult> {
    let mut aggregated = aggregate_by_function(history);
    // Stable: ties keep first-appearance order.
    aggregated.sort_by(|a, b| b.avg_time.cmp(&a.avg_time));
    aggregated.truncate(limit);
    aggregated
}

/// Raw results with memory data ranked by memory usage, largest first
pub fn memory_intensive_functions(history: &[ProfileResult], limit: usize) -> Vec<ProfileResult> {
    let mut entries: Vec<ProfileResult> = history
        .iter()
        .filter(|r| r.memory_usage.is_some())
        .cloned()
        .collect();
    entries.sort_by(|a, b| b.memory_usage.cmp(&a.memory_usage));
    entries.truncate(limit);
    entries
}

/// Aggregate snapshot of a history
pub fn stats(history: &[ProfileResult]) -> ProfilingStats {
    let mut names: Vec<&str> = history.iter().map(|r| r.function_name.as_str()).collect();
    names.sort_unstable();
    names.dedup();

    let total_time: Duration = history.iter().map(|r| r.total_time).sum();
    let total_calls: u64 = history.iter().map(|r| r.call_count).sum();
    let avg_time_per_call = if total_calls > 0 {
        Duration::from_nanos((total_time.as_nanos() / total_calls as u128) as u64)
    } else {
        Duration::ZERO
    };

    let cpu: Vec<f64> = history.iter().filter_map(|r| r.cpu_percent).collect();
    let cpu_usage = (!cpu.is_empty()).then(|| cpu.iter().sum::<f64>() / cpu.len() as f64);

    ProfilingStats {
        total_functions: names.len(),
        total_time,
        total_calls,
        avg_time_per_call,
        cpu_usage,
    }
}

/// Overall figures of a profiling report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportOverview {
    pub total_functions: usize,
    #[serde(with = "duration_serde")]
    pub total_time: Duration,
    pub total_calls: u64,
    #[serde(with = "duration_serde")]
    pub avg_time_per_call: Duration,
    /// Sum of all recorded memory deltas, in bytes
    pub total_memory_usage: i64,
    /// `total_memory_usage / total_calls`, in bytes
    pub avg_memory_per_call: f64,
}

/// Timing entry of the slowest-functions ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowFunctionEntry {
    pub function_name: String,
    #[serde(with = "duration_serde")]
    pub avg_time: Duration,
    #[serde(with = "duration_serde")]
    pub min_time: Duration,
    #[serde(with = "duration_serde")]
    pub max_time: Duration,
}

/// Memory entry of the memory-intensive ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFunctionEntry {
    pub function_name: String,
    pub memory_usage: Option<i64>,
    pub memory_peak: Option<u64>,
}

/// Populated profiling report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub summary: ReportOverview,
    pub slowest_functions: Vec<SlowFunctionEntry>,
    pub memory_intensive_functions: Vec<MemoryFunctionEntry>,
    pub active_sessions: Vec<String>,
    pub total_profiles: usize,
}

/// Result of [`Profiler::get_profiling_report`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfilingReport {
    /// Nothing has been recorded yet
    Empty { message: String },
    /// Report over a non-empty history
    Summary(ReportSummary),
}

impl ProfilingReport {
    /// Whether this is the "no data" response
    pub fn is_empty(&self) -> bool {
        matches!(self, ProfilingReport::Empty { .. })
    }

    /// The populated report, if any
    pub fn summary(&self) -> Option<&ReportSummary> {
        match self {
            ProfilingReport::Summary(summary) => Some(summary),
            ProfilingReport::Empty { .. } => None,
        }
    }
}

/// Build the report for a history snapshot
pub fn build_report(
    history: &[ProfileResult],
    active_sessions: Vec<String>,
    top: usize,
) -> ProfilingReport {
    if history.is_empty() {
        return ProfilingReport::Empty {
            message: NO_DATA_MESSAGE.to_string(),
        };
    }

    let stats = stats(history);
    let total_memory_usage: i64 = history.iter().filter_map(|r| r.memory_usage).sum();
    let avg_memory_per_call = if stats.total_calls > 0 {
        total_memory_usage as f64 / stats.total_calls as f64
    } else {
        0.0
    };

    let slowest_functions = slowest_functions(history, top)
        .into_iter()
        .map(|r| SlowFunctionEntry {
            function_name: r.function_name,
            avg_time: r.avg_time,
            min_time: r.min_time,
            max_time: r.max_time,
        })
        .collect();

    let memory_intensive_functions = memory_intensive_functions(history, top)
        .into_iter()
        .map(|r| MemoryFunctionEntry {
            function_name: r.function_name,
            memory_usage: r.memory_usage,
            memory_peak: r.memory_peak,
        })
        .collect();

    ProfilingReport::Summary(ReportSummary {
        summary: ReportOverview {
            total_functions: stats.total_functions,
            total_time: stats.total_time,
            total_calls: stats.total_calls,
            avg_time_per_call: stats.avg_time_per_call,
            total_memory_usage,
            avg_memory_per_call,
        },
        slowest_functions,
        memory_intensive_functions,
        active_sessions,
        total_profiles: history.len(),
    })
}

/// Result of [`Profiler::optimize_function`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub profile: ProfileResult,
    pub suggestions: Vec<String>,
    pub performance_rating: PerformanceRating,
}

impl Profiler {
    /// Slowest functions by average time, aggregated per name
    pub fn get_slowest_functions(&self, limit: usize) -> Vec<ProfileResult> {
        self.with_history(|history| slowest_functions(history, limit))
    }

    /// Raw results with the largest memory usage
    pub fn get_memory_intensive_functions(&self, limit: usize) -> Vec<ProfileResult> {
        self.with_history(|history| memory_intensive_functions(history, limit))
    }

    /// Aggregate snapshot of the history
    pub fn get_stats(&self) -> ProfilingStats {
        self.with_history(stats)
    }

    /// Summary report of the history, or the "no data" response when empty
    pub fn get_profiling_report(&self) -> ProfilingReport {
        let active = self.active_sessions();
        let top = self.config().report_top;
        self.with_history(|history| build_report(history, active, top))
    }

    /// Write the profiling report to `path` as JSON
    pub fn export_report(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let report = self.get_profiling_report();
        let content = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, content)?;
        info!("Exported profiling report to {}", path.display());
        Ok(())
    }

    /// Profile one call and grade it with optimization suggestions
    pub fn optimize_function<T, E, F>(&self, name: &str, func: F) -> OptimizationReport
    where
        T: fmt::Debug,
        E: fmt::Display,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let profile = self.profile_function(name, func);
        OptimizationReport {
            suggestions: suggestions(&profile),
            performance_rating: rate(&profile),
            profile,
        }
    }
}

//! FluentAI Profiler
//!
//! In-process performance profiling for arbitrary function calls:
//! - Wall-clock timing, CPU time and allocation tracking around one call
//! - Named sessions for measuring longer stretches of code
//! - A history of results with per-function aggregation and rankings
//! - A summary report and a point-based performance rating with
//!   optimization hints
//! - Adapters that measure every call of a wrapped function
//!
//! Memory profiling requires the host binary to install
//! [`TrackingAllocator`] as its global allocator; without it memory fields
//! are simply absent.
//!
//! ```
//! use fluentai_profiler::Profiler;
//!
//! let profiler = Profiler::new(false, false);
//! let result = profiler.profile_function("sum", || Ok::<_, String>((1..=100).sum::<u32>()));
//! assert_eq!(result.return_value(), Some("5050"));
//!
//! let slowest = profiler.get_slowest_functions(10);
//! assert_eq!(slowest[0].function_name, "sum");
//! ```

pub mod adapters;
pub mod alloc;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod measure;
pub mod report;
pub mod result;
pub mod session;
pub mod tracer;

pub use adapters::{profile_function_decorator, profile_memory_decorator, Invoke, Profiled};
pub use alloc::TrackingAllocator;
pub use capture::BoundedText;
pub use config::{CpuClock, ProfilerConfig, SamplingConfig};
pub use engine::{Profiler, ProfilerBuilder, SessionGuard};
pub use error::{ProfilerError, Result};
pub use measure::{CallOutcome, Measurement};
pub use report::{
    OptimizationReport, PerformanceRating, ProfilingReport, ReportSummary, DEFAULT_LIMIT,
};
pub use result::{ProfileResult, ProfilingStats};
pub use tracer::{
    AllocationTracer, CpuProbe, CpuProfiler, CpuReading, CpuTimeProfiler, Instrumentation,
    MemoryProbe, MemoryReading, MemoryTracer,
};

/// Profiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        profile_function_decorator, profile_memory_decorator, Invoke, PerformanceRating,
        ProfileResult, Profiled, Profiler, ProfilerConfig, ProfilerError, ProfilingReport,
        Result, TrackingAllocator,
    };
}

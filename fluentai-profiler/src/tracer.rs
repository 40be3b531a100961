//! Instrumentation capabilities injected into a profiler
//!
//! A profiler never reaches for process-wide instrumentation directly. It is
//! handed an [`Instrumentation`] holding an optional [`MemoryTracer`] and an
//! optional [`CpuProfiler`]; each measured span asks them for a probe at the
//! start and reads the probe at the end. A tracer that cannot instrument
//! (allocator not installed, unsupported platform) returns no probe and the
//! corresponding result fields stay empty.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, warn};

use crate::alloc::{self, PeakSlot};
#[cfg(unix)]
use crate::capture::BoundedText;
use crate::config::{CpuClock, ProfilerConfig, SamplingConfig};
use crate::error::ProfilerError;
use crate::measure::panic_message;

/// Memory observed over one span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    /// Net change of live bytes
    pub usage: i64,
    /// Peak growth of live bytes above the starting level
    pub peak: Option<u64>,
}

/// CPU activity observed over one span
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuReading {
    /// CPU time consumed during the span
    pub cpu_time: Option<Duration>,
    /// Bounded summary of the hottest sampled frames
    pub hot_frames: Option<String>,
}

/// Source of memory probes
pub trait MemoryTracer: Send + Sync {
    /// Begin observing a span, or `None` if tracing is unavailable
    fn start(&self) -> Option<Box<dyn MemoryProbe>>;
}

/// An open memory observation
pub trait MemoryProbe: Send {
    /// End the observation
    fn finish(self: Box<Self>) -> MemoryReading;
}

/// Source of CPU probes
pub trait CpuProfiler: Send + Sync {
    /// Begin observing a span, or `None` if CPU measurement is unavailable
    fn start(&self) -> Option<Box<dyn CpuProbe>>;
}

/// An open CPU observation
pub trait CpuProbe: Send {
    /// End the observation
    fn finish(self: Box<Self>) -> CpuReading;
}

/// The instrumentation owned by one profiler
#[derive(Clone, Default)]
pub struct Instrumentation {
    /// Allocation tracing, if enabled
    pub memory: Option<Arc<dyn MemoryTracer>>,
    /// CPU measurement, if enabled
    pub cpu: Option<Arc<dyn CpuProfiler>>,
}

impl Instrumentation {
    /// No instrumentation; spans are timed only
    pub fn none() -> Self {
        Self::default()
    }

    /// Default tracers for the enabled facilities of a configuration
    pub fn from_config(config: &ProfilerConfig) -> Self {
        let memory: Option<Arc<dyn MemoryTracer>> = if config.memory_enabled {
            Some(Arc::new(AllocationTracer::new()))
        } else {
            None
        };
        let cpu: Option<Arc<dyn CpuProfiler>> = if config.cpu_enabled {
            Some(Arc::new(CpuTimeProfiler::new(
                config.cpu_clock,
                config.sampling.clone(),
                config.capture_limit,
            )))
        } else {
            None
        };
        Self { memory, cpu }
    }

    /// Replace the memory tracer
    pub fn with_memory(mut self, tracer: Arc<dyn MemoryTracer>) -> Self {
        self.memory = Some(tracer);
        self
    }

    /// Replace the CPU profiler
    pub fn with_cpu(mut self, profiler: Arc<dyn CpuProfiler>) -> Self {
        self.cpu = Some(profiler);
        self
    }

    /// Open probes for a span. The CPU probe is opened first so that its
    /// own bookkeeping is not counted by the memory probe. A tracer that
    /// panics is logged and contributes no probe.
    pub(crate) fn open(&self) -> OpenProbes {
        let cpu = self
            .cpu
            .as_ref()
            .and_then(|profiler| guarded("CPU profiler start", || profiler.start()).flatten());
        let memory = self
            .memory
            .as_ref()
            .and_then(|tracer| guarded("memory tracer start", || tracer.start()).flatten());
        OpenProbes { memory, cpu }
    }
}

/// Run instrumentation code, turning a panic into a logged, dropped reading
fn guarded<R>(stage: &str, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let err = ProfilerError::instrumentation(format!(
                "{} panicked: {}",
                stage,
                panic_message(payload.as_ref())
            ));
            warn!("{}", err);
            None
        }
    }
}

impl std::fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumentation")
            .field("memory", &self.memory.is_some())
            .field("cpu", &self.cpu.is_some())
            .finish()
    }
}

/// Probes of one open span
pub(crate) struct OpenProbes {
    memory: Option<Box<dyn MemoryProbe>>,
    cpu: Option<Box<dyn CpuProbe>>,
}

impl OpenProbes {
    /// No probes
    pub(crate) fn empty() -> Self {
        Self {
            memory: None,
            cpu: None,
        }
    }

    /// Close the probes in reverse order of opening
    pub(crate) fn close(self) -> (Option<MemoryReading>, Option<CpuReading>) {
        let memory = self
            .memory
            .and_then(|probe| guarded("memory probe finish", move || probe.finish()));
        let cpu = self
            .cpu
            .and_then(|probe| guarded("CPU probe finish", move || probe.finish()));
        (memory, cpu)
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Memory tracer backed by [`TrackingAllocator`](crate::TrackingAllocator)
#[derive(Debug, Default)]
pub struct AllocationTracer;

impl AllocationTracer {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryTracer for AllocationTracer {
    fn start(&self) -> Option<Box<dyn MemoryProbe>> {
        if !alloc::is_installed() {
            debug!("Allocation tracking unavailable: TrackingAllocator is not the global allocator");
            return None;
        }
        // The probe's own allocation must precede the baseline.
        let mut probe = Box::new(AllocationProbe {
            baseline: 0,
            slot: None,
        });
        let baseline = alloc::live_bytes();
        probe.baseline = baseline;
        probe.slot = PeakSlot::acquire(baseline);
        if probe.slot.is_none() {
            debug!("No free peak slot, memory_peak will be absent");
        }
        Some(probe as Box<dyn MemoryProbe>)
    }
}

struct AllocationProbe {
    baseline: usize,
    slot: Option<PeakSlot>,
}

impl MemoryProbe for AllocationProbe {
    fn finish(self: Box<Self>) -> MemoryReading {
        let after = alloc::live_bytes();
        let usage = after as i64 - self.baseline as i64;
        let peak = self.slot.as_ref().map(|slot| {
            let growth = slot.peak().saturating_sub(self.baseline) as u64;
            growth.max(usage.max(0) as u64)
        });
        MemoryReading { usage, peak }
    }
}

// ---------------------------------------------------------------------------
// CPU
// ---------------------------------------------------------------------------

/// Read the CPU clock selected by `clock`
#[cfg(unix)]
pub fn cpu_time(clock: CpuClock) -> Option<Duration> {
    let clock_id = match clock {
        CpuClock::Thread => libc::CLOCK_THREAD_CPUTIME_ID,
        CpuClock::Process => libc::CLOCK_PROCESS_CPUTIME_ID,
    };
    // SAFETY: timespec is plain old data; all-zero is a valid value.
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY: `ts` is a valid, writable timespec.
    let rc = unsafe { libc::clock_gettime(clock_id, &mut ts) };
    if rc != 0 {
        return None;
    }
    Some(Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32))
}

#[cfg(not(unix))]
pub fn cpu_time(_clock: CpuClock) -> Option<Duration> {
    None
}

/// CPU profiler reading CPU clocks and sampling call stacks
#[derive(Debug, Clone)]
pub struct CpuTimeProfiler {
    clock: CpuClock,
    sampling: SamplingConfig,
    capture_limit: usize,
}

impl CpuTimeProfiler {
    pub fn new(clock: CpuClock, sampling: SamplingConfig, capture_limit: usize) -> Self {
        Self {
            clock,
            sampling,
            capture_limit,
        }
    }

    /// CPU clock only, no stack sampling
    pub fn clock_only(clock: CpuClock) -> Self {
        Self::new(
            clock,
            SamplingConfig {
                enabled: false,
                ..Default::default()
            },
            0,
        )
    }
}

impl CpuProfiler for CpuTimeProfiler {
    fn start(&self) -> Option<Box<dyn CpuProbe>> {
        let sampler = if self.sampling.enabled {
            StackSampler::start(&self.sampling, self.capture_limit)
        } else {
            None
        };
        let started = cpu_time(self.clock);
        if started.is_none() && sampler.is_none() {
            debug!("CPU measurement unavailable on this platform");
            return None;
        }
        Some(Box::new(CpuTimeProbe {
            clock: self.clock,
            thread: thread::current().id(),
            started,
            sampler,
        }))
    }
}

struct CpuTimeProbe {
    clock: CpuClock,
    thread: ThreadId,
    started: Option<Duration>,
    sampler: Option<StackSampler>,
}

impl CpuProbe for CpuTimeProbe {
    fn finish(self: Box<Self>) -> CpuReading {
        let cpu_time = match self.started {
            Some(_) if self.clock == CpuClock::Thread && thread::current().id() != self.thread => {
                debug!("Thread CPU clock read from another thread, dropping cpu time");
                None
            }
            Some(started) => cpu_time(self.clock).map(|now| now.saturating_sub(started)),
            None => None,
        };
        let hot_frames = self.sampler.and_then(StackSampler::finish);
        CpuReading {
            cpu_time,
            hot_frames,
        }
    }
}

/// Call-stack sampler backed by `pprof`
#[cfg(unix)]
struct StackSampler {
    guard: pprof::ProfilerGuard<'static>,
    capture_limit: usize,
}

#[cfg(unix)]
impl StackSampler {
    fn start(config: &SamplingConfig, capture_limit: usize) -> Option<Self> {
        match pprof::ProfilerGuardBuilder::default()
            .frequency(config.frequency)
            .blocklist(config.blocklist.as_slice())
            .build()
        {
            Ok(guard) => Some(Self {
                guard,
                capture_limit,
            }),
            Err(err) => {
                // Only one sampler can run per process.
                let err = ProfilerError::instrumentation(err.to_string());
                debug!("Stack sampling unavailable for this span: {}", err);
                None
            }
        }
    }

    fn finish(self) -> Option<String> {
        let report = match self.guard.report().build() {
            Ok(report) => report,
            Err(err) => {
                let err = ProfilerError::instrumentation(err.to_string());
                warn!("Could not build stack sample report: {}", err);
                return None;
            }
        };

        let mut leaves: Vec<(String, isize)> = Vec::new();
        for (frames, count) in report.data.iter() {
            let leaf = frames
                .frames
                .first()
                .and_then(|symbols| symbols.first())
                .map(|symbol| symbol.name());
            if let Some(name) = leaf {
                match leaves.iter_mut().find(|(existing, _)| *existing == name) {
                    Some((_, total)) => *total += *count,
                    None => leaves.push((name, *count)),
                }
            }
        }
        if leaves.is_empty() {
            return None;
        }
        leaves.sort_by(|a, b| b.1.cmp(&a.1));

        let summary = leaves
            .iter()
            .map(|(name, count)| format!("{} ({})", name, count))
            .collect::<Vec<_>>()
            .join("; ");
        Some(BoundedText::display(&summary, self.capture_limit))
    }
}

#[cfg(not(unix))]
struct StackSampler;

#[cfg(not(unix))]
impl StackSampler {
    fn start(_config: &SamplingConfig, _capture_limit: usize) -> Option<Self> {
        None
    }

    fn finish(self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMemory(i64);

    impl MemoryTracer for FixedMemory {
        fn start(&self) -> Option<Box<dyn MemoryProbe>> {
            Some(Box::new(FixedMemoryProbe(self.0)))
        }
    }

    struct FixedMemoryProbe(i64);

    impl MemoryProbe for FixedMemoryProbe {
        fn finish(self: Box<Self>) -> MemoryReading {
            MemoryReading {
                usage: self.0,
                peak: None,
            }
        }
    }

    #[test]
    fn test_instrumentation_from_config() {
        let full = Instrumentation::from_config(&ProfilerConfig::full());
        assert!(full.memory.is_some());
        assert!(full.cpu.is_some());

        let memory = Instrumentation::from_config(&ProfilerConfig::memory_only());
        assert!(memory.memory.is_some());
        assert!(memory.cpu.is_none());

        let timing = Instrumentation::from_config(&ProfilerConfig::timing_only());
        assert!(timing.memory.is_none());
        assert!(timing.cpu.is_none());
    }

    #[test]
    fn test_injected_tracer_is_used() {
        let instrumentation = Instrumentation::none().with_memory(Arc::new(FixedMemory(512)));
        let (memory, cpu) = instrumentation.open().close();
        assert_eq!(memory.map(|m| m.usage), Some(512));
        assert!(cpu.is_none());
    }

    #[test]
    fn test_panicking_finish_drops_its_reading() {
        struct Exploding;

        impl MemoryProbe for Exploding {
            fn finish(self: Box<Self>) -> MemoryReading {
                panic!("exploded");
            }
        }

        let probes = OpenProbes {
            memory: Some(Box::new(Exploding)),
            cpu: None,
        };
        let (memory, cpu) = probes.close();
        assert!(memory.is_none());
        assert!(cpu.is_none());
        assert_eq!(guarded("ok", || 7), Some(7));
    }

    #[cfg(unix)]
    #[test]
    fn test_thread_cpu_clock_advances() {
        let before = cpu_time(CpuClock::Thread).unwrap();
        let mut acc = 0u64;
        for i in 0..2_000_000u64 {
            acc = acc.wrapping_add(i * i);
        }
        std::hint::black_box(acc);
        let after = cpu_time(CpuClock::Thread).unwrap();
        assert!(after >= before);
    }

    #[cfg(unix)]
    #[test]
    fn test_clock_only_profiler_reports_cpu_time() {
        let profiler = CpuTimeProfiler::clock_only(CpuClock::Thread);
        let probe = profiler.start().expect("cpu clock available");
        let reading = probe.finish();
        assert!(reading.cpu_time.is_some());
        assert!(reading.hot_frames.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_thread_probe_finished_elsewhere_drops_cpu_time() {
        let profiler = CpuTimeProfiler::clock_only(CpuClock::Thread);
        let probe = profiler.start().expect("cpu clock available");
        let reading = std::thread::spawn(move || probe.finish()).join().unwrap();
        assert!(reading.cpu_time.is_none());
    }
}

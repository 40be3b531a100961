//! Profiler configuration

use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, Result};

/// Which CPU clock is read around a measured span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuClock {
    /// CPU time consumed by the calling thread only
    Thread,
    /// CPU time consumed by every thread of the process
    Process,
}

impl Default for CpuClock {
    fn default() -> Self {
        CpuClock::Thread
    }
}

/// Stack sampling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Capture a hot call-stack summary while measuring
    pub enabled: bool,
    /// Sampling frequency in Hz
    pub frequency: i32,
    /// Library name prefixes whose frames are skipped by the sampler
    pub blocklist: Vec<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: 1000,
            blocklist: vec![
                "libc".to_string(),
                "libgcc".to_string(),
                "pthread".to_string(),
                "vdso".to_string(),
            ],
        }
    }
}

/// Profiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Trace allocations around measured spans
    pub memory_enabled: bool,
    /// Measure CPU time around measured spans
    pub cpu_enabled: bool,
    /// CPU clock used for `cpu_percent`
    pub cpu_clock: CpuClock,
    /// Stack sampling (only used when `cpu_enabled`)
    pub sampling: SamplingConfig,
    /// Maximum bytes kept for textual captures (return values, stack summaries)
    pub capture_limit: usize,
    /// Number of entries in each ranking of the profiling report
    pub report_top: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            memory_enabled: true,
            cpu_enabled: true,
            cpu_clock: CpuClock::default(),
            sampling: SamplingConfig::default(),
            capture_limit: 100,
            report_top: 5,
        }
    }
}

impl ProfilerConfig {
    /// Create a new profiler configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory, CPU and stack sampling all enabled
    pub fn full() -> Self {
        Self::default()
    }

    /// Memory tracing only, for the lowest overhead when only allocation
    /// behaviour matters
    pub fn memory_only() -> Self {
        Self {
            memory_enabled: true,
            cpu_enabled: false,
            sampling: SamplingConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Wall-clock timing only
    pub fn timing_only() -> Self {
        Self {
            memory_enabled: false,
            cpu_enabled: false,
            sampling: SamplingConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check the configuration for values the profiler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.capture_limit == 0 {
            return Err(ProfilerError::config(
                "capture_limit must be greater than zero",
            ));
        }
        if self.report_top == 0 {
            return Err(ProfilerError::config("report_top must be greater than zero"));
        }
        if self.sampling.enabled && self.sampling.frequency <= 0 {
            return Err(ProfilerError::config(format!(
                "sampling frequency must be positive, got {}",
                self.sampling.frequency
            )));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

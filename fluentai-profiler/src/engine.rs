//! Profiler engine - the main entry point for measuring code

use parking_lot::RwLock;
use std::fmt;
use tracing::{error, info};

use crate::config::{CpuClock, ProfilerConfig};
use crate::error::Result;
use crate::measure::{measure, Measurement};
use crate::result::ProfileResult;
use crate::session::SessionTracker;
use crate::tracer::Instrumentation;

/// Profiler engine
///
/// Owns an append-only history of [`ProfileResult`]s. Every measured call and
/// every stopped session lands in the history in completion order; only
/// [`clear_history`](Profiler::clear_history) removes entries.
///
/// `profile_function` never propagates the failure of the measured callable:
/// an `Err` or a panic is recorded in `details["error"]` and the call still
/// returns a result. Use [`profile_call`](Profiler::profile_call) to get the
/// original outcome back.
pub struct Profiler {
    /// Configuration
    config: ProfilerConfig,
    /// Memory and CPU instrumentation
    instrumentation: Instrumentation,
    /// Completed results in completion order
    history: RwLock<Vec<ProfileResult>>,
    /// Named sessions that have been started but not stopped
    sessions: SessionTracker,
}

impl Profiler {
    /// Create a profiler with the default tracers for the enabled facilities
    pub fn new(memory_enabled: bool, cpu_enabled: bool) -> Self {
        Self::with_config(ProfilerConfig {
            memory_enabled,
            cpu_enabled,
            ..Default::default()
        })
    }

    /// Create a profiler from a configuration
    pub fn with_config(config: ProfilerConfig) -> Self {
        let instrumentation = Instrumentation::from_config(&config);
        Self::with_instrumentation(config, instrumentation)
    }

    /// Create a profiler with explicitly injected instrumentation
    pub fn with_instrumentation(config: ProfilerConfig, instrumentation: Instrumentation) -> Self {
        Self {
            config,
            instrumentation,
            history: RwLock::new(Vec::new()),
            sessions: SessionTracker::new(),
        }
    }

    /// Start building a profiler
    pub fn builder() -> ProfilerBuilder {
        ProfilerBuilder::new()
    }

    /// Get the configuration
    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Get the instrumentation
    pub fn instrumentation(&self) -> &Instrumentation {
        &self.instrumentation
    }

    /// Measure one call, record it and return the result
    pub fn profile_function<T, E, F>(&self, name: &str, func: F) -> ProfileResult
    where
        T: fmt::Debug,
        E: fmt::Display,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.profile_call(name, func).result
    }

    /// Measure one call, record it, and hand back both the result and what
    /// the callable produced
    pub fn profile_call<T, E, F>(&self, name: &str, func: F) -> Measurement<T, E>
    where
        T: fmt::Debug,
        E: fmt::Display,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let measured = measure(&self.instrumentation, name, self.config.capture_limit, func);

        match measured.result.error() {
            Some(err) => error!("Profiling failed for {}: {}", name, err),
            None => info!(
                "Profiled {}: {:.4}s",
                name,
                measured.result.total_time.as_secs_f64()
            ),
        }

        self.record(measured.result.clone());
        measured
    }

    /// Start a named session. Starting a name that is already active logs a
    /// warning and does nothing.
    pub fn start_profile(&self, name: &str) {
        self.sessions.start(name, &self.instrumentation);
    }

    /// Stop a named session, record and return its result. Returns `None`
    /// (with a warning) if no such session is active.
    pub fn stop_profile(&self, name: &str) -> Option<ProfileResult> {
        let result = self.sessions.stop(name)?;
        self.record(result.clone());
        Some(result)
    }

    /// Start a named session that stops when the returned guard is dropped
    pub fn profile_scope(&self, name: &str) -> SessionGuard<'_> {
        let name = name.to_string();
        let owned = self.sessions.start(&name, &self.instrumentation);
        SessionGuard {
            profiler: self,
            name,
            owned,
        }
    }

    /// Names of sessions started but not yet stopped, sorted
    pub fn active_sessions(&self) -> Vec<String> {
        self.sessions.active_names()
    }

    /// Whether a session with this name is active
    pub fn is_session_active(&self, name: &str) -> bool {
        self.sessions.is_active(name)
    }

    /// Copy of the full history in completion order
    pub fn get_profile_history(&self) -> Vec<ProfileResult> {
        self.history.read().clone()
    }

    /// Most recent result recorded under `name`
    pub fn get_function_profile(&self, name: &str) -> Option<ProfileResult> {
        self.history
            .read()
            .iter()
            .rev()
            .find(|result| result.function_name == name)
            .cloned()
    }

    /// Number of recorded results
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Discard all recorded results
    pub fn clear_history(&self) {
        self.history.write().clear();
        info!("Profile history cleared");
    }

    /// Run `f` over a snapshot of the history
    pub(crate) fn with_history<R>(&self, f: impl FnOnce(&[ProfileResult]) -> R) -> R {
        let history = self.history.read();
        f(&history)
    }

    fn record(&self, result: ProfileResult) {
        self.history.write().push(result);
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::with_config(ProfilerConfig::default())
    }
}

impl fmt::Debug for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiler")
            .field("config", &self.config)
            .field("instrumentation", &self.instrumentation)
            .field("history_len", &self.history_len())
            .field("sessions", &self.sessions)
            .finish()
    }
}

/// Guard of a session started with [`Profiler::profile_scope`]
#[must_use = "the session stops as soon as the guard is dropped"]
pub struct SessionGuard<'a> {
    profiler: &'a Profiler,
    name: String,
    owned: bool,
}

impl SessionGuard<'_> {
    /// Name of the session
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this guard actually started the session. A guard created for
    /// a name that was already active never stops that session.
    pub fn is_active(&self) -> bool {
        self.owned
    }

    /// Stop the session now and return its result
    pub fn finish(mut self) -> Option<ProfileResult> {
        self.stop()
    }

    fn stop(&mut self) -> Option<ProfileResult> {
        if !self.owned {
            return None;
        }
        self.owned = false;
        self.profiler.stop_profile(&self.name)
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Profiler builder
pub struct ProfilerBuilder {
    config: ProfilerConfig,
    instrumentation: Option<Instrumentation>,
}

impl ProfilerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: ProfilerConfig::default(),
            instrumentation: None,
        }
    }

    /// Set configuration
    pub fn config(mut self, config: ProfilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable memory tracing
    pub fn memory(mut self, enabled: bool) -> Self {
        self.config.memory_enabled = enabled;
        self
    }

    /// Enable or disable CPU measurement
    pub fn cpu(mut self, enabled: bool) -> Self {
        self.config.cpu_enabled = enabled;
        self
    }

    /// Select the CPU clock
    pub fn cpu_clock(mut self, clock: CpuClock) -> Self {
        self.config.cpu_clock = clock;
        self
    }

    /// Enable or disable stack sampling
    pub fn sampling(mut self, enabled: bool) -> Self {
        self.config.sampling.enabled = enabled;
        self
    }

    /// Set the stack sampling frequency in Hz
    pub fn sampling_frequency(mut self, frequency: i32) -> Self {
        self.config.sampling.frequency = frequency;
        self
    }

    /// Set the textual capture limit in bytes
    pub fn capture_limit(mut self, limit: usize) -> Self {
        self.config.capture_limit = limit;
        self
    }

    /// Set the size of each ranking in the profiling report
    pub fn report_top(mut self, top: usize) -> Self {
        self.config.report_top = top;
        self
    }

    /// Inject instrumentation instead of the defaults derived from the config
    pub fn instrumentation(mut self, instrumentation: Instrumentation) -> Self {
        self.instrumentation = Some(instrumentation);
        self
    }

    /// Build the profiler
    pub fn build(self) -> Result<Profiler> {
        self.config.validate()?;
        let instrumentation = self
            .instrumentation
            .unwrap_or_else(|| Instrumentation::from_config(&self.config));
        Ok(Profiler::with_instrumentation(self.config, instrumentation))
    }
}

impl Default for ProfilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfilerError;

    fn timing_profiler() -> Profiler {
        Profiler::with_config(ProfilerConfig::timing_only())
    }

    #[test]
    fn test_profile_function_records_history() {
        let profiler = timing_profiler();
        let result = profiler.profile_function("add", || Ok::<_, String>(1 + 2));

        assert_eq!(result.return_value(), Some("3"));
        assert_eq!(profiler.get_profile_history(), vec![result]);
    }

    #[test]
    fn test_failed_calls_are_recorded() {
        let profiler = timing_profiler();
        let result = profiler.profile_function("fails", || Err::<(), _>("bad input"));

        assert_eq!(result.error(), Some("bad input"));
        assert_eq!(profiler.history_len(), 1);
    }

    #[test]
    fn test_profile_call_hands_back_error() {
        let profiler = timing_profiler();
        let measured = profiler.profile_call("fails", || Err::<u8, _>("bad input".to_string()));

        assert_eq!(measured.result.error(), Some("bad input"));
        assert_eq!(measured.into_result(), Err("bad input".to_string()));
        assert_eq!(profiler.history_len(), 1);
    }

    #[test]
    fn test_get_function_profile_is_last_write() {
        let profiler = timing_profiler();
        profiler.profile_function("f", || Ok::<_, String>(1));
        profiler.profile_function("g", || Ok::<_, String>(2));
        profiler.profile_function("f", || Ok::<_, String>(3));

        let latest = profiler.get_function_profile("f").unwrap();
        assert_eq!(latest.return_value(), Some("3"));
        assert_eq!(latest.call_count, 1);
        assert!(profiler.get_function_profile("missing").is_none());
    }

    #[test]
    fn test_clear_history() {
        let profiler = timing_profiler();
        profiler.profile_function("f", || Ok::<_, String>(()));
        profiler.clear_history();
        assert!(profiler.get_profile_history().is_empty());
    }

    #[test]
    fn test_scope_guard_stops_on_drop() {
        let profiler = timing_profiler();
        {
            let guard = profiler.profile_scope("scoped");
            assert!(guard.is_active());
            assert!(profiler.is_session_active("scoped"));
        }
        assert!(!profiler.is_session_active("scoped"));
        assert_eq!(profiler.get_function_profile("scoped").unwrap().call_count, 1);
    }

    #[test]
    fn test_rejected_scope_guard_leaves_session_alone() {
        let profiler = timing_profiler();
        profiler.start_profile("job");
        {
            let guard = profiler.profile_scope("job");
            assert!(!guard.is_active());
        }
        assert!(profiler.is_session_active("job"));
        assert!(profiler.stop_profile("job").is_some());
    }

    #[test]
    fn test_builder_validates() {
        let err = Profiler::builder().capture_limit(0).build().unwrap_err();
        assert!(matches!(err, ProfilerError::ConfigError(_)));

        let profiler = Profiler::builder()
            .memory(false)
            .cpu(true)
            .cpu_clock(CpuClock::Process)
            .sampling(false)
            .report_top(3)
            .build()
            .unwrap();
        assert!(!profiler.config().memory_enabled);
        assert_eq!(profiler.config().cpu_clock, CpuClock::Process);
        assert_eq!(profiler.config().report_top, 3);
        assert!(profiler.instrumentation().memory.is_none());
    }

    #[test]
    fn test_builder_uses_injected_instrumentation() {
        let profiler = Profiler::builder()
            .instrumentation(Instrumentation::none())
            .build()
            .unwrap();
        assert!(profiler.instrumentation().memory.is_none());
        assert!(profiler.instrumentation().cpu.is_none());
    }
}

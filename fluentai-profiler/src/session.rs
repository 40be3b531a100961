//! Named profiling sessions
//!
//! A session measures an arbitrary stretch of code between an explicit
//! start and stop. Sessions are keyed by name; a name can only be active
//! once at a time, while differently named sessions may overlap freely.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};

use crate::result::ProfileResult;
use crate::tracer::{Instrumentation, OpenProbes};

/// State captured when a session starts
struct ActiveSession {
    started: Instant,
    probes: OpenProbes,
}

/// Tracks the currently open sessions of one profiler
#[derive(Default)]
pub struct SessionTracker {
    active: Mutex<HashMap<String, ActiveSession>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session. Returns `false` (and changes nothing) if a session
    /// with this name is already active.
    pub fn start(&self, name: &str, instrumentation: &Instrumentation) -> bool {
        let mut active = self.active.lock();
        if active.contains_key(name) {
            warn!("Profile session '{}' is already active", name);
            return false;
        }

        info!("Started profiling session: {}", name);
        // Key and map growth are allocated before the memory baseline is read.
        let session = active.entry(name.to_string()).or_insert(ActiveSession {
            started: Instant::now(),
            probes: OpenProbes::empty(),
        });
        session.probes = instrumentation.open();
        session.started = Instant::now();
        true
    }

    /// Close a session and build its result, or `None` if it is not active
    pub fn stop(&self, name: &str) -> Option<ProfileResult> {
        let entry = self.active.lock().remove_entry(name);
        let Some((key, session)) = entry else {
            warn!("No active profile session named '{}'", name);
            return None;
        };

        let elapsed = session.started.elapsed();
        let (memory, cpu) = session.probes.close();
        // Freed only once the memory probe has been read.
        drop(key);
        let result = ProfileResult::from_readings(name, elapsed, memory, cpu);
        info!(
            "Stopped profiling session: {} ({:.4}s)",
            name,
            elapsed.as_secs_f64()
        );
        Some(result)
    }

    /// Whether a session with this name is open
    pub fn is_active(&self, name: &str) -> bool {
        self.active.lock().contains_key(name)
    }

    /// Names of the open sessions, sorted
    pub fn active_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.active.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("active", &self.active_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop() {
        let tracker = SessionTracker::new();
        let instrumentation = Instrumentation::none();

        assert!(tracker.start("batch", &instrumentation));
        assert!(tracker.is_active("batch"));

        let result = tracker.stop("batch").unwrap();
        assert_eq!(result.function_name, "batch");
        assert_eq!(result.call_count, 1);
        assert!(!tracker.is_active("batch"));
        assert!(tracker.stop("batch").is_none());
    }

    #[test]
    fn test_duplicate_start_is_rejected() {
        let tracker = SessionTracker::new();
        let instrumentation = Instrumentation::none();

        assert!(tracker.start("x", &instrumentation));
        assert!(!tracker.start("x", &instrumentation));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_distinct_sessions_overlap() {
        let tracker = SessionTracker::new();
        let instrumentation = Instrumentation::none();

        tracker.start("b", &instrumentation);
        tracker.start("a", &instrumentation);
        assert_eq!(tracker.active_names(), vec!["a".to_string(), "b".to_string()]);

        assert!(tracker.stop("b").is_some());
        assert_eq!(tracker.active_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_stop_unknown_session() {
        let tracker = SessionTracker::new();
        assert!(tracker.stop("never-started").is_none());
        assert!(tracker.is_empty());
    }
}

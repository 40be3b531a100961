//! Measurement of a single call
//!
//! [`measure`] runs a callable exactly once inside the instrumentation of a
//! profiler and always produces a [`ProfileResult`], whether the callable
//! returned, returned an error or panicked. What the callable produced is
//! handed back separately as a [`CallOutcome`].

use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::capture::BoundedText;
use crate::result::{
    ProfileResult, DETAIL_ELAPSED_BEFORE_ERROR, DETAIL_PANICKED, DETAIL_RETURN_VALUE,
};
use crate::tracer::Instrumentation;

/// What a measured callable produced
pub enum CallOutcome<T, E> {
    /// The callable returned `Ok`
    Returned(T),
    /// The callable returned `Err`
    Failed(E),
    /// The callable panicked; the payload is kept for resuming
    Panicked(Box<dyn Any + Send + 'static>),
}

impl<T, E> CallOutcome<T, E> {
    /// The original result. A panic is resumed with its original payload.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            CallOutcome::Returned(value) => Ok(value),
            CallOutcome::Failed(err) => Err(err),
            CallOutcome::Panicked(payload) => panic::resume_unwind(payload),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for CallOutcome<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Returned(value) => f.debug_tuple("Returned").field(value).finish(),
            CallOutcome::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
            CallOutcome::Panicked(payload) => f
                .debug_tuple("Panicked")
                .field(&panic_message(payload.as_ref()))
                .finish(),
        }
    }
}

/// A measured call: the recorded result plus the call's outcome
#[derive(Debug)]
pub struct Measurement<T, E> {
    pub result: ProfileResult,
    pub outcome: CallOutcome<T, E>,
}

impl<T, E> Measurement<T, E> {
    /// The original result of the call, see [`CallOutcome::into_result`]
    pub fn into_result(self) -> Result<T, E> {
        self.outcome.into_result()
    }
}

/// Run `func` once under `instrumentation`
pub fn measure<T, E, F>(
    instrumentation: &Instrumentation,
    name: &str,
    capture_limit: usize,
    func: F,
) -> Measurement<T, E>
where
    T: fmt::Debug,
    E: fmt::Display,
    F: FnOnce() -> Result<T, E>,
{
    let probes = instrumentation.open();
    let start = Instant::now();
    let returned = panic::catch_unwind(AssertUnwindSafe(func));
    let elapsed = start.elapsed();
    let (memory, cpu) = probes.close();

    match returned {
        Ok(Ok(value)) => {
            let return_value = BoundedText::debug(&value, capture_limit);
            let result = ProfileResult::from_readings(name, elapsed, memory, cpu)
                .with_detail(DETAIL_RETURN_VALUE, return_value);
            Measurement {
                result,
                outcome: CallOutcome::Returned(value),
            }
        }
        Ok(Err(err)) => {
            let result = ProfileResult::failed(name, err.to_string())
                .with_detail(DETAIL_ELAPSED_BEFORE_ERROR, elapsed.as_secs_f64());
            Measurement {
                result,
                outcome: CallOutcome::Failed(err),
            }
        }
        Err(payload) => {
            let result = ProfileResult::failed(name, panic_message(payload.as_ref()))
                .with_detail(DETAIL_ELAPSED_BEFORE_ERROR, elapsed.as_secs_f64())
                .with_detail(DETAIL_PANICKED, Value::Bool(true));
            Measurement {
                result,
                outcome: CallOutcome::Panicked(payload),
            }
        }
    }
}

/// Text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_measure_success() {
        let measured = measure(&Instrumentation::none(), "answer", 100, || {
            Ok::<_, String>(42)
        });
        assert_eq!(measured.result.function_name, "answer");
        assert_eq!(measured.result.call_count, 1);
        assert_eq!(measured.result.return_value(), Some("42"));
        assert!(measured.result.memory_usage.is_none());
        assert!(measured.result.cpu_percent.is_none());
        assert_eq!(measured.into_result(), Ok(42));
    }

    #[test]
    fn test_measure_error_is_captured() {
        let measured = measure(&Instrumentation::none(), "fails", 100, || {
            std::thread::sleep(Duration::from_millis(2));
            Err::<(), _>("boom")
        });
        assert_eq!(measured.result.error(), Some("boom"));
        assert_eq!(measured.result.total_time, Duration::ZERO);
        let before_error = measured.result.details[DETAIL_ELAPSED_BEFORE_ERROR]
            .as_f64()
            .unwrap();
        assert!(before_error > 0.0);
        assert!(matches!(measured.outcome, CallOutcome::Failed("boom")));
    }

    #[test]
    fn test_measure_panic_is_captured() {
        let measured = measure(&Instrumentation::none(), "panics", 100, || -> Result<(), String> {
            panic!("kaboom")
        });
        assert_eq!(measured.result.error(), Some("kaboom"));
        assert_eq!(
            measured.result.details.get(DETAIL_PANICKED),
            Some(&Value::Bool(true))
        );
        assert!(matches!(measured.outcome, CallOutcome::Panicked(_)));
    }

    #[test]
    fn test_return_value_is_bounded() {
        let measured = measure(&Instrumentation::none(), "big", 16, || {
            Ok::<_, String>(vec![7u8; 10_000])
        });
        let captured = measured.result.return_value().unwrap();
        assert!(captured.len() <= 16 + crate::capture::TRUNCATION_MARKER.len());
        // The value itself is handed back untouched.
        assert_eq!(measured.into_result().unwrap().len(), 10_000);
    }

    #[test]
    #[should_panic(expected = "kaboom")]
    fn test_into_result_resumes_panic() {
        let measured = measure(&Instrumentation::none(), "panics", 100, || -> Result<(), String> {
            panic!("kaboom")
        });
        let _ = measured.into_result();
    }

    #[test]
    fn test_panic_message_formats() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let number: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(number.as_ref()), "panic with non-string payload");
    }
}

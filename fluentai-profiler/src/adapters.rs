//! Instrumentation adapters
//!
//! [`Profiled`] wraps a function so that every call through it is measured by
//! a private [`Profiler`]. The wrapped function keeps its normal contract:
//! the caller gets back exactly the `Ok` or `Err` the function returned, and
//! a panic is resumed after the failure has been recorded.
//!
//! Arguments are passed as a single value; use a tuple for several.
//!
//! ```
//! use fluentai_profiler::{profile_function_decorator, Invoke};
//!
//! fn checked_div((a, b): (i64, i64)) -> Result<i64, String> {
//!     if b == 0 {
//!         return Err("division by zero".to_string());
//!     }
//!     Ok(a / b)
//! }
//!
//! let div = profile_function_decorator(checked_div).with_name("checked_div");
//! assert_eq!(div.invoke((10, 2)), Ok(5));
//! assert!(div.invoke((1, 0)).is_err());
//! assert_eq!(div.profiler().get_profile_history().len(), 2);
//! ```

use std::fmt;

use crate::config::ProfilerConfig;
use crate::engine::Profiler;

/// Something that can be called with an argument value
pub trait Invoke<A> {
    type Output;

    fn invoke(&self, args: A) -> Self::Output;
}

/// A function measured on every call
pub struct Profiled<F> {
    name: String,
    func: F,
    profiler: Profiler,
}

impl<F> Profiled<F> {
    /// Wrap `func`, measuring with `profiler`
    pub fn new(name: impl Into<String>, func: F, profiler: Profiler) -> Self {
        Self {
            name: name.into(),
            func,
            profiler,
        }
    }

    /// Record calls under a different name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Name the calls are recorded under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The private profiler holding this function's history
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Unwrap the function
    pub fn into_inner(self) -> F {
        self.func
    }

    /// Call the wrapped function
    pub fn call<A, T, E>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Result<T, E>,
        T: fmt::Debug,
        E: fmt::Display,
    {
        self.invoke(args)
    }
}

impl<F, A, T, E> Invoke<A> for Profiled<F>
where
    F: Fn(A) -> Result<T, E>,
    T: fmt::Debug,
    E: fmt::Display,
{
    type Output = Result<T, E>;

    fn invoke(&self, args: A) -> Self::Output {
        self.profiler
            .profile_call(&self.name, || (self.func)(args))
            .into_result()
    }
}

impl<F> fmt::Debug for Profiled<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiled")
            .field("name", &self.name)
            .field("profiler", &self.profiler)
            .finish()
    }
}

/// Measure every call of `func` with timing, memory and CPU profiling.
/// Calls are recorded under the function's type name.
pub fn profile_function_decorator<F>(func: F) -> Profiled<F> {
    let name = std::any::type_name::<F>();
    Profiled::new(name, func, Profiler::with_config(ProfilerConfig::default()))
}

/// Measure every call of `func` with memory tracing only
pub fn profile_memory_decorator<F>(func: F) -> Profiled<F> {
    let name = std::any::type_name::<F>();
    Profiled::new(
        name,
        func,
        Profiler::with_config(ProfilerConfig::memory_only()),
    )
}

//! Bounded textual capture
//!
//! Return values and stack summaries are recorded as text, but only up to a
//! fixed number of bytes. [`BoundedText`] is a `fmt::Write` sink that refuses
//! to grow past its capacity: once full it reports `fmt::Error`, which stops
//! `Debug`/`Display` implementations from formatting the rest of the value.

use std::fmt::{self, Write};

/// Marker appended to captures that hit the capacity
pub const TRUNCATION_MARKER: &str = "...";

/// Fixed-capacity text buffer
#[derive(Debug, Clone)]
pub struct BoundedText {
    buf: String,
    capacity: usize,
    truncated: bool,
}

impl BoundedText {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity),
            capacity,
            truncated: false,
        }
    }

    /// Capture the `Debug` form of a value
    pub fn debug<T: fmt::Debug + ?Sized>(value: &T, capacity: usize) -> String {
        let mut text = Self::new(capacity);
        // An error here only means the capacity was reached.
        let _ = write!(text, "{:?}", value);
        text.finish()
    }

    /// Capture the `Display` form of a value
    pub fn display<T: fmt::Display + ?Sized>(value: &T, capacity: usize) -> String {
        let mut text = Self::new(capacity);
        let _ = write!(text, "{}", value);
        text.finish()
    }

    /// Bytes captured so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been captured
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Whether input was dropped because the buffer was full
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Remaining room in bytes
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Consume the buffer, appending the truncation marker if needed
    pub fn finish(mut self) -> String {
        if self.truncated {
            self.buf.push_str(TRUNCATION_MARKER);
        }
        self.buf
    }
}

impl Write for BoundedText {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Err(fmt::Error);
        }

        let remaining = self.remaining();
        if s.len() <= remaining {
            self.buf.push_str(s);
            return Ok(());
        }

        let mut cut = remaining;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buf.push_str(&s[..cut]);
        self.truncated = true;
        Err(fmt::Error)
    }
}

use log::{log_enabled, warn, Level};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Scoped timer emitting trace lines around a step phase.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            let elapsed = self.start.elapsed();
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
    }
}

/// Latch that lets a diagnostic fire a single time per owner.
#[derive(Debug, Default)]
pub struct ReportOnce {
    fired: AtomicBool,
}

impl ReportOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `message` as a warning unless it was already reported.
    pub fn warn(&self, message: &str) -> bool {
        if self.fired.swap(true, Ordering::Relaxed) {
            return false;
        }
        warn!("{message}");
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Relaxed)
    }
}

//! Controller-facing stop latch and external flag inputs.

use std::sync::atomic::{AtomicBool, Ordering};

/// Number of external flag inputs (EF1–EF4).
pub const EXTERNAL_FLAG_COUNT: usize = 4;

/// Shared control surface between the run loop and its controller.
///
/// The stop latch starts set: a freshly constructed machine is stopped
/// until `run()` clears it. External flags stand in for the EF1–EF4 pins
/// and are caller-driven only; the core never raises them itself.
#[derive(Debug)]
pub struct CpuControl {
    stop: AtomicBool,
    flags: [AtomicBool; EXTERNAL_FLAG_COUNT],
}

impl Default for CpuControl {
    fn default() -> Self {
        Self {
            stop: AtomicBool::new(true),
            flags: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
        }
    }
}

impl CpuControl {
    /// Creates a control surface with the stop latch set and all flags low.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a cooperative stop, observed within at most one in-flight
    /// instruction plus one scheduler resample tick.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn clear_stop(&self) {
        self.stop.store(false, Ordering::Release);
    }

    /// Returns `true` while a stop is latched (set before the first run
    /// and again once a run has been asked to end).
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Drives external flag `index` (`0..=3` selecting EF1–EF4).
    ///
    /// # Panics
    ///
    /// Panics when `index` is not in `0..=3`.
    pub fn set_external_flag(&self, index: usize, value: bool) {
        self.flags[index].store(value, Ordering::Release);
    }

    /// Samples external flag `index` (`0..=3` selecting EF1–EF4).
    ///
    /// # Panics
    ///
    /// Panics when `index` is not in `0..=3`.
    #[must_use]
    pub fn external_flag(&self, index: usize) -> bool {
        self.flags[index].load(Ordering::Acquire)
    }
}

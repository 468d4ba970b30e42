//! Input/output port registers, the Q latch and the change observer.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Number of addressable byte ports on each side (index space `0..=6`).
///
/// `OUT 1..7` and `INP 9..F` both map onto this shared index space.
pub const PORT_COUNT: usize = 7;

/// Observer receiving edge-triggered output notifications.
///
/// Methods fire only when a write actually changes the stored value, so a
/// presentation layer can react to LEDs, hex digits or the Q lamp without
/// polling. `Send` because the observer rides to the worker thread inside
/// the CPU.
pub trait OutputObserver: Send {
    /// Output port `port` changed to `value`.
    fn on_port_changed(&mut self, port: usize, value: u8);

    /// The Q latch changed to `on`.
    fn on_q_changed(&mut self, on: bool);
}

/// Input port registers.
///
/// Writable through `&self` so a controller thread can feed asynchronous
/// hardware inputs through an `Arc<InputPorts>` while the CPU runs.
#[derive(Debug, Default)]
pub struct InputPorts {
    ports: [AtomicU8; PORT_COUNT],
}

impl InputPorts {
    /// Creates all-zero input ports.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `value` to input port `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` is not in `0..=6`.
    pub fn set_port(&self, index: usize, value: u8) {
        self.ports[index].store(value, Ordering::Relaxed);
    }

    /// Reads input port `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` is not in `0..=6`.
    #[must_use]
    pub fn get_port(&self, index: usize) -> u8 {
        self.ports[index].load(Ordering::Relaxed)
    }
}

/// Output port registers plus the one-bit Q latch.
#[derive(Default)]
pub struct OutputPorts {
    ports: [u8; PORT_COUNT],
    q_on: bool,
    observer: Option<Box<dyn OutputObserver>>,
}

impl fmt::Debug for OutputPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputPorts")
            .field("ports", &self.ports)
            .field("q_on", &self.q_on)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl OutputPorts {
    /// Creates all-zero output ports with Q off and no observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires the observer notified on every port or Q transition.
    pub fn register_observer(&mut self, observer: Box<dyn OutputObserver>) {
        self.observer = Some(observer);
    }

    /// Writes `value` to output port `index`, notifying the observer only
    /// when the stored value actually changes.
    ///
    /// # Panics
    ///
    /// Panics when `index` is not in `0..=6`.
    pub fn set_port(&mut self, index: usize, value: u8) {
        if self.ports[index] != value {
            if let Some(observer) = self.observer.as_mut() {
                observer.on_port_changed(index, value);
            }
        }
        self.ports[index] = value;
    }

    /// Reads output port `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` is not in `0..=6`.
    #[must_use]
    pub fn get_port(&self, index: usize) -> u8 {
        self.ports[index]
    }

    /// Drives the Q latch, notifying the observer only on transitions.
    pub fn set_q(&mut self, on: bool) {
        if self.q_on != on {
            if let Some(observer) = self.observer.as_mut() {
                observer.on_q_changed(on);
            }
        }
        self.q_on = on;
    }

    /// Returns `true` while the Q latch is on.
    #[must_use]
    pub const fn is_q_on(&self) -> bool {
        self.q_on
    }
}

//! Host-observable machine states.

/// Deterministic execution-state machine for host-observable control flow.
///
/// `Stopped` → `Running` when `run()` clears the stop latch; `Running` →
/// `Idle` on executing `IDL`; `Running` → `Stopped` on an external
/// `stop()`, on crossing a configured cycle cap, or — caller-driven —
/// after a decode fault. `Idle` and `Stopped` return to `Running` only
/// through an explicit `reset()` followed by `run()`; there is no
/// automatic wake from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Not executing; the state a fresh or stopped machine rests in.
    #[default]
    Stopped,
    /// Executing instructions inside `run()`.
    Running,
    /// Halted by `IDL` until the next reset.
    Idle,
}

impl RunState {
    /// Returns `true` when the machine will make no further progress
    /// without an explicit `reset()` and `run()`.
    #[must_use]
    pub const fn is_halted(self) -> bool {
        matches!(self, Self::Stopped | Self::Idle)
    }
}

//! Cycle accounting and the real-time pacing scheduler.

use std::thread;
use std::time::{Duration, Instant};

use crate::opcode::Opcode;

/// Machine cycles emulated per wall-clock millisecond.
///
/// The original board clocks the CPU at about 1.79 MHz with eight clock
/// pulses per machine cycle: 1790 / 8 ≈ 224 cycles per millisecond.
pub const CYCLES_PER_MS: u64 = 224;

/// Machine-cycle cost of executing one instruction.
///
/// The documented timing gives every instruction two machine cycles
/// except `NOP` and the long-branch/long-skip rows, which take three.
#[must_use]
pub const fn cycle_cost(opcode: Opcode) -> u64 {
    match opcode {
        Opcode::Nop | Opcode::LongBranch(_) | Opcode::LongSkip(_) => 3,
        _ => 2,
    }
}

/// Self-correcting wall-clock governor for the run loop.
///
/// Tracks cycles executed since the last checkpoint. Once the current
/// budget is exceeded the pacer blocks until the wall clock has advanced
/// at least one millisecond past the checkpoint, then sets the next
/// budget to `CYCLES_PER_MS * elapsed_ms`. Emulated time never runs ahead
/// of the wall clock at checkpoint granularity, and a host stall enlarges
/// the next budget instead of accumulating drift.
#[derive(Debug)]
pub struct Pacer {
    budget: u64,
    checkpoint_cycles: u64,
    checkpoint: Instant,
}

impl Pacer {
    const RESAMPLE: Duration = Duration::from_millis(1);

    /// Opens a pacing checkpoint at the given cycle count.
    #[must_use]
    pub fn start(cycles: u64) -> Self {
        Self {
            budget: CYCLES_PER_MS,
            checkpoint_cycles: cycles,
            checkpoint: Instant::now(),
        }
    }

    /// Throttles after an instruction retires with `cycles` total executed.
    ///
    /// Blocks in one-millisecond resample steps while the wall clock has
    /// not moved since the checkpoint; `should_abort` is polled before
    /// each step so a pending stop cuts the wait short. This is the run
    /// loop's sole suspension point.
    pub fn pace(&mut self, cycles: u64, mut should_abort: impl FnMut() -> bool) {
        if cycles.saturating_sub(self.checkpoint_cycles) <= self.budget {
            return;
        }

        let mut elapsed_ms = self.elapsed_ms();
        while elapsed_ms == 0 {
            if should_abort() {
                return;
            }
            thread::sleep(Self::RESAMPLE);
            elapsed_ms = self.elapsed_ms();
        }

        self.budget = CYCLES_PER_MS * elapsed_ms;
        self.checkpoint_cycles = cycles;
        self.checkpoint = Instant::now();
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.checkpoint.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{cycle_cost, Pacer, CYCLES_PER_MS};
    use crate::opcode::{Condition, Opcode};

    #[test]
    fn documented_instruction_costs() {
        assert_eq!(cycle_cost(Opcode::Idl), 2);
        assert_eq!(cycle_cost(Opcode::Ldi), 2);
        assert_eq!(cycle_cost(Opcode::Skp), 2);
        assert_eq!(cycle_cost(Opcode::ShortBranch(Condition::Always)), 2);
        assert_eq!(cycle_cost(Opcode::Nop), 3);
        assert_eq!(cycle_cost(Opcode::LongBranch(Condition::Zero)), 3);
        assert_eq!(cycle_cost(Opcode::LongSkip(Condition::Always)), 3);
        assert_eq!(cycle_cost(Opcode::LongSkip(Condition::InterruptsEnabled)), 3);
    }

    #[test]
    fn no_wait_while_within_budget() {
        let mut pacer = Pacer::start(0);
        let started = Instant::now();
        pacer.pace(CYCLES_PER_MS, || false);
        assert!(started.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn emulated_time_never_outruns_the_wall_clock() {
        let total_cycles = 10 * CYCLES_PER_MS;
        let started = Instant::now();

        let mut pacer = Pacer::start(0);
        let mut cycles = 0;
        while cycles < total_cycles {
            cycles += 2;
            pacer.pace(cycles, || false);
        }

        // 2240 cycles at 224 cycles/ms need about 10 ms; allow for the
        // budget chunk in flight when the loop ends.
        assert!(started.elapsed() >= Duration::from_millis(7));
    }

    #[test]
    fn pending_abort_cuts_the_wait_short() {
        let mut pacer = Pacer::start(0);
        let started = Instant::now();
        pacer.pace(10 * CYCLES_PER_MS, || true);
        assert!(started.elapsed() < Duration::from_millis(5));
    }
}

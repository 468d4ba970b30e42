//! COSMAC 1802 emulator core for the Elf II single-board computer.
//!
//! The crate models the CPU interpreter — fetch/decode/dispatch over the
//! closed 256-entry opcode space — together with the register and flag
//! file, flat memory behind the front-panel write-protect latch, the
//! input/output ports with their edge-triggered change observer, and the
//! real-time pacing scheduler that throttles emulated execution to the
//! original ~1.79 MHz clock. Presentation concerns (buttons, LEDs, hex
//! digits, file dialogs) belong to host layers built on top of this
//! crate; they reach the core only through [`Cpu`], [`Memory`],
//! [`InputPorts`] and [`OutputPorts`].

/// Flat byte-addressable memory with the write-protect latch.
pub mod memory;
pub use memory::{Memory, MEMORY_BYTES};

/// Input/output port registers, the Q latch and the change observer.
pub mod ports;
pub use ports::{InputPorts, OutputObserver, OutputPorts, PORT_COUNT};

/// Controller-facing stop latch and external flag inputs.
pub mod control;
pub use control::{CpuControl, EXTERNAL_FLAG_COUNT};

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{RegisterFile, RunState, GENERAL_REGISTER_COUNT};

/// Deterministic opcode classification tables.
pub mod opcode;
pub use opcode::{decode, Condition, Opcode, UNDEFINED_OPCODE};

/// Cycle accounting and the real-time pacing scheduler.
pub mod timing;
pub use timing::{cycle_cost, Pacer, CYCLES_PER_MS};

/// The decode fault raised for the undefined opcode byte.
pub mod fault;
pub use fault::DecodeFault;

/// The CPU interpreter and run loop.
pub mod cpu;
pub use cpu::Cpu;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;

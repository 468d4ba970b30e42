//! The decode fault raised for the one undefined opcode byte.

use thiserror::Error;

/// Fatal decode fault: the fetched opcode byte has no defined handler.
///
/// Exactly one byte value (`0x68`) is undefined in this instruction set.
/// Raising this fault ends the `run()` invocation that hit it; the caller
/// owns the transition to `Stopped` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[error("unknown opcode {opcode:02x}")]
pub struct DecodeFault {
    opcode: u8,
}

impl DecodeFault {
    /// Wraps the unrecognized opcode byte.
    #[must_use]
    pub const fn new(opcode: u8) -> Self {
        Self { opcode }
    }

    /// Returns the unrecognized opcode byte.
    #[must_use]
    pub const fn opcode(self) -> u8 {
        self.opcode
    }

    /// Returns the opcode as the two-digit lowercase hex string hosts
    /// show in their error surfaces.
    #[must_use]
    pub fn opcode_hex(self) -> String {
        format!("{:02x}", self.opcode)
    }
}

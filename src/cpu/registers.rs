//! LC-3 register file and condition codes.
//!
//! The LC-3 has:
//! - R0..R7: eight 16-bit general-purpose registers (R7 doubles as the
//!   subroutine/trap return-address register)
//! - PC: 16-bit program counter
//! - CC: a single 3-way condition code (N/Z/P)

use serde::{Deserialize, Serialize};

/// Conventional load/start address for user programs.
pub const PC_START: u16 = 0x3000;

/// The LC-3 condition code: exactly one of N, Z, P is set at any time.
///
/// Each variant maps to one bit of the 3-bit branch mask carried in bits
/// 9-11 of a BR instruction (n = bit 11, z = bit 10, p = bit 9), so the
/// branch test is a bitwise intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CondCode {
    /// Last result was negative as a signed 16-bit value.
    Negative,
    /// Last result was zero.
    Zero,
    /// Last result was positive.
    Positive,
}

impl CondCode {
    /// Classify a 16-bit value by its signed interpretation.
    #[inline]
    pub fn from_value(value: u16) -> Self {
        match (value as i16).signum() {
            -1 => CondCode::Negative,
            0 => CondCode::Zero,
            _ => CondCode::Positive,
        }
    }

    /// The bit this flag occupies in a BR instruction's nzp mask.
    #[inline]
    pub const fn mask_bit(self) -> u16 {
        match self {
            CondCode::Negative => 0b100,
            CondCode::Zero => 0b010,
            CondCode::Positive => 0b001,
        }
    }
}

/// The LC-3 register file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Registers {
    /// R0..R7 general-purpose registers.
    pub gpr: [u16; 8],

    /// Program counter.
    pub pc: u16,

    /// Condition code, updated by every instruction that writes a
    /// general-purpose register through DR.
    pub cc: CondCode,
}

impl Registers {
    /// Create a register file with all GPRs zeroed, PC at 0x3000 and the
    /// condition code at Z.
    pub fn new() -> Self {
        Self {
            gpr: [0; 8],
            pc: PC_START,
            cc: CondCode::Zero,
        }
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        self.gpr = [0; 8];
        self.pc = PC_START;
        self.cc = CondCode::Zero;
    }

    /// Read a general-purpose register. Register fields are 3 bits by
    /// construction, so only the low 3 bits of `index` are used.
    #[inline]
    pub fn read(&self, index: u16) -> u16 {
        self.gpr[(index & 0b111) as usize]
    }

    /// Write a general-purpose register.
    #[inline]
    pub fn write(&mut self, index: u16, value: u16) {
        self.gpr[(index & 0b111) as usize] = value;
    }

    /// Update the condition code from a freshly written register value,
    /// interpreted as signed 16-bit.
    #[inline]
    pub fn set_cc(&mut self, value: u16) {
        self.cc = CondCode::from_value(value);
    }

    /// Increment the program counter, wrapping at the 64K boundary.
    /// Returns the old value (the address of the fetched word).
    #[inline]
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// Set the program counter to an absolute address.
    #[inline]
    pub fn jump(&mut self, addr: u16) {
        self.pc = addr;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

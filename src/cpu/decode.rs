//! Instruction-word decoding for the LC-3.
//!
//! An LC-3 instruction is a single 16-bit word: the top 4 bits select the
//! opcode and the remaining bits are overlapping operand fields whose
//! interpretation depends on the opcode. Decoding is split in two:
//!
//! - [`Fields::decode`] extracts every named bit field (pure and total:
//!   any 16-bit pattern yields a field record, even fields the owning
//!   opcode never consults);
//! - [`Opcode::from_word`] maps the top 4 bits to a handler, failing on
//!   the two unmapped encodings (0x8 and 0xD).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sign-extend the low `bits` bits of `value` to 16 bits.
///
/// `bits` must be in 1..16.
#[inline]
pub fn sign_extend(value: u16, bits: u32) -> u16 {
    debug_assert!(bits > 0 && bits < 16);
    let magnitude = value & ((1u16 << bits) - 1);
    if magnitude & (1u16 << (bits - 1)) != 0 {
        magnitude | (0xFFFFu16 << bits)
    } else {
        magnitude
    }
}

/// The operand fields of one instruction word, every field always present.
///
/// Register-selecting fields (`dr`/`sr`, `sr1`/`base_r`, `sr2`) are 3-bit
/// indices in 0..8 by construction. The sign-dependent fields (`imm5`,
/// `pc_offset9`, `pc_offset11`, `offset6`) are stored already sign-extended
/// to 16 bits; consumers add them with plain wrapping arithmetic. This
/// record is rebuilt from scratch for every executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fields {
    /// Destination register, bits 9-11.
    pub dr: u16,
    /// Single-source register (NOT, ST, STI, STR), same bits as `dr`.
    pub sr: u16,
    /// First source register, bits 6-8.
    pub sr1: u16,
    /// Base register, same bits as `sr1` (disambiguated by opcode).
    pub base_r: u16,
    /// Second source register, bits 0-2.
    pub sr2: u16,
    /// Addressing-mode selector: 0 = register, 1 = immediate.
    pub bit5: bool,
    /// 5-bit immediate, bits 0-4, sign-extended.
    pub imm5: u16,
    /// 9-bit PC-relative offset, bits 0-8, sign-extended.
    pub pc_offset9: u16,
    /// 11-bit PC-relative offset, bits 0-10, sign-extended.
    pub pc_offset11: u16,
    /// Addressing-mode selector for JSR: 1 = PC-relative, 0 = register.
    pub bit11: bool,
    /// 6-bit base+offset displacement, bits 0-5, sign-extended.
    pub offset6: u16,
    /// Trap vector, bits 0-7 (zero-extended by definition).
    pub trapvect8: u16,
    /// nzp branch mask, bits 9-11 (bit 11 = n, bit 10 = z, bit 9 = p).
    pub branch_mask: u16,
}

impl Fields {
    /// Decode all operand fields of `word`.
    pub fn decode(word: u16) -> Self {
        let reg_high = (word >> 9) & 0b111;
        let reg_mid = (word >> 6) & 0b111;

        Self {
            dr: reg_high,
            sr: reg_high,
            sr1: reg_mid,
            base_r: reg_mid,
            sr2: word & 0b111,
            bit5: word & (1 << 5) != 0,
            imm5: sign_extend(word, 5),
            pc_offset9: sign_extend(word, 9),
            pc_offset11: sign_extend(word, 11),
            bit11: word & (1 << 11) != 0,
            offset6: sign_extend(word, 6),
            trapvect8: word & 0xFF,
            branch_mask: reg_high,
        }
    }
}

/// The 14 implemented LC-3 opcodes.
///
/// 0x8 (RTI) and 0xD (reserved) have no handler; fetching either is an
/// illegal-instruction fault, not a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    /// Conditional branch (0x0).
    Br,
    /// Add register or immediate (0x1).
    Add,
    /// PC-relative load (0x2).
    Ld,
    /// PC-relative store (0x3).
    St,
    /// Jump to subroutine, PC-relative or via register (0x4).
    Jsr,
    /// Bitwise AND, register or immediate (0x5).
    And,
    /// Base+offset load (0x6).
    Ldr,
    /// Base+offset store (0x7).
    Str,
    /// Bitwise complement (0x9).
    Not,
    /// Indirect load (0xA).
    Ldi,
    /// Indirect store (0xB).
    Sti,
    /// Jump via register (0xC).
    Jmp,
    /// Load effective address (0xE).
    Lea,
    /// Trap: save return address, jump through the vector table (0xF).
    Trap,
}

impl Opcode {
    /// Dispatch on the top 4 bits of an instruction word.
    pub fn from_word(word: u16) -> Result<Self, DecodeError> {
        match word >> 12 {
            0x0 => Ok(Opcode::Br),
            0x1 => Ok(Opcode::Add),
            0x2 => Ok(Opcode::Ld),
            0x3 => Ok(Opcode::St),
            0x4 => Ok(Opcode::Jsr),
            0x5 => Ok(Opcode::And),
            0x6 => Ok(Opcode::Ldr),
            0x7 => Ok(Opcode::Str),
            0x9 => Ok(Opcode::Not),
            0xA => Ok(Opcode::Ldi),
            0xB => Ok(Opcode::Sti),
            0xC => Ok(Opcode::Jmp),
            0xE => Ok(Opcode::Lea),
            0xF => Ok(Opcode::Trap),
            op => Err(DecodeError::IllegalOpcode(op as u8)),
        }
    }

    /// The assembly mnemonic for this opcode.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Br => "BR",
            Opcode::Add => "ADD",
            Opcode::Ld => "LD",
            Opcode::St => "ST",
            Opcode::Jsr => "JSR",
            Opcode::And => "AND",
            Opcode::Ldr => "LDR",
            Opcode::Str => "STR",
            Opcode::Not => "NOT",
            Opcode::Ldi => "LDI",
            Opcode::Sti => "STI",
            Opcode::Jmp => "JMP",
            Opcode::Lea => "LEA",
            Opcode::Trap => "TRAP",
        }
    }
}

/// Errors that can occur during instruction dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The top 4 bits name no implemented instruction.
    #[error("illegal opcode 0x{0:X}")]
    IllegalOpcode(u8),
}

//! # LC-3 Emulator
//!
//! A cycle-by-cycle, behavioral emulator of the LC-3 educational 16-bit
//! computer: 16 opcodes (14 implemented), 8 general-purpose registers, a
//! 64K-word address space and a 3-way condition code.
//!
//! The crate covers the execution core — bit-field decoding, opcode
//! dispatch, instruction semantics and the binary object-file loader —
//! and leaves assembly, debugging UIs and I/O devices to its callers.

pub mod cpu;
pub mod disasm;
pub mod obj;

// Re-export commonly used types
pub use cpu::{
    CondCode, Cpu, CpuError, CpuState, DecodeError, Fields, Memory, Opcode, Registers, PC_START,
};
pub use disasm::{disassemble, disassemble_word};
pub use obj::{load_file, load_into, Block, ObjError, ObjectFile};

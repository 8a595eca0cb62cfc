//! CPU emulation for the LC-3 computer.
//!
//! This module implements the complete machine:
//! - 65536 sixteen-bit memory cells
//! - 8 general-purpose registers, a 16-bit PC and a 3-way condition code
//! - the 14-instruction set with register, immediate, PC-relative,
//!   base+offset and indirect addressing

pub mod decode;
pub mod execute;
pub mod memory;
pub mod registers;

pub use decode::{DecodeError, Fields, Opcode};
pub use execute::{Cpu, CpuError, CpuState};
pub use memory::Memory;
pub use registers::{CondCode, Registers, PC_START};

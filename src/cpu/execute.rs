//! LC-3 execution engine.
//!
//! Implements the fetch-increment-decode-dispatch-execute cycle and the
//! semantics of every instruction. PC-relative offsets are relative to the
//! incremented PC, i.e. the address of the *next* instruction.

use crate::cpu::decode::{DecodeError, Fields, Opcode};
use crate::cpu::{Memory, Registers};
use crate::obj::ObjectFile;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// CPU execution state.
///
/// There is no halt opcode: a running machine stops only when the caller
/// stops stepping it, or when it faults on an illegal instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is executing normally.
    Running,
    /// CPU faulted on an illegal instruction and must be reset.
    Faulted,
}

/// The LC-3 machine: registers, memory and execution state, owned as one
/// aggregate per simulation session.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// Register file (R0..R7, PC, CC).
    pub regs: Registers,
    /// Main memory, 64K words.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Executed-instruction count.
    pub steps: u64,
    /// Last executed opcode (for debugging).
    last_op: Option<Opcode>,
}

impl Cpu {
    /// Create a new machine: zeroed registers and memory, PC at 0x3000,
    /// condition code Z.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Running,
            steps: 0,
            last_op: None,
        }
    }

    /// Reset the machine to its initial state.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.steps = 0;
        self.last_op = None;
    }

    /// Copy a parsed object file into memory and point the PC at its
    /// first block, if it has one.
    pub fn load_object(&mut self, obj: &ObjectFile) {
        obj.apply(&mut self.mem);
        if let Some(entry) = obj.entry() {
            self.regs.jump(entry);
        }
    }

    /// Execute a single instruction.
    ///
    /// Fetches `mem[pc]`, increments the PC, decodes, dispatches and
    /// executes. Returns the executed opcode. An unmapped opcode faults
    /// the machine and is reported as an error, never skipped.
    pub fn step(&mut self) -> Result<Opcode, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        // Fetch; PC is incremented before the instruction executes
        let addr = self.regs.pc;
        let word = self.mem.read(addr);
        self.regs.advance_pc();

        // Decode and dispatch
        let fields = Fields::decode(word);
        let op = match Opcode::from_word(word) {
            Ok(op) => op,
            Err(source) => {
                self.state = CpuState::Faulted;
                return Err(CpuError::IllegalInstruction { addr, source });
            }
        };

        // Execute
        self.execute(op, &fields);

        self.steps += 1;
        self.last_op = Some(op);

        Ok(op)
    }

    /// Run for at most `max_steps` instructions.
    ///
    /// Returns the number of instructions executed. Termination policy
    /// is the caller's: the machine itself never stops while legal
    /// instructions keep coming.
    pub fn run_limited(&mut self, max_steps: u64) -> Result<u64, CpuError> {
        let start = self.steps;
        let limit = self.steps + max_steps;

        while self.state == CpuState::Running && self.steps < limit {
            self.step()?;
        }

        Ok(self.steps - start)
    }

    /// Execute one decoded instruction.
    fn execute(&mut self, op: Opcode, f: &Fields) {
        match op {
            Opcode::Add => self.add(f),
            Opcode::And => self.and(f),
            Opcode::Br => self.br(f),
            Opcode::Jmp => self.jmp(f),
            Opcode::Jsr => self.jsr(f),
            Opcode::Ld => self.ld(f),
            Opcode::Ldi => self.ldi(f),
            Opcode::Ldr => self.ldr(f),
            Opcode::Lea => self.lea(f),
            Opcode::Not => self.not(f),
            Opcode::St => self.st(f),
            Opcode::Sti => self.sti(f),
            Opcode::Str => self.str(f),
            Opcode::Trap => self.trap(f),
        }
    }

    /// DR := SR1 + (imm5 | SR2), wrapping.
    fn add(&mut self, f: &Fields) {
        let rhs = if f.bit5 { f.imm5 } else { self.regs.read(f.sr2) };
        let res = self.regs.read(f.sr1).wrapping_add(rhs);
        self.regs.write(f.dr, res);
        self.regs.set_cc(res);
    }

    /// DR := SR1 & (imm5 | SR2).
    fn and(&mut self, f: &Fields) {
        let rhs = if f.bit5 { f.imm5 } else { self.regs.read(f.sr2) };
        let res = self.regs.read(f.sr1) & rhs;
        self.regs.write(f.dr, res);
        self.regs.set_cc(res);
    }

    /// If the current condition code is in the nzp mask, PC += PCoffset9.
    fn br(&mut self, f: &Fields) {
        if self.regs.cc.mask_bit() & f.branch_mask != 0 {
            let target = self.regs.pc.wrapping_add(f.pc_offset9);
            self.regs.jump(target);
        }
    }

    /// PC := BaseR (the register's value).
    fn jmp(&mut self, f: &Fields) {
        let target = self.regs.read(f.base_r);
        self.regs.jump(target);
    }

    /// R7 := return address; PC := PC + PCoffset11 (bit11 set) or BaseR.
    ///
    /// The return address is captured before the target is read so that
    /// `JSRR R7` jumps to the old R7.
    fn jsr(&mut self, f: &Fields) {
        let ret = self.regs.pc;
        let target = if f.bit11 {
            self.regs.pc.wrapping_add(f.pc_offset11)
        } else {
            self.regs.read(f.base_r)
        };
        self.regs.jump(target);
        self.regs.write(7, ret);
    }

    /// DR := mem[PC + PCoffset9].
    fn ld(&mut self, f: &Fields) {
        let val = self.mem.read(self.regs.pc.wrapping_add(f.pc_offset9));
        self.regs.write(f.dr, val);
        self.regs.set_cc(val);
    }

    /// DR := mem[mem[PC + PCoffset9]].
    fn ldi(&mut self, f: &Fields) {
        let ptr = self.mem.read(self.regs.pc.wrapping_add(f.pc_offset9));
        let val = self.mem.read(ptr);
        self.regs.write(f.dr, val);
        self.regs.set_cc(val);
    }

    /// DR := mem[BaseR + offset6].
    fn ldr(&mut self, f: &Fields) {
        let base = self.regs.read(f.base_r);
        let val = self.mem.read(base.wrapping_add(f.offset6));
        self.regs.write(f.dr, val);
        self.regs.set_cc(val);
    }

    /// DR := PC + PCoffset9, no memory access.
    fn lea(&mut self, f: &Fields) {
        let val = self.regs.pc.wrapping_add(f.pc_offset9);
        self.regs.write(f.dr, val);
        self.regs.set_cc(val);
    }

    /// DR := NOT SR.
    fn not(&mut self, f: &Fields) {
        let val = !self.regs.read(f.sr);
        self.regs.write(f.dr, val);
        self.regs.set_cc(val);
    }

    /// mem[PC + PCoffset9] := SR.
    fn st(&mut self, f: &Fields) {
        let val = self.regs.read(f.sr);
        self.mem.write(self.regs.pc.wrapping_add(f.pc_offset9), val);
    }

    /// mem[mem[PC + PCoffset9]] := SR.
    fn sti(&mut self, f: &Fields) {
        let val = self.regs.read(f.sr);
        let ptr = self.mem.read(self.regs.pc.wrapping_add(f.pc_offset9));
        self.mem.write(ptr, val);
    }

    /// mem[BaseR + offset6] := SR.
    fn str(&mut self, f: &Fields) {
        let base = self.regs.read(f.base_r);
        let val = self.regs.read(f.sr);
        self.mem.write(base.wrapping_add(f.offset6), val);
    }

    /// R7 := return address; PC := mem[trapvect8].
    ///
    /// Pure vector-table indirection: the service routine is ordinary
    /// code the caller must have loaded at the vectored address.
    fn trap(&mut self, f: &Fields) {
        let ret = self.regs.pc;
        let target = self.mem.read(f.trapvect8);
        self.regs.jump(target);
        self.regs.write(7, ret);
    }

    /// Get the last executed opcode.
    pub fn last_opcode(&self) -> Option<Opcode> {
        self.last_op
    }

    /// Check if the machine is still runnable.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// Check if the machine faulted on an illegal instruction.
    pub fn is_faulted(&self) -> bool {
        self.state == CpuState::Faulted
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("steps", &self.steps)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuError {
    /// The machine is not in the `Running` state.
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    /// The fetched word has no mapped opcode.
    #[error("illegal instruction at 0x{addr:04X}: {source}")]
    IllegalInstruction {
        /// Address the word was fetched from.
        addr: u16,
        #[source]
        source: DecodeError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::registers::CondCode;

    /// A machine with `program` placed at 0x3000 and the PC pointing there.
    fn cpu_with(program: &[u16]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.mem.write_block(0x3000, program);
        cpu
    }

    #[test]
    fn test_add_immediate_end_to_end() {
        // ADD R0, R0, #5 at 0x3000
        let mut cpu = cpu_with(&[0x1025]);

        let op = cpu.step().unwrap();

        assert_eq!(op, Opcode::Add);
        assert_eq!(cpu.regs.read(0), 5);
        assert_eq!(cpu.regs.cc, CondCode::Positive);
        assert_eq!(cpu.regs.pc, 0x3001);
        assert_eq!(cpu.steps, 1);
    }

    #[test]
    fn test_add_negative_immediate_wraps() {
        // ADD R0, R0, #-1: 0 + (-1) = 0xFFFF
        let mut cpu = cpu_with(&[0x103F]);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.read(0), 0xFFFF);
        assert_eq!(cpu.regs.cc, CondCode::Negative);
    }

    #[test]
    fn test_add_register_mode() {
        // ADD R2, R0, R1
        let mut cpu = cpu_with(&[0x1401]);
        cpu.regs.write(0, 0x7FFF);
        cpu.regs.write(1, 0x0001);
        cpu.step().unwrap();

        // 0x7FFF + 1 wraps into the negative half
        assert_eq!(cpu.regs.read(2), 0x8000);
        assert_eq!(cpu.regs.cc, CondCode::Negative);
    }

    #[test]
    fn test_and_register_mode() {
        // AND R2, R0, R1
        let mut cpu = cpu_with(&[0x5401]);
        cpu.regs.write(0, 0xF0F0);
        cpu.regs.write(1, 0xFF00);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.read(2), 0xF000);
        assert_eq!(cpu.regs.cc, CondCode::Negative);
    }

    #[test]
    fn test_and_immediate_zero_sets_z() {
        // AND R0, R0, #0
        let mut cpu = cpu_with(&[0x5020]);
        cpu.regs.write(0, 0x1234);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.read(0), 0);
        assert_eq!(cpu.regs.cc, CondCode::Zero);
    }

    #[test]
    fn test_br_only_on_matching_cc() {
        // BRz #+4
        for (cc, taken) in [
            (CondCode::Zero, true),
            (CondCode::Negative, false),
            (CondCode::Positive, false),
        ] {
            let mut cpu = cpu_with(&[0x0404]);
            cpu.regs.cc = cc;
            cpu.step().unwrap();

            let expected = if taken { 0x3005 } else { 0x3001 };
            assert_eq!(cpu.regs.pc, expected, "cc = {cc:?}");
        }
    }

    #[test]
    fn test_br_backward_offset() {
        // BRnzp #-2 at 0x3000: PC = 0x3001 - 2 = 0x2FFF
        let mut cpu = cpu_with(&[0x0FFE]);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 0x2FFF);
    }

    #[test]
    fn test_jmp_uses_register_value() {
        // JMP R3
        let mut cpu = cpu_with(&[0xC0C0]);
        cpu.regs.write(3, 0x4123);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 0x4123);
    }

    #[test]
    fn test_jsr_relative_saves_return_and_wraps() {
        // JSR with PCoffset11 = -0x400 placed near the top of memory so
        // the target wraps past 0xFFFF
        let mut cpu = Cpu::new();
        cpu.mem.write(0xFFFE, 0x4C00); // JSR #-1024
        cpu.regs.jump(0xFFFE);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.read(7), 0xFFFF);
        // 0xFFFF + (-0x400) = 0xFBFF
        assert_eq!(cpu.regs.pc, 0xFBFF);
    }

    #[test]
    fn test_jsr_forward_wraps_past_top() {
        let mut cpu = Cpu::new();
        cpu.mem.write(0xFFFF, 0x4810); // JSR #+16
        cpu.regs.jump(0xFFFF);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.read(7), 0x0000);
        assert_eq!(cpu.regs.pc, 0x0010);
    }

    #[test]
    fn test_jsrr_via_r7_uses_old_value() {
        // JSRR R7: jump to the old R7, then R7 holds the return address
        let mut cpu = cpu_with(&[0x41C0]);
        cpu.regs.write(7, 0x5000);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.pc, 0x5000);
        assert_eq!(cpu.regs.read(7), 0x3001);
    }

    #[test]
    fn test_ld() {
        // LD R1, #+2 -> mem[0x3003]
        let mut cpu = cpu_with(&[0x2202]);
        cpu.mem.write(0x3003, 0x8001);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.read(1), 0x8001);
        assert_eq!(cpu.regs.cc, CondCode::Negative);
    }

    #[test]
    fn test_ldi() {
        // LDI R1, #+2: mem[0x3003] holds a pointer
        let mut cpu = cpu_with(&[0xA202]);
        cpu.mem.write(0x3003, 0x4000);
        cpu.mem.write(0x4000, 0x0042);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.read(1), 0x0042);
        assert_eq!(cpu.regs.cc, CondCode::Positive);
    }

    #[test]
    fn test_ldr_negative_offset() {
        // LDR R1, R2, #-1
        let mut cpu = cpu_with(&[0x62BF]);
        cpu.regs.write(2, 0x4000);
        cpu.mem.write(0x3FFF, 0x0007);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.read(1), 0x0007);
    }

    #[test]
    fn test_lea_no_memory_access() {
        // LEA R4, #-3 at 0x3000: R4 = 0x3001 - 3 = 0x2FFE
        let mut cpu = cpu_with(&[0xE9FD]);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.read(4), 0x2FFE);
        assert_eq!(cpu.regs.cc, CondCode::Positive);
    }

    #[test]
    fn test_not_complements_in_place() {
        // NOT R1: SR shares bits 9-11 with DR, so the complement is
        // in place
        let mut cpu = cpu_with(&[0x92BF]);
        cpu.regs.write(1, 0x00FF);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.read(1), 0xFF00);
        assert_eq!(cpu.regs.cc, CondCode::Negative);
    }

    #[test]
    fn test_st() {
        // ST R1, #+1 -> mem[0x3002]
        let mut cpu = cpu_with(&[0x3201]);
        cpu.regs.write(1, 0xABCD);
        cpu.step().unwrap();

        assert_eq!(cpu.mem.read(0x3002), 0xABCD);
    }

    #[test]
    fn test_sti() {
        // STI R1, #+1: mem[0x3002] points at 0x5000
        let mut cpu = cpu_with(&[0xB201]);
        cpu.mem.write(0x3002, 0x5000);
        cpu.regs.write(1, 0x00AA);
        cpu.step().unwrap();

        assert_eq!(cpu.mem.read(0x5000), 0x00AA);
    }

    #[test]
    fn test_str() {
        // STR R1, R2, #+3
        let mut cpu = cpu_with(&[0x7283]);
        cpu.regs.write(1, 0x0011);
        cpu.regs.write(2, 0x6000);
        cpu.step().unwrap();

        assert_eq!(cpu.mem.read(0x6003), 0x0011);
    }

    #[test]
    fn test_store_does_not_touch_cc() {
        let mut cpu = cpu_with(&[0x3201]);
        cpu.regs.write(1, 0x8000);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.cc, CondCode::Zero);
    }

    #[test]
    fn test_trap_vectors_through_table() {
        // TRAP x25: mem[0x25] holds the routine address
        let mut cpu = cpu_with(&[0xF025]);
        cpu.mem.write(0x0025, 0x0490);
        cpu.step().unwrap();

        assert_eq!(cpu.regs.pc, 0x0490);
        assert_eq!(cpu.regs.read(7), 0x3001);
    }

    #[test]
    fn test_illegal_opcode_faults() {
        // 0x8 (RTI) has no handler
        let mut cpu = cpu_with(&[0x8000]);

        let err = cpu.step().unwrap_err();
        assert_eq!(
            err,
            CpuError::IllegalInstruction {
                addr: 0x3000,
                source: DecodeError::IllegalOpcode(0x8),
            }
        );
        assert!(cpu.is_faulted());

        // A faulted machine refuses further steps
        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Faulted)));
    }

    #[test]
    fn test_reserved_opcode_faults() {
        let mut cpu = cpu_with(&[0xD000]);
        assert!(cpu.step().is_err());
        assert!(cpu.is_faulted());
    }

    #[test]
    fn test_run_limited_budget() {
        // A stream of ADD R0, R0, #1
        let mut cpu = cpu_with(&[0x1021; 10]);

        let executed = cpu.run_limited(7).unwrap();

        assert_eq!(executed, 7);
        assert_eq!(cpu.regs.read(0), 7);
        assert_eq!(cpu.regs.pc, 0x3007);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_run_limited_stops_on_fault() {
        let mut cpu = cpu_with(&[0x1021, 0x1021, 0x8000]);

        let err = cpu.run_limited(100).unwrap_err();

        assert!(matches!(err, CpuError::IllegalInstruction { addr: 0x3002, .. }));
        assert_eq!(cpu.regs.read(0), 2);
    }

    #[test]
    fn test_counting_loop() {
        // R0 = 3; loop: ADD R0, R0, #-1 / BRp loop
        let mut cpu = cpu_with(&[
            0x1023, // ADD R0, R0, #3
            0x103F, // ADD R0, R0, #-1
            0x03FE, // BRp #-2
        ]);

        let executed = cpu.run_limited(10).unwrap();

        assert_eq!(cpu.regs.read(0), 0);
        assert_eq!(cpu.regs.cc, CondCode::Zero);
        // ADD#3, then 3x (ADD#-1, BRp) = 7 steps, rest falls through
        assert!(executed >= 7);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_add_immediate(word in any::<u16>(), r in any::<[u16; 8]>()) {
                // Force opcode ADD, immediate mode
                let word = (word & 0x0FFF) | 0x1000 | (1 << 5);
                let f = Fields::decode(word);

                let mut cpu = cpu_with(&[word]);
                cpu.regs.gpr = r;
                let src = cpu.regs.read(f.sr1);
                cpu.step().unwrap();

                prop_assert_eq!(cpu.regs.read(f.dr), src.wrapping_add(f.imm5));
            }

            #[test]
            fn prop_and_register(word in any::<u16>(), r in any::<[u16; 8]>()) {
                // Force opcode AND, register mode
                let word = ((word & 0x0FFF) | 0x5000) & !(1 << 5);
                let f = Fields::decode(word);

                let mut cpu = cpu_with(&[word]);
                cpu.regs.gpr = r;
                let expected = cpu.regs.read(f.sr1) & cpu.regs.read(f.sr2);
                cpu.step().unwrap();

                prop_assert_eq!(cpu.regs.read(f.dr), expected);
                prop_assert_eq!(cpu.regs.cc, CondCode::from_value(expected));
            }
        }
    }

    #[test]
    fn test_reset() {
        let mut cpu = cpu_with(&[0x8000]);
        let _ = cpu.step();
        assert!(cpu.is_faulted());

        cpu.reset();
        assert!(cpu.is_running());
        assert_eq!(cpu.regs.pc, 0x3000);
        assert_eq!(cpu.mem.read(0x3000), 0);
        assert_eq!(cpu.steps, 0);
        assert_eq!(cpu.last_opcode(), None);
    }
}

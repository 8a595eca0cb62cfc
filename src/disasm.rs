//! Disassembler for LC-3 instruction words.
//!
//! Renders raw words back to mnemonic text for trace output and the
//! `disasm` CLI subcommand. This is a display aid only; execution never
//! goes through it.

use crate::cpu::decode::{Fields, Opcode};

/// Disassemble a single instruction word to text.
///
/// Words whose top 4 bits map to no instruction render as `???`.
pub fn disassemble_word(word: u16) -> String {
    match Opcode::from_word(word) {
        Ok(op) => format_instruction(op, &Fields::decode(word)),
        Err(_) => "???".to_string(),
    }
}

/// Disassemble a run of words starting at `origin`, one line per word.
pub fn disassemble(words: &[u16], origin: u16) -> String {
    let mut output = String::new();

    for (i, &word) in words.iter().enumerate() {
        let addr = origin.wrapping_add(i as u16);
        output.push_str(&format!(
            "{addr:04X}: {word:04X}  {}\n",
            disassemble_word(word)
        ));
    }

    output
}

fn format_instruction(op: Opcode, f: &Fields) -> String {
    match op {
        Opcode::Add | Opcode::And => {
            let rhs = if f.bit5 {
                format_imm(f.imm5)
            } else {
                format!("R{}", f.sr2)
            };
            format!("{} R{}, R{}, {rhs}", op.mnemonic(), f.dr, f.sr1)
        }
        Opcode::Br => {
            let mut mn = String::from("BR");
            if f.branch_mask & 0b100 != 0 {
                mn.push('n');
            }
            if f.branch_mask & 0b010 != 0 {
                mn.push('z');
            }
            if f.branch_mask & 0b001 != 0 {
                mn.push('p');
            }
            format!("{mn} {}", format_imm(f.pc_offset9))
        }
        Opcode::Jmp => {
            // JMP R7 is the conventional subroutine return
            if f.base_r == 7 {
                "RET".to_string()
            } else {
                format!("JMP R{}", f.base_r)
            }
        }
        Opcode::Jsr => {
            if f.bit11 {
                format!("JSR {}", format_imm(f.pc_offset11))
            } else {
                format!("JSRR R{}", f.base_r)
            }
        }
        Opcode::Ld | Opcode::Ldi | Opcode::Lea | Opcode::St | Opcode::Sti => {
            format!("{} R{}, {}", op.mnemonic(), f.dr, format_imm(f.pc_offset9))
        }
        Opcode::Ldr | Opcode::Str => {
            format!(
                "{} R{}, R{}, {}",
                op.mnemonic(),
                f.dr,
                f.base_r,
                format_imm(f.offset6)
            )
        }
        // SR shares bits 9-11 with DR, so NOT names a single register
        Opcode::Not => format!("NOT R{}", f.dr),
        Opcode::Trap => format!("TRAP x{:02X}", f.trapvect8),
    }
}

/// Render a sign-extended field as a signed literal.
fn format_imm(value: u16) -> String {
    format!("#{}", value as i16)
}

//! LC-3 Emulator - CLI Entry Point
//!
//! Commands:
//! - `lc3-emu run <program.obj>` - Load an object file and execute it
//! - `lc3-emu disasm <program.obj>` - Disassemble an object file

use clap::{Parser, Subcommand};
use lc3::{disasm, Cpu, ObjectFile};

#[derive(Parser)]
#[command(name = "lc3-emu")]
#[command(version = "0.1.0")]
#[command(about = "A cycle-by-cycle emulator of the LC-3 educational computer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an object file until the step budget runs out or the CPU faults
    Run {
        /// Path to the object file to execute
        program: String,
        /// Maximum number of instructions to execute (default: 10000)
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
        /// Entry point (hex), overriding the object file's first block
        #[arg(short, long, value_parser = parse_hex_addr)]
        entry: Option<u16>,
        /// Show a disassembly trace of each executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Dump the final register state as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Disassemble an object file to readable text
    Disasm {
        /// Path to the object file
        program: String,
    },
}

/// Parse an LC-3 address written in hex, with or without an `0x`/`x` prefix.
fn parse_hex_addr(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("x"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address '{s}': {e}"))
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            program,
            max_steps,
            entry,
            trace,
            json,
        }) => {
            run_program(&program, max_steps, entry, trace, json);
        }
        Some(Commands::Disasm { program }) => {
            disassemble_file(&program);
        }
        None => {
            println!("LC-3 Emulator v0.1.0");
            println!("A cycle-by-cycle emulator of the LC-3 educational computer");
            println!();
            println!("Use --help for available commands");
        }
    }
}

fn run_program(path: &str, max_steps: u64, entry: Option<u16>, trace: bool, json: bool) {
    println!("🔧 Running: {}", path);

    let obj = match ObjectFile::from_file(path) {
        Ok(obj) => obj,
        Err(e) => {
            eprintln!("❌ Failed to load object file: {}", e);
            std::process::exit(1);
        }
    };

    if obj.is_empty() {
        eprintln!("❌ Object file contains no blocks");
        std::process::exit(1);
    }

    println!(
        "📂 Loaded {} words in {} blocks",
        obj.word_count(),
        obj.blocks.len()
    );

    let mut cpu = Cpu::new();
    cpu.load_object(&obj);
    if let Some(addr) = entry {
        cpu.regs.jump(addr);
    }

    println!();
    println!("━━━ Execution ━━━");

    let mut steps = 0u64;
    while cpu.is_running() && steps < max_steps {
        let pc = cpu.regs.pc;
        let word = cpu.mem.read(pc);

        match cpu.step() {
            Ok(_) => {
                if trace {
                    println!(
                        "{pc:04X}: {word:04X}  {:<20} CC={:?}",
                        disasm::disassemble_word(word),
                        cpu.regs.cc
                    );
                }
                steps += 1;
            }
            Err(e) => {
                eprintln!("❌ CPU fault: {}", e);
                break;
            }
        }
    }

    println!();
    println!("━━━ Result ━━━");
    println!("Steps: {}", cpu.steps);
    println!("State: {:?}", cpu.state);
    println!("PC:    0x{:04X}", cpu.regs.pc);
    println!("CC:    {:?}", cpu.regs.cc);
    for (i, value) in cpu.regs.gpr.iter().enumerate() {
        println!("R{i}:    0x{value:04X} ({})", *value as i16);
    }

    if json {
        match serde_json::to_string_pretty(&cpu.regs) {
            Ok(snapshot) => println!("{snapshot}"),
            Err(e) => {
                eprintln!("❌ Failed to serialize registers: {}", e);
                std::process::exit(1);
            }
        }
    }

    if steps >= max_steps {
        println!();
        println!(
            "⚠️  Reached max steps limit ({}). Use --max-steps to increase.",
            max_steps
        );
    }
}

fn disassemble_file(path: &str) {
    println!("📖 Disassembling: {}", path);
    println!();

    let obj = match ObjectFile::from_file(path) {
        Ok(obj) => obj,
        Err(e) => {
            eprintln!("❌ Failed to load object file: {}", e);
            std::process::exit(1);
        }
    };

    for block in &obj.blocks {
        println!(".ORIG x{:04X}", block.origin);
        print!("{}", disasm::disassemble(&block.words, block.origin));
        println!();
    }
}

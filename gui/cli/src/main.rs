// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later

//! A thin binary consumer of `armemu_system`: loads a ROM image, steps or
//! runs it, and prints the register and cycle state a library user would
//! otherwise have to poll through the facade by hand.

mod hexdump;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use armemu_map::{DEFAULT_RAM_BASE, DEFAULT_RAM_SIZE};
use armemu_system::System;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "armemu", version, about = "26-bit ARM processor emulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Base address of the emulated RAM window.
    #[arg(long, global = true, default_value_t = DEFAULT_RAM_BASE, value_parser = parse_u32)]
    ram_base: u32,

    /// Size in bytes of the emulated RAM window.
    #[arg(long, global = true, default_value_t = DEFAULT_RAM_SIZE, value_parser = parse_u32)]
    ram_size: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Runs a ROM image until a debug trap or the step limit is reached.
    Run {
        /// Path to the raw ROM image.
        rom: PathBuf,

        /// Maximum number of pipeline iterations before giving up.
        #[arg(long, default_value_t = 1_000_000)]
        max_steps: u64,

        /// Prints the register file after execution stops.
        #[arg(long)]
        dump_registers: bool,
    },
    /// Steps a ROM image one instruction at a time, printing state after each.
    Step {
        /// Path to the raw ROM image.
        rom: PathBuf,

        /// Number of pipeline iterations to execute.
        #[arg(long, default_value_t = 1)]
        count: u64,
    },
    /// Prints a hex dump of a range of guest memory after loading a ROM.
    Hexdump {
        /// Path to the raw ROM image.
        rom: PathBuf,

        /// First guest address to dump.
        #[arg(value_parser = parse_u32)]
        addr: u32,

        /// Number of bytes to dump.
        #[arg(default_value_t = 256)]
        len: usize,
    },
}

fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    s.strip_prefix("0x").map_or_else(|| s.parse(), |hex| u32::from_str_radix(hex, 16))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("armemu: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(cli: &Cli) -> Result<(), String> {
    match &cli.command {
        Command::Run { rom, max_steps, dump_registers } => {
            let mut system = boot(cli, rom)?;
            let mut steps = 0u64;
            let mut cycles = 0u64;
            while steps < *max_steps {
                let step_cycles = system.step();
                if step_cycles == 0 {
                    break;
                }
                cycles += step_cycles;
                steps += 1;
            }
            println!("stopped after {steps} steps, {cycles} cycles");
            if *dump_registers {
                print_registers(&system);
            }
            Ok(())
        }
        Command::Step { rom, count } => {
            let mut system = boot(cli, rom)?;
            for i in 0..*count {
                let cycles = system.step();
                println!("step {i}: {cycles} cycles");
            }
            print_registers(&system);
            Ok(())
        }
        Command::Hexdump { rom, addr, len } => {
            let system = boot(cli, rom)?;
            let mut buf = vec![0u8; *len];
            let read = system.read_guest(*addr, &mut buf);
            println!("guest memory at {addr:#010x} ({read} of {len} bytes mapped):");
            print!("{}", hexdump::to_string(&buf[..read]));
            Ok(())
        }
    }
}

fn boot(cli: &Cli, rom: &Path) -> Result<System, String> {
    let bytes = fs::read(rom).map_err(|err| format!("reading {}: {err}", rom.display()))?;
    let mut system = System::with_ram(cli.ram_base, cli.ram_size);
    system.load_rom(&bytes).map_err(|err| err.to_string())?;
    system.reset();
    Ok(system)
}

fn print_registers(system: &System) {
    for id in 0..16 {
        let value = system.get_register(id).unwrap_or(0);
        print!("R{id:<2} = {value:#010x}  ");
        if id % 4 == 3 {
            println!();
        }
    }
    println!("mode = {:?}", system.get_mode());
}

use std::{fs, io, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simplelog::LevelFilter;

use ls8::{
    asm::disasm::{disassemble, to_ls8},
    emu::{
        driver::{Driver, DriverConfig},
        emulator::{EmuState, Emulator},
        ram::Ram,
    },
    loader::load_file,
};

/// LS-8 emulator and toolchain.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<LevelFilter>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run an `.ls8` or `.asm` program.
    Run {
        file: PathBuf,
        /// Instructions per second. Runs unpaced if not given.
        #[arg(long)]
        hz: Option<f64>,
        /// Raise interrupt 0 once a second.
        #[arg(long)]
        timer: bool,
        /// Start in the debugger.
        #[arg(long)]
        debug: bool,
    },
    /// Assemble a program into `.ls8` text.
    Asm {
        file: PathBuf,
        /// Write here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the disassembly of a program.
    Disasm { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    simplelog::TermLogger::init(
        cli.log_level.unwrap_or({
            #[cfg(debug_assertions)]
            let level = LevelFilter::Trace;
            #[cfg(not(debug_assertions))]
            let level = LevelFilter::Info;
            level
        }),
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    match cli.command {
        Command::Run {
            file,
            hz,
            timer,
            debug,
        } => {
            let program = load_file(&file)?;
            let mut emu = Emulator::new(Ram::new(), io::stdout())?;
            emu.load_program(&program)?;
            if debug {
                emu.state = EmuState::Pause;
            }
            let config = DriverConfig {
                clock_rate_hz: hz,
                timer,
            };
            Driver::new(emu, config)?.run_until_halt()?;
        }
        Command::Asm { file, output } => {
            let text = to_ls8(&load_file(&file)?);
            match output {
                Some(path) => fs::write(&path, text)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => print!("{}", text),
            }
        }
        Command::Disasm { file } => {
            for line in disassemble(&load_file(&file)?) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

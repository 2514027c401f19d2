use std::{cell::RefCell, io::Write};

use anyhow::{Context, Result};
use easy_repl::{command, repl::LoopStatus, CommandStatus, Repl};

use crate::plat::Register;

use super::{
    driver::Driver,
    emulator::{EmuState, StepResult},
    ram::Memory,
};

/// Parses a byte given in decimal, or in hex with a `0x` prefix.
pub fn parse_byte(text: &str) -> Result<u8> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse::<u8>(),
    }
    .with_context(|| format!("not a byte value: {text}"))
}

pub struct Debugger<'b, M: Memory, W: Write> {
    pub driver: RefCell<&'b mut Driver<M, W>>,
}

impl<'b, M: Memory, W: Write> Debugger<'b, M, W> {
    pub fn new(driver: &'b mut Driver<M, W>) -> Self {
        Self {
            driver: RefCell::new(driver),
        }
    }

    /// Steps once through the driver, so the clock and timer keep running while single-stepping.
    pub fn step(&self) -> Result<StepResult> {
        self.driver.borrow_mut().tick()
    }

    pub fn repl(&self) -> Result<()> {
        let mut repl = Repl::builder()
            .description("LS-8 Debug REPL")
            .add(
                "c",
                command! {
                    "Continue execution",
                    () => || {
                        self.driver.borrow_mut().emu.state = EmuState::Continue;
                        Ok(CommandStatus::Quit)
                    }
                },
            )
            .add(
                "s",
                command! {
                    "Step one instruction",
                    () => || {
                        if self.step()? == StepResult::Halted {
                            eprintln!("halted");
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "bt",
                command! {
                    "Print last X instructions executed",
                    (x:usize) => |x| {
                        let driver = self.driver.borrow();
                        let history = &driver.emu.instr_history;
                        for (pc, instr) in history.iter().skip(history.len().saturating_sub(x)) {
                            eprintln!("[pc={:02X}] {}", pc, instr);
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "pr",
                command! {
                    "Print the value of all registers",
                    () => || {
                        let driver = self.driver.borrow();
                        let emu = &driver.emu;
                        for reg in Register::ALL {
                            eprintln!("{}={:02X}", reg, emu.registers.get(reg));
                        }
                        eprintln!("PC={:02X}", emu.pc());
                        eprintln!("IR={:02X}", emu.ir());
                        eprintln!("FL={:?}", emu.fl());
                        eprintln!("IS={:08b}", emu.registers.is);
                        eprintln!("interrupts={:?}", emu.interrupts);
                        if let Some(fault) = &emu.fault {
                            eprintln!("fault: {}", fault);
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "peek",
                command! {
                    "Peek a value from memory",
                    (addr:String) => |addr: String| {
                        let addr = parse_byte(&addr)?;
                        let val = self.driver.borrow().emu.read(addr);
                        eprintln!("{:02X}={:02X}", addr, val);
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "poke",
                command! {
                    "Write a value to memory",
                    (addr:String, value:String) => |addr: String, value: String| {
                        let addr = parse_byte(&addr)?;
                        let value = parse_byte(&value)?;
                        self.driver.borrow_mut().emu.load_byte(addr, value);
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "b",
                command! {
                    "Toggle a breakpoint at an address",
                    (addr:String) => |addr: String| {
                        let addr = parse_byte(&addr)?;
                        if self.driver.borrow_mut().toggle_breakpoint(addr) {
                            eprintln!("breakpoint set at {:02X}", addr);
                        } else {
                            eprintln!("breakpoint cleared at {:02X}", addr);
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "halt",
                command! {
                    "Halt execution",
                    () => || {
                        self.driver.borrow_mut().emu.state = EmuState::Halt;
                        Ok(CommandStatus::Quit)
                    }
                },
            )
            .build()?;
        eprintln!("LS-8 Debug REPL");
        'repl: loop {
            eprintln!();
            {
                let driver = self.driver.borrow();
                if let Some((pc, instr)) = driver.emu.instr_history.back() {
                    eprintln!("Last instruction:\n[pc={:02X}] --> {}", pc, instr);
                }
                eprintln!("Next pc={:02X}", driver.emu.pc());
            }

            let status = repl.next()?;
            if let LoopStatus::Break = status {
                break 'repl;
            }
            {
                let driver = self.driver.borrow();
                if let EmuState::Halt = driver.emu.state {
                    break 'repl;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emu::{
            driver::{DriverConfig, TIMER_LINE},
            emulator::Emulator,
            ram::Ram,
            VECTOR_TABLE,
        },
        plat::Opcode,
    };

    #[test]
    fn test_step_raises_due_timer() {
        let mut emu = Emulator::new(Ram::new(), Vec::new()).unwrap();
        emu.load_program(&[Opcode::Nop as u8, Opcode::Hlt as u8])
            .unwrap();
        emu.load_byte(VECTOR_TABLE + TIMER_LINE, 0x80);
        emu.registers.set(Register::IM, 1 << TIMER_LINE);
        let config = DriverConfig {
            clock_rate_hz: None,
            timer: true,
        };
        let mut driver = Driver::new(emu, config).unwrap();
        driver.expire_timer();

        let debugger = Debugger::new(&mut driver);
        assert_eq!(debugger.step().unwrap(), StepResult::Continue);
        assert_eq!(debugger.driver.borrow().emu.pc(), 0x80);
    }

    #[test]
    fn test_parse_byte() {
        assert_eq!(parse_byte("42").unwrap(), 42);
        assert_eq!(parse_byte("0xF8").unwrap(), 0xF8);
        assert_eq!(parse_byte(" 0Xff ").unwrap(), 0xFF);
        assert!(parse_byte("256").is_err());
        assert!(parse_byte("zz").is_err());
    }
}

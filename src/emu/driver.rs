//! The host side of the emulator: clock pacing, the periodic timer interrupt, breakpoints.
//!
//! [Emulator] itself never waits or keeps time; everything here just decides when to call
//! [`Emulator::step`].

use std::{io::Write, time::Duration};

use anyhow::{bail, Result};
use rustc_hash::FxHashSet;
use tokio::{
    runtime::{Builder, Runtime},
    time::{interval, Instant, Interval, MissedTickBehavior},
};

use super::{
    debugger::Debugger,
    emulator::{EmuState, Emulator, StepResult},
    ram::Memory,
};

/// Interrupt line raised by the timer.
pub const TIMER_LINE: u8 = 0;
/// How often the timer fires.
pub const TIMER_PERIOD: Duration = Duration::from_secs(1);

/// Host-side settings for a [Driver].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriverConfig {
    /// Instructions per second. `None` runs unpaced.
    pub clock_rate_hz: Option<f64>,
    /// Raise [TIMER_LINE] every [TIMER_PERIOD].
    pub timer: bool,
}

/// Repeatedly steps an [Emulator] until it halts.
pub struct Driver<M: Memory, W: Write> {
    pub emu: Emulator<M, W>,
    pub breakpoints: FxHashSet<u8>,
    clock: Option<Interval>,
    timer: Option<Instant>,
    resumed_at: Option<u8>,
    rt: Runtime,
}

impl<M: Memory, W: Write> Driver<M, W> {
    /// Wraps an [Emulator] with the given host settings.
    ///
    /// # Errors
    ///
    /// This function will return an error if the clock rate is not a positive number, or if the
    /// Tokio runtime fails to initialize.
    pub fn new(emu: Emulator<M, W>, config: DriverConfig) -> Result<Self> {
        let rt = Builder::new_current_thread().enable_time().build()?;
        let clock = match config.clock_rate_hz {
            Some(hz) => {
                let period = Duration::try_from_secs_f64(hz.recip())
                    .ok()
                    .filter(|period| hz > 0.0 && !period.is_zero());
                let Some(period) = period else {
                    bail!("clock rate must be a positive number of hertz, got {}", hz);
                };
                let mut clock = rt.block_on(async { interval(period) });
                clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Some(clock)
            }
            None => None,
        };
        Ok(Self {
            emu,
            breakpoints: FxHashSet::default(),
            clock,
            timer: config.timer.then(Instant::now),
            resumed_at: None,
            rt,
        })
    }

    /// Waits for the next clock edge, fires the timer if it's due, then steps once.
    pub fn tick(&mut self) -> Result<StepResult> {
        if let Some(clock) = &mut self.clock {
            self.rt.block_on(clock.tick());
        }
        if let Some(last) = self.timer {
            if last.elapsed() >= TIMER_PERIOD {
                self.timer = Some(Instant::now());
                self.emu.raise_interrupt(TIMER_LINE)?;
            }
        }
        self.emu.step()
    }

    /// Runs the emulator, stepping through instructions until it reaches a halt state.
    ///
    /// Reaching a breakpoint, or a [`Pause`](EmuState::Pause) state, opens the debugger.
    pub fn run_until_halt(&mut self) -> Result<()> {
        loop {
            match self.emu.state {
                EmuState::Continue => {}
                EmuState::Halt => break,
                EmuState::Pause => {
                    self.debug()?;
                    if self.emu.state == EmuState::Pause {
                        self.emu.state = EmuState::Continue;
                    }
                    continue;
                }
            }
            let pc = self.emu.pc();
            if self.breakpoints.contains(&pc) && self.resumed_at != Some(pc) {
                log::info!("breakpoint at pc={:#04x}", pc);
                self.resumed_at = Some(pc);
                self.emu.state = EmuState::Pause;
                continue;
            }
            self.resumed_at = None;
            self.tick()?;
        }
        Ok(())
    }

    /// Adds a breakpoint at `addr`, or removes it if one is already there. Returns whether it's now set.
    pub fn toggle_breakpoint(&mut self, addr: u8) -> bool {
        if self.breakpoints.remove(&addr) {
            false
        } else {
            self.breakpoints.insert(addr);
            true
        }
    }

    #[cfg(test)]
    pub(crate) fn expire_timer(&mut self) {
        if self.timer.is_some() {
            self.timer = Some(Instant::now() - TIMER_PERIOD);
        }
    }

    pub fn debug(&mut self) -> Result<()> {
        Debugger::new(self).repl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emu::{ram::Ram, VECTOR_TABLE},
        plat::{Opcode, Register},
    };

    fn driver_with(program: &[u8], config: DriverConfig) -> Driver<Ram, Vec<u8>> {
        let mut emu = Emulator::new(Ram::new(), Vec::new()).unwrap();
        emu.load_program(program).unwrap();
        Driver::new(emu, config).unwrap()
    }

    #[test]
    fn test_run_until_halt() {
        let mut driver = driver_with(
            &[Opcode::Ldi as u8, 0, 7, Opcode::Prn as u8, 0, Opcode::Hlt as u8],
            DriverConfig::default(),
        );
        driver.run_until_halt().unwrap();
        assert!(driver.emu.is_halted());
        assert_eq!(driver.emu.output(), b"7\n");
    }

    #[test]
    fn test_paced_clock() {
        let mut driver = driver_with(
            &[Opcode::Nop as u8, Opcode::Nop as u8, Opcode::Hlt as u8],
            DriverConfig {
                clock_rate_hz: Some(1000.0),
                timer: false,
            },
        );
        driver.run_until_halt().unwrap();
        assert_eq!(driver.emu.pc(), 3);
    }

    #[test]
    fn test_bad_clock_rate() {
        let emu = Emulator::new(Ram::new(), Vec::new()).unwrap();
        let config = DriverConfig {
            clock_rate_hz: Some(0.0),
            timer: false,
        };
        assert!(Driver::new(emu, config).is_err());
    }

    #[test]
    fn test_fatal_error_stops_run() {
        let mut driver = driver_with(&[0xFF], DriverConfig::default());
        assert!(driver.run_until_halt().is_err());
        assert!(driver.emu.is_halted());
    }

    #[test]
    fn test_timer_raises_line_zero() {
        let mut driver = driver_with(
            &[Opcode::Nop as u8],
            DriverConfig {
                clock_rate_hz: None,
                timer: true,
            },
        );
        driver.emu.load_byte(VECTOR_TABLE + TIMER_LINE, 0x80);
        driver.emu.load_byte(0x80, Opcode::Hlt as u8);
        driver.emu.registers.set(Register::IM, 1 << TIMER_LINE);
        driver.expire_timer();
        driver.tick().unwrap();
        assert_eq!(driver.emu.pc(), 0x80);
    }

    #[test]
    fn test_toggle_breakpoint() {
        let mut driver = driver_with(&[], DriverConfig::default());
        assert!(driver.toggle_breakpoint(4));
        assert!(driver.breakpoints.contains(&4));
        assert!(!driver.toggle_breakpoint(4));
        assert!(driver.breakpoints.is_empty());
    }
}

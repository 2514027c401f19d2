//! Interrupt servicing.
//!
//! At the start of each step the emulator checks `IS & IM`. If interrupts are armed and a
//! line is pending, that step is spent entering the handler: the line's IS bit is cleared,
//! PC, FL and R0-R6 are pushed, and PC is loaded from the vector table. `IRET` undoes this.

use std::io::Write;

use crate::plat::Register;

use super::{
    emulator::Emulator, ram::Memory, registers::Fl, EmuError, INTERRUPT_LINES, VECTOR_TABLE,
};

/// Global interrupt enable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptState {
    /// Pending, unmasked interrupts will be serviced.
    Armed,
    /// A handler is running. Nothing is serviced until `IRET`.
    Masked,
}

/// Registers saved on interrupt entry, in push order.
const SAVED_REGISTERS: [Register; 7] = [
    Register::R0,
    Register::R1,
    Register::R2,
    Register::R3,
    Register::R4,
    Register::R5,
    Register::R6,
];

impl<M: Memory, W: Write> Emulator<M, W> {
    /// Marks interrupt `line` as pending, as a device wired to that line would.
    pub fn raise_interrupt(&mut self, line: u8) -> Result<(), EmuError> {
        if line >= INTERRUPT_LINES {
            return Err(EmuError::InvalidInterrupt(line));
        }
        self.registers.is |= 1 << line;
        Ok(())
    }

    /// The line that would be serviced at the start of the next step, if any.
    ///
    /// Lower lines take priority.
    pub fn pending_interrupt(&self) -> Option<u8> {
        if self.interrupts == InterruptState::Masked {
            return None;
        }
        let pending = self.registers.is & self.registers.im();
        (pending != 0).then(|| pending.trailing_zeros() as u8)
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts == InterruptState::Armed
    }

    /// Enters the handler of the highest priority pending interrupt. Returns whether one was taken.
    pub(super) fn service_interrupt(&mut self) -> bool {
        let Some(line) = self.pending_interrupt() else {
            return false;
        };
        self.interrupts = InterruptState::Masked;
        self.registers.is &= !(1 << line);

        self.push(self.registers.pc);
        self.push(self.registers.fl.bits());
        for reg in SAVED_REGISTERS {
            self.push(self.registers.get(reg));
        }

        let vector = self.read(VECTOR_TABLE + line);
        log::debug!(
            "interrupt {} taken at pc={:#04x}, vectoring to {:#04x}",
            line,
            self.registers.pc,
            vector
        );
        self.registers.pc = vector;
        true
    }

    /// Restores the context saved by [`service_interrupt`](Self::service_interrupt) and re-arms
    /// interrupts. Returns the interrupted PC.
    pub(super) fn return_from_interrupt(&mut self) -> u8 {
        for reg in SAVED_REGISTERS.into_iter().rev() {
            let value = self.pop();
            self.registers.set(reg, value);
        }
        self.registers.fl = Fl::from_bits_truncate(self.pop());
        let pc = self.pop();
        self.interrupts = InterruptState::Armed;
        log::debug!("returning from interrupt to pc={:#04x}", pc);
        pc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emu::{
            emulator::tests::{emu_with, run},
            emulator::StepResult,
            STACK_TOP,
        },
        plat::Opcode,
    };

    const LDI: u8 = Opcode::Ldi as u8;
    const HANDLER: u8 = 0x40;

    #[test]
    #[rustfmt::skip]
    fn test_software_interrupt_round_trip() {
        let mut emu = emu_with(&[
            LDI, 5, 0b0000_0001,       // 0: IM <- line 0
            LDI, 0, 0,                 // 3
            LDI, 1, 4,                 // 6
            Opcode::Cmp as u8, 0, 1,   // 9: FL <- LT
            Opcode::Int as u8, 0,      // 12
            Opcode::Hlt as u8,         // 14
        ]);
        emu.load_byte(VECTOR_TABLE, HANDLER);
        emu.load_byte(HANDLER, Opcode::Iret as u8);

        for _ in 0..5 {
            emu.step().unwrap();
        }
        assert_eq!(emu.registers.is, 0b0000_0001);
        assert_eq!(emu.pc(), 14);

        assert_eq!(emu.step().unwrap(), StepResult::Continue);
        assert_eq!(emu.interrupts, InterruptState::Masked);
        assert_eq!(emu.pc(), HANDLER);
        assert_eq!(emu.registers.is, 0);
        assert_eq!(emu.registers.sp(), STACK_TOP - 9);
        assert_eq!(emu.read(STACK_TOP - 1), 14);
        assert_eq!(emu.read(STACK_TOP - 2), Fl::LT.bits());
        assert_eq!(emu.read(STACK_TOP - 3), 0);
        assert_eq!(emu.read(STACK_TOP - 4), 4);
        assert_eq!(emu.read(STACK_TOP - 8), 0b0000_0001);

        emu.step().unwrap();
        assert_eq!(emu.interrupts, InterruptState::Armed);
        assert_eq!(emu.pc(), 14);
        assert_eq!(emu.registers.sp(), STACK_TOP);

        assert_eq!(emu.step().unwrap(), StepResult::Halted);
    }

    #[test]
    #[rustfmt::skip]
    fn test_handler_context_is_restored() {
        let mut emu = emu_with(&[
            LDI, 0, 11,
            LDI, 1, 11,
            Opcode::Cmp as u8, 0, 1,
            Opcode::Nop as u8,
            Opcode::Hlt as u8,
        ]);
        emu.load_byte(VECTOR_TABLE + 2, HANDLER);
        for (i, byte) in [
            LDI, 0, 200,
            LDI, 1, 100,
            Opcode::Cmp as u8, 0, 1,
            Opcode::Iret as u8,
        ]
        .into_iter()
        .enumerate()
        {
            emu.load_byte(HANDLER + i as u8, byte);
        }

        for _ in 0..3 {
            emu.step().unwrap();
        }
        emu.registers.set_im(0b0000_0100);
        emu.raise_interrupt(2).unwrap();
        emu.step().unwrap();
        assert_eq!(emu.pc(), HANDLER);
        for _ in 0..3 {
            emu.step().unwrap();
        }
        assert_eq!(emu.fl(), Fl::GT);
        emu.step().unwrap();
        assert_eq!(emu.pc(), 9);
        assert_eq!(emu.fl(), Fl::EQ);
        assert_eq!(emu.registers.get(Register::R0), 11);
        assert_eq!(emu.registers.get(Register::R1), 11);
        run(&mut emu);
    }

    #[test]
    fn test_masked_line_is_not_serviced() {
        let mut emu = emu_with(&[Opcode::Nop as u8, Opcode::Hlt as u8]);
        emu.raise_interrupt(0).unwrap();
        emu.step().unwrap();
        assert_eq!(emu.pc(), 1);
        assert_eq!(emu.registers.is, 1);
        assert_eq!(emu.pending_interrupt(), None);
    }

    #[test]
    fn test_one_interrupt_per_step_lowest_first() {
        let mut emu = emu_with(&[Opcode::Nop as u8]);
        emu.load_byte(VECTOR_TABLE + 1, 0x50);
        emu.load_byte(VECTOR_TABLE + 3, 0x60);
        emu.registers.set_im(0xFF);
        emu.raise_interrupt(3).unwrap();
        emu.raise_interrupt(1).unwrap();
        assert_eq!(emu.pending_interrupt(), Some(1));

        emu.step().unwrap();
        assert_eq!(emu.pc(), 0x50);
        assert_eq!(emu.registers.is, 1 << 3);
        assert!(!emu.interrupts_enabled());
        assert_eq!(emu.pending_interrupt(), None);

        // A second pending line waits for the handler to return.
        emu.load_byte(0x50, Opcode::Iret as u8);
        emu.step().unwrap();
        assert_eq!(emu.pc(), 0);
        emu.step().unwrap();
        assert_eq!(emu.pc(), 0x60);
        assert_eq!(emu.registers.is, 0);
    }

    #[test]
    fn test_int_uses_low_three_bits() {
        let mut emu = emu_with(&[LDI, 2, 10, Opcode::Int as u8, 2, Opcode::Hlt as u8]);
        run(&mut emu);
        assert_eq!(emu.registers.is, 1 << 2);
    }

    #[test]
    fn test_invalid_line() {
        let mut emu = emu_with(&[]);
        assert_eq!(emu.raise_interrupt(8), Err(EmuError::InvalidInterrupt(8)));
        assert_eq!(emu.registers.is, 0);
    }
}

use crate::plat::Register;

use super::{EmuError, STACK_TOP};

bitflags::bitflags! {
    /// The CPU flags register. Only written by comparisons.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Fl: u8 {
        /// Set if the operands of the last comparison were equal.
        const EQ = 1 << 0;
        /// Set if the left operand of the last comparison was greater.
        const GT = 1 << 1;
        /// Set if the left operand of the last comparison was less.
        const LT = 1 << 2;
    }
}

impl Fl {
    /// The flags an unsigned comparison of `a` against `b` produces.
    pub fn compare(a: u8, b: u8) -> Self {
        let mut fl = Self::empty();
        fl.set(Self::EQ, a == b);
        fl.set(Self::GT, a > b);
        fl.set(Self::LT, a < b);
        fl
    }
}

/// The full set of registers in the emulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmuRegisters {
    gp: [u8; 8],
    /// Program counter
    pub pc: u8,
    /// Instruction register, holding the opcode being executed
    pub ir: u8,
    pub fl: Fl,
    /// Interrupt status: one pending bit per line
    pub is: u8,
}

impl EmuRegisters {
    pub fn new() -> Self {
        let mut gp = [0u8; 8];
        gp[Register::SP.index()] = STACK_TOP;
        Self {
            gp,
            pc: 0,
            ir: 0,
            fl: Fl::empty(),
            is: 0,
        }
    }

    /// Puts every register back into its power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn get(&self, reg: Register) -> u8 {
        self.gp[reg.index()]
    }

    pub fn set(&mut self, reg: Register, value: u8) {
        self.gp[reg.index()] = value;
    }

    /// Reads a general purpose register by raw index.
    pub fn read(&self, index: u8) -> Result<u8, EmuError> {
        Register::try_from(index)
            .map(|reg| self.get(reg))
            .map_err(|_| EmuError::InvalidRegister(index))
    }

    /// Writes a general purpose register by raw index.
    pub fn write(&mut self, index: u8, value: u8) -> Result<(), EmuError> {
        let reg = Register::try_from(index).map_err(|_| EmuError::InvalidRegister(index))?;
        self.set(reg, value);
        Ok(())
    }

    pub fn sp(&self) -> u8 {
        self.get(Register::SP)
    }

    pub fn set_sp(&mut self, value: u8) {
        self.set(Register::SP, value);
    }

    /// Interrupt mask
    pub fn im(&self) -> u8 {
        self.get(Register::IM)
    }

    pub fn set_im(&mut self, value: u8) {
        self.set(Register::IM, value);
    }

    pub fn gp(&self) -> &[u8; 8] {
        &self.gp
    }
}

impl Default for EmuRegisters {
    fn default() -> Self {
        Self::new()
    }
}

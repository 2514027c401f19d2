//! The emulator/debugger module for the LS-8.

use thiserror::Error;

use crate::plat::PlatformError;

use self::alu::AluOp;

pub mod alu;
pub mod debugger;
pub mod driver;
pub mod emulator;
pub mod interrupts;
pub mod ram;
pub mod registers;

/// Number of addressable bytes. Every address the CPU produces is a single byte.
pub const ADDRESS_SPACE: usize = 0x100;
/// Initial value of [SP](crate::plat::Register::SP) after reset.
pub const STACK_TOP: u8 = 0xF4;
/// Start of the interrupt vector table. Slot `i` lives at `VECTOR_TABLE + i`.
pub const VECTOR_TABLE: u8 = 0xF8;
/// Number of interrupt lines, and of vector table slots.
pub const INTERRUPT_LINES: u8 = 8;

/// A fatal machine error. Any of these halts the emulator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmuError {
    #[error("invalid register: {0}")]
    InvalidRegister(u8),
    #[error("unknown instruction {opcode:#010b} at pc={pc:#04x}")]
    UnknownInstruction { opcode: u8, pc: u8 },
    #[error("division by zero in {0:?}")]
    DivisionByZero(AluOp),
    #[error("memory size {} is smaller than the {} byte address space", .size, ADDRESS_SPACE)]
    AddressOutOfRange { size: usize },
    #[error("invalid interrupt line: {0}")]
    InvalidInterrupt(u8),
    #[error("program of {0} bytes does not fit in memory")]
    ProgramTooLarge(usize),
}

impl EmuError {
    /// Converts an instruction decoding failure at `pc` into the matching machine error.
    pub fn from_decode(err: PlatformError, pc: u8) -> Self {
        match err {
            PlatformError::InvalidRegister(index) => Self::InvalidRegister(index),
            PlatformError::InvalidOpcode(opcode) => Self::UnknownInstruction { opcode, pc },
            PlatformError::InvalidInstruction(op) => Self::UnknownInstruction {
                opcode: op as u8,
                pc,
            },
        }
    }
}

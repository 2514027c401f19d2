//! Common platform code between the LS-8's other modules.

use std::fmt;

use thiserror::Error;

/// An error for the core platform of the LS-8.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    #[error("invalid opcode {0:#010b}")]
    InvalidOpcode(u8),
    #[error("invalid register index {0}")]
    InvalidRegister(u8),
    #[error("invalid operands for {0}")]
    InvalidInstruction(Opcode),
}

/// Type alias for Result<T, [PlatformError]>.
pub type PResult<T> = Result<T, PlatformError>;

/// The eight general purpose registers of the LS-8.
///
/// `R5` doubles as the interrupt mask ([IM][Register::IM]) and `R7` as the stack pointer ([SP][Register::SP]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Register {
    /// Interrupt mask
    pub const IM: Self = Self::R5;
    /// Stack pointer
    pub const SP: Self = Self::R7;

    pub const ALL: [Self; 8] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
    ];

    /// The register's index into the register file.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Register {
    type Error = PlatformError;

    fn try_from(value: u8) -> Result<Self, PlatformError> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(PlatformError::InvalidRegister(value))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", *self as u8)
    }
}

/// Returns how many operand bytes follow the given opcode byte.
///
/// This is encoded in the two high bits of every LS-8 opcode.
pub fn operand_count(opcode: u8) -> u8 {
    (opcode >> 6) & 0b11
}

/// The LS-8 opcodes, with their machine encodings.
///
/// Operand conventions, where `regA`/`regB` are register indices:
///
/// - ALU opcodes ([ADD][Opcode::Add] through [AND][Opcode::And]) compute `regA <- regA op regB`. [CMP][Opcode::Cmp] only sets `FL`.
/// - Jumps read their destination from `regA`. Conditional jumps fall through to the next instruction when not taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /* Control */
    /// Does nothing.
    Nop = 0b0000_0000,
    /// Halts the machine.
    Hlt = 0b0000_0001,
    /// Pops the return address off the stack and jumps to it.
    Ret = 0b0000_1001,
    /// Restores the context saved by an interrupt and returns from the handler.
    Iret = 0b0000_1011,

    /* I/O */
    /// Prints `regA` as a character.
    Pra = 0b0100_0010,
    /// Prints `regA` as a decimal number.
    Prn = 0b0100_0011,

    /* Stack and branching */
    /// Pushes the address of the next instruction and jumps to `regA`.
    Call = 0b0100_1000,
    /// Raises the interrupt line numbered by `regA`.
    Int = 0b0100_1010,
    /// `regA <- pop()`
    Pop = 0b0100_1100,
    /// `push(regA)`
    Push = 0b0100_1101,
    /// `PC <- regA`
    Jmp = 0b0101_0000,
    /// `PC <- regA` if `FL.EQ`
    Jeq = 0b0101_0001,
    /// `PC <- regA` if not `FL.EQ`
    Jne = 0b0101_0010,
    /// `PC <- regA` if `FL.LT`
    Jlt = 0b0101_0011,
    /// `PC <- regA` if `FL.GT`
    Jgt = 0b0101_0100,

    /* Unary ALU */
    /// `regA <- !regA`
    Not = 0b0111_0000,
    /// `regA <- regA + 1`
    Inc = 0b0111_1000,
    /// `regA <- regA - 1`
    Dec = 0b0111_1001,

    /* Memory */
    /// `regA <- mem[regB]`
    Ld = 0b1001_1000,
    /// `regA <- (immediate value)`
    Ldi = 0b1001_1001,
    /// `mem[regA] <- regB`
    St = 0b1001_1010,

    /* Binary ALU */
    Cmp = 0b1010_0000,
    Add = 0b1010_1000,
    Sub = 0b1010_1001,
    Mul = 0b1010_1010,
    Div = 0b1010_1011,
    Mod = 0b1010_1100,
    Or = 0b1011_0001,
    Xor = 0b1011_0010,
    And = 0b1011_0011,
}

impl Opcode {
    pub const ALL: [Self; 30] = [
        Self::Nop,
        Self::Hlt,
        Self::Ret,
        Self::Iret,
        Self::Pra,
        Self::Prn,
        Self::Call,
        Self::Int,
        Self::Pop,
        Self::Push,
        Self::Jmp,
        Self::Jeq,
        Self::Jne,
        Self::Jlt,
        Self::Jgt,
        Self::Not,
        Self::Inc,
        Self::Dec,
        Self::Ld,
        Self::Ldi,
        Self::St,
        Self::Cmp,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Mod,
        Self::Or,
        Self::Xor,
        Self::And,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Hlt => "HLT",
            Self::Ret => "RET",
            Self::Iret => "IRET",
            Self::Pra => "PRA",
            Self::Prn => "PRN",
            Self::Call => "CALL",
            Self::Int => "INT",
            Self::Pop => "POP",
            Self::Push => "PUSH",
            Self::Jmp => "JMP",
            Self::Jeq => "JEQ",
            Self::Jne => "JNE",
            Self::Jlt => "JLT",
            Self::Jgt => "JGT",
            Self::Not => "NOT",
            Self::Inc => "INC",
            Self::Dec => "DEC",
            Self::Ld => "LD",
            Self::Ldi => "LDI",
            Self::St => "ST",
            Self::Cmp => "CMP",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::And => "AND",
        }
    }

    /// Looks up an opcode by its (case-insensitive) assembly mnemonic.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(name))
    }

    /// The operand layout this opcode is encoded with.
    pub fn format_kind(self) -> FormatKind {
        match self {
            Self::Nop | Self::Hlt | Self::Ret | Self::Iret => FormatKind::OpOnly,
            Self::Ldi => FormatKind::RI,
            op => match operand_count(op as u8) {
                1 => FormatKind::R,
                _ => FormatKind::RR,
            },
        }
    }

    /// Size of the whole instruction in bytes, opcode included.
    pub fn size(self) -> u8 {
        operand_count(self as u8) + 1
    }
}

impl TryFrom<u8> for Opcode {
    type Error = PlatformError;

    fn try_from(value: u8) -> Result<Self, PlatformError> {
        Self::ALL
            .into_iter()
            .find(|op| *op as u8 == value)
            .ok_or(PlatformError::InvalidOpcode(value))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// The operand layouts used by [Opcode]s, without the operand values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    OpOnly,
    R,
    RR,
    RI,
}

/// Instruction formats indicating which operand bytes follow the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrFormat {
    /// `<Opcode>`
    OpOnly,
    /// `<Opcode, Register>`
    R(Register),
    /// `<Opcode, Register, Register>`
    RR(Register, Register),
    /// `<Opcode, Register, Immediate>`
    RI(Register, u8),
}

impl InstrFormat {
    pub fn kind(self) -> FormatKind {
        match self {
            Self::OpOnly => FormatKind::OpOnly,
            Self::R(_) => FormatKind::R,
            Self::RR(_, _) => FormatKind::RR,
            Self::RI(_, _) => FormatKind::RI,
        }
    }
}

/// A full LS-8 instruction: an opcode and its decoded operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub op: Opcode,
    pub format: InstrFormat,
}

impl Instruction {
    pub fn new(op: Opcode, format: InstrFormat) -> PResult<Self> {
        let this = Self { op, format };
        this.validate()?;
        Ok(this)
    }

    /// Checks if this instruction has a valid format for its opcode.
    ///
    /// # Errors
    ///
    /// This function will return an error if the instruction's format is invalid for its opcode.
    pub fn validate(self) -> PResult<()> {
        if self.op.format_kind() == self.format.kind() {
            Ok(())
        } else {
            Err(PlatformError::InvalidInstruction(self.op))
        }
    }

    /// Size of the encoded instruction in bytes.
    pub fn size(self) -> u8 {
        self.op.size()
    }

    /// The single register operand.
    pub fn reg(self) -> PResult<Register> {
        match self.format {
            InstrFormat::R(a) => Ok(a),
            _ => Err(PlatformError::InvalidInstruction(self.op)),
        }
    }

    /// The two register operands.
    pub fn regs(self) -> PResult<(Register, Register)> {
        match self.format {
            InstrFormat::RR(a, b) => Ok((a, b)),
            _ => Err(PlatformError::InvalidInstruction(self.op)),
        }
    }

    /// The register and immediate operands.
    pub fn reg_imm(self) -> PResult<(Register, u8)> {
        match self.format {
            InstrFormat::RI(a, imm) => Ok((a, imm)),
            _ => Err(PlatformError::InvalidInstruction(self.op)),
        }
    }

    /// Generates the machine code for this instruction.
    ///
    /// # Errors
    ///
    /// This function will return an error if the instruction's format is invalid for its opcode.
    pub fn to_bytes(self) -> PResult<Vec<u8>> {
        self.validate()?;
        let op = self.op as u8;
        Ok(match self.format {
            InstrFormat::OpOnly => vec![op],
            InstrFormat::R(a) => vec![op, a as u8],
            InstrFormat::RR(a, b) => vec![op, a as u8, b as u8],
            InstrFormat::RI(a, imm) => vec![op, a as u8, imm],
        })
    }

    /// Decodes an [Instruction] from an opcode byte and up to two operand bytes.
    ///
    /// Only the first [operand_count] operand bytes are looked at.
    ///
    /// # Errors
    ///
    /// This function will return an error if the opcode is unknown or a register operand is out of range.
    pub fn from_bytes(bytes: [u8; 3]) -> PResult<Self> {
        let op = Opcode::try_from(bytes[0])?;
        let format = match op.format_kind() {
            FormatKind::OpOnly => InstrFormat::OpOnly,
            FormatKind::R => InstrFormat::R(bytes[1].try_into()?),
            FormatKind::RR => InstrFormat::RR(bytes[1].try_into()?, bytes[2].try_into()?),
            FormatKind::RI => InstrFormat::RI(bytes[1].try_into()?, bytes[2]),
        };
        Self::new(op, format)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format {
            InstrFormat::OpOnly => write!(f, "{}", self.op),
            InstrFormat::R(a) => write!(f, "{} {}", self.op, a),
            InstrFormat::RR(a, b) => write!(f, "{} {},{}", self.op, a, b),
            InstrFormat::RI(a, imm) => write!(f, "{} {},{}", self.op, a, imm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_count_matches_format() {
        for op in Opcode::ALL {
            let expected = match op.format_kind() {
                FormatKind::OpOnly => 0,
                FormatKind::R => 1,
                FormatKind::RR | FormatKind::RI => 2,
            };
            assert_eq!(operand_count(op as u8), expected, "{op}");
        }
    }

    #[test]
    fn test_opcodes_are_unique() {
        for (i, a) in Opcode::ALL.iter().enumerate() {
            for b in &Opcode::ALL[i + 1..] {
                assert_ne!(*a as u8, *b as u8);
            }
        }
    }

    #[test]
    fn test_instruction_encode() {
        let instr = Instruction {
            op: Opcode::Ldi,
            format: InstrFormat::RI(Register::R3, 200),
        };
        let bytes = instr.to_bytes().unwrap();
        assert_eq!(bytes, [0b1001_1001, 0x03, 200]);
    }

    #[test]
    fn test_instruction_decode() {
        let instr = Instruction::from_bytes([0b1010_1010, 0x00, 0x01]).unwrap();
        assert_eq!(
            instr,
            Instruction {
                op: Opcode::Mul,
                format: InstrFormat::RR(Register::R0, Register::R1),
            }
        );
        assert_eq!(instr.to_string(), "MUL R0,R1");
    }

    #[test]
    fn test_decode_ignores_unused_operand_bytes() {
        let instr = Instruction::from_bytes([Opcode::Prn as u8, 0x02, 0xFF]).unwrap();
        assert_eq!(instr.format, InstrFormat::R(Register::R2));
        let instr = Instruction::from_bytes([Opcode::Hlt as u8, 0xFF, 0xFF]).unwrap();
        assert_eq!(instr.format, InstrFormat::OpOnly);
    }

    #[test]
    fn test_decode_rejects_bad_bytes() {
        assert_eq!(
            Instruction::from_bytes([0xFF, 0, 0]),
            Err(PlatformError::InvalidOpcode(0xFF))
        );
        assert_eq!(
            Instruction::from_bytes([Opcode::Push as u8, 8, 0]),
            Err(PlatformError::InvalidRegister(8))
        );
    }

    #[test]
    fn test_invalid_format_rejected() {
        let err = Instruction::new(Opcode::Add, InstrFormat::R(Register::R0)).unwrap_err();
        assert_eq!(err, PlatformError::InvalidInstruction(Opcode::Add));
    }

    #[test]
    fn test_mnemonic_lookup() {
        assert_eq!(Opcode::from_mnemonic("ldi"), Some(Opcode::Ldi));
        assert_eq!(Opcode::from_mnemonic("IRET"), Some(Opcode::Iret));
        assert_eq!(Opcode::from_mnemonic("shl"), None);
    }
}

//! The assembler module for the LS-8.
//!
//! Source is line oriented:
//!
//! ```text
//! ; print 72
//! main:
//!     LDI R0, 8
//!     LDI R1, 9
//!     MUL R0, R1
//!     PRN R0
//!     HLT
//! ```
//!
//! Labels end in `:` and may be loaded with `LDI`. Immediates are decimal, `0x` hex or `0b`
//! binary. `DB` emits raw bytes. Comments start with `;` or `#`.

use nom_locate::LocatedSpan;
use thiserror::Error;

use crate::plat::{Opcode, Register};

pub mod assembler;
pub mod disasm;
pub mod lexer;

pub type Span<'a> = LocatedSpan<&'a str, &'a str>;

/// An error for the assembler module of the LS-8.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AsmError {
    #[error("syntax error at ({}:{})", .loc.0, .loc.1)]
    Syntax { loc: (usize, usize), span: String },
    #[error("found garbage at ({}:{}): {}", .loc.0, .loc.1, .span)]
    FoundGarbage { loc: (usize, usize), span: String },
    #[error("line {}: immediate value {} too large (must be <= {})", .line, .value, u8::MAX)]
    ImmOverflow { line: u32, value: u32 },
    #[error("line {line}: unexpected token {token}")]
    UnexpectedToken { line: u32, token: String },
    #[error("line {line}: invalid operands for {op}")]
    InvalidOperands { line: u32, op: Opcode },
    #[error("line {line}: expected a value, found a register")]
    RegisterAsValue { line: u32 },
    #[error("line {line}: {name} is reserved and can't be used as a label")]
    ReservedLabel { line: u32, name: String },
    #[error("label {0} is past the end of memory")]
    LabelOutOfRange(String),
    #[error("duplicate label: {0}")]
    DuplicateLabel(String),
    #[error("undefined reference: {0}")]
    UndefinedReference(String),
    #[error("program of {0} bytes does not fit in memory")]
    ProgramTooLarge(usize),
}

/// An assembly language token. Output for the lexer, input for the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token<'a> {
    /// An instruction [Opcode].
    Mnemonic(Opcode),
    /// The `DB` data directive.
    Db,
    /// A label definition, `name:`.
    LabelDef(&'a str),
    /// Any other identifier, taken to be a reference to a label.
    Ident(&'a str),
    /// A [Register] name.
    Register(Register),
    /// A numeric literal. Range checking happens in the assembler.
    Immediate(u32),
    /// `,`
    Comma,
    /// `\n`
    Newline,
    /// End of file.
    Eof,
}

/// Some item, along with the source text it was lexed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithSpan<'a, T> {
    pub span: Span<'a>,
    pub item: T,
}

impl<'a, T> WithSpan<'a, T> {
    /// 1-based source line of this item.
    pub fn line(&self) -> u32 {
        self.span.location_line()
    }
}

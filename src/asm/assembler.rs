use anyhow::{Error, Result};
use rustc_hash::FxHashMap;

use crate::{
    asm::lexer::{is_reserved, lex_program},
    emu::ADDRESS_SPACE,
    plat::{FormatKind, InstrFormat, Instruction, Opcode, Register},
};

use super::{AsmError, Token, WithSpan};

/// An instruction operand as written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand<'a> {
    Register(Register),
    Immediate(u32),
    Label(&'a str),
}

/// One line of source after parsing, with label references still unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement<'a> {
    Op {
        op: Opcode,
        operands: Vec<Operand<'a>>,
        line: u32,
    },
    Data {
        values: Vec<Operand<'a>>,
        line: u32,
    },
}

impl<'a> Statement<'a> {
    fn size(&self) -> usize {
        match self {
            Self::Op { op, .. } => op.size() as usize,
            Self::Data { values, .. } => values.len(),
        }
    }
}

/// Collects operands up to the end of the line. Commas between operands are optional.
#[allow(clippy::type_complexity)]
fn take_operands<'a, 'b>(
    mut toks: &'b [WithSpan<'a, Token<'a>>],
) -> Result<(&'b [WithSpan<'a, Token<'a>>], Vec<Operand<'a>>)> {
    let mut out = vec![];
    while let Some(tok) = toks.first() {
        let operand = match tok.item {
            Token::Newline | Token::Eof => break,
            Token::Comma => None,
            Token::Register(reg) => Some(Operand::Register(reg)),
            Token::Immediate(imm) => Some(Operand::Immediate(imm)),
            Token::Ident(name) => Some(Operand::Label(name)),
            Token::Mnemonic(_) | Token::Db | Token::LabelDef(_) => {
                return Err(Error::from(AsmError::UnexpectedToken {
                    line: tok.line(),
                    token: token_text(tok),
                }))
            }
        };
        out.extend(operand);
        toks = &toks[1..];
    }
    Ok((toks, out))
}

fn token_text(tok: &WithSpan<'_, Token<'_>>) -> String {
    tok.span
        .fragment()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// An assembly context capable of translating a source file into binary / machine code.
#[derive(Debug, Default)]
pub struct Assembler<'a> {
    labels: FxHashMap<&'a str, usize>,
    statements: Vec<Statement<'a>>,
}

impl<'a> Assembler<'a> {
    /// Generates binary / machine code from assembly source code.
    ///
    /// The first pass lays out every statement and records label addresses, the second
    /// encodes them with all labels known.
    ///
    /// # Errors
    ///
    /// This function will return an error if the provided assembly source is not valid syntax, or if there is an error while linking.
    pub fn assemble(&mut self, program_text: &'a str) -> Result<Box<[u8]>> {
        self.labels.clear();
        self.statements.clear();

        let tokens = lex_program(program_text)?;
        // A reserved name can't be referenced, so report it before a use of it trips up the layout pass.
        for tok in &tokens {
            if let Token::LabelDef(name) = tok.item {
                if is_reserved(name) {
                    return Err(Error::from(AsmError::ReservedLabel {
                        line: tok.line(),
                        name: name.to_owned(),
                    }));
                }
            }
        }
        let mut tokens = &tokens[..];
        let mut addr = 0usize;

        while let Some(next_tok) = tokens.first() {
            let line = next_tok.line();
            match next_tok.item {
                Token::Eof => break,
                Token::Newline => tokens = &tokens[1..],
                Token::LabelDef(name) => {
                    if self.labels.insert(name, addr).is_some() {
                        return Err(Error::from(AsmError::DuplicateLabel(name.to_owned())));
                    }
                    tokens = &tokens[1..];
                }
                Token::Mnemonic(op) => {
                    let (rest, operands) = take_operands(&tokens[1..])?;
                    tokens = rest;
                    self.statements.push(Statement::Op { op, operands, line });
                }
                Token::Db => {
                    let (rest, values) = take_operands(&tokens[1..])?;
                    tokens = rest;
                    self.statements.push(Statement::Data { values, line });
                }
                _ => {
                    return Err(Error::from(AsmError::UnexpectedToken {
                        line,
                        token: token_text(next_tok),
                    }))
                }
            }
            if let Some(stmt) = self.statements.last() {
                if matches!(next_tok.item, Token::Mnemonic(_) | Token::Db) {
                    addr += stmt.size();
                }
            }
            if addr > ADDRESS_SPACE {
                return Err(Error::from(AsmError::ProgramTooLarge(addr)));
            }
        }

        let mut out = Vec::with_capacity(addr);
        for stmt in &self.statements {
            match stmt {
                Statement::Op { op, operands, line } => {
                    let format = self.format(*op, operands, *line)?;
                    out.extend(Instruction::new(*op, format)?.to_bytes()?);
                }
                Statement::Data { values, line } => {
                    for value in values {
                        out.push(self.resolve(*value, *line)?);
                    }
                }
            }
        }
        log::debug!(
            "assembled {} bytes with {} labels",
            out.len(),
            self.labels.len()
        );

        Ok(out.into_boxed_slice())
    }

    /// Address of a label defined by the last [`assemble`](Self::assemble) call.
    ///
    /// A label may sit just past the last byte of a program that fills memory. That address is
    /// returned as is, but referencing it is an error.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    fn format(&self, op: Opcode, operands: &[Operand<'a>], line: u32) -> Result<InstrFormat> {
        Ok(match (op.format_kind(), operands) {
            (FormatKind::OpOnly, []) => InstrFormat::OpOnly,
            (FormatKind::R, [Operand::Register(a)]) => InstrFormat::R(*a),
            (FormatKind::RR, [Operand::Register(a), Operand::Register(b)]) => {
                InstrFormat::RR(*a, *b)
            }
            (FormatKind::RI, [Operand::Register(a), imm]) => {
                InstrFormat::RI(*a, self.resolve(*imm, line)?)
            }
            _ => return Err(Error::from(AsmError::InvalidOperands { line, op })),
        })
    }

    fn resolve(&self, operand: Operand<'a>, line: u32) -> Result<u8, AsmError> {
        match operand {
            Operand::Immediate(value) => {
                u8::try_from(value).map_err(|_| AsmError::ImmOverflow { line, value })
            }
            Operand::Label(name) => {
                let addr = self
                    .label(name)
                    .ok_or_else(|| AsmError::UndefinedReference(name.to_owned()))?;
                u8::try_from(addr).map_err(|_| AsmError::LabelOutOfRange(name.to_owned()))
            }
            Operand::Register(_) => Err(AsmError::RegisterAsValue { line }),
        }
    }
}

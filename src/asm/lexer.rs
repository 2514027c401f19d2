use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{alpha1, char, digit1, hex_digit1, line_ending, not_line_ending, one_of, space1},
    combinator::{map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{pair, preceded, terminated},
    IResult,
};

use anyhow::{Error, Result};

use crate::plat::{Opcode, Register};

use super::{AsmError, Span, Token, WithSpan};

impl Register {
    /// Looks up a register by its assembly name: `R0`-`R7`, or the `IM` and `SP` aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("im") {
            return Some(Self::IM);
        }
        if name.eq_ignore_ascii_case("sp") {
            return Some(Self::SP);
        }
        let index = name.strip_prefix(|c: char| c == 'r' || c == 'R')?;
        if index.len() != 1 {
            return None;
        }
        index.parse::<u8>().ok()?.try_into().ok()
    }
}

fn classify(word: &str) -> Token<'_> {
    if word.eq_ignore_ascii_case("db") {
        Token::Db
    } else if let Some(reg) = Register::from_name(word) {
        Token::Register(reg)
    } else if let Some(op) = Opcode::from_mnemonic(word) {
        Token::Mnemonic(op)
    } else {
        Token::Ident(word)
    }
}

/// Whether `word` names a mnemonic, register or directive, and so can't be used as a label.
pub fn is_reserved(word: &str) -> bool {
    !matches!(classify(word), Token::Ident(_))
}

pub fn lex_identifier(inp: Span) -> IResult<Span, Span> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(inp)
}

/// Lexes an identifier into a mnemonic, register, directive, label definition or label reference.
pub fn lex_word<'a>(inp: Span<'a>) -> IResult<Span<'a>, Token<'a>> {
    let (rest, word) = lex_identifier(inp)?;
    let (rest, colon) = opt(char(':'))(rest)?;
    let word: &'a str = *word.fragment();
    let tok = match colon {
        Some(_) => Token::LabelDef(word),
        None => classify(word),
    };
    Ok((rest, tok))
}

pub fn lex_immediate(inp: Span) -> IResult<Span, u32> {
    alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |x: Span| {
            u32::from_str_radix(x.fragment(), 16)
        }),
        map_res(
            preceded(tag_no_case("0b"), take_while1(|c: char| c == '0' || c == '1')),
            |x: Span| u32::from_str_radix(x.fragment(), 2),
        ),
        map_res(digit1, |x: Span| x.fragment().parse::<u32>()),
    ))(inp)
}

pub fn lex_comment(inp: Span) -> IResult<Span, Span> {
    recognize(pair(one_of(";#"), not_line_ending))(inp)
}

pub fn lex_blank(inp: Span) -> IResult<Span, Span> {
    alt((space1, lex_comment))(inp)
}

pub fn lex_token<'a>(inp: Span<'a>) -> IResult<Span<'a>, WithSpan<'a, Token<'a>>> {
    map(
        alt((
            value(Token::Newline, line_ending),
            value(Token::Comma, char(',')),
            map(lex_immediate, Token::Immediate),
            lex_word,
        )),
        move |item| WithSpan { span: inp, item },
    )(inp)
}

/// Lexes assembly program text into a [Vec] of [Token]s, ending with [Token::Eof].
pub fn lex_program(program: &str) -> Result<Vec<WithSpan<'_, Token<'_>>>> {
    let span = Span::new_extra(program, program);
    let (garbage, mut toks) = terminated(
        many0(preceded(many0(lex_blank), lex_token)),
        many0(lex_blank),
    )(span)
    .map_err(|e| {
        let span = match e {
            nom::Err::Error(e) => e.input,
            nom::Err::Failure(e) => e.input,
            nom::Err::Incomplete(_) => span,
        };
        Error::from(AsmError::Syntax {
            loc: (span.location_line() as usize, span.get_utf8_column()),
            span: span.fragment().to_string(),
        })
    })?;
    if !garbage.is_empty() {
        return Err(AsmError::FoundGarbage {
            loc: (garbage.location_line() as usize, garbage.get_utf8_column()),
            span: garbage
                .fragment()
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
        }
        .into());
    }
    toks.push(WithSpan {
        span: garbage,
        item: Token::Eof,
    });
    Ok(toks)
}

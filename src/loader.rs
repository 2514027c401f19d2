//! Reading programs from disk.
//!
//! An `.ls8` file holds one byte per line, written as exactly eight binary digits. Anything after
//! a `#` is a comment, and blank lines are skipped:
//!
//! ```text
//! # print8.ls8
//! 10011001 # LDI R0,8
//! 00000000
//! 00001000
//! 01000011 # PRN R0
//! 00000000
//! 00000001 # HLT
//! ```
//!
//! Files ending in `.asm` are run through the [Assembler] instead.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use nom::{
    bytes::complete::take_while_m_n,
    character::complete::{char, not_line_ending, space0},
    combinator::{all_consuming, map_res, opt},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use thiserror::Error;

use crate::{asm::assembler::Assembler, emu::ADDRESS_SPACE};

/// An error for loading programs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("line {line}: expected 8 binary digits, found {text:?}")]
    Syntax { line: usize, text: String },
    #[error("program of {0} bytes does not fit in memory")]
    TooLarge(usize),
}

fn lex_comment(inp: &str) -> IResult<&str, &str> {
    preceded(char('#'), not_line_ending)(inp)
}

fn lex_byte(inp: &str) -> IResult<&str, u8> {
    map_res(
        take_while_m_n(8, 8, |c: char| c == '0' || c == '1'),
        |bits: &str| u8::from_str_radix(bits, 2),
    )(inp)
}

/// A single line: an optional byte, then an optional comment.
fn lex_line(inp: &str) -> IResult<&str, Option<u8>> {
    all_consuming(terminated(
        delimited(space0, opt(lex_byte), space0),
        opt(pair(lex_comment, space0)),
    ))(inp)
}

/// Parses the text of an `.ls8` file into bytes.
///
/// # Errors
///
/// This function will return an error if a line holds anything other than one 8 digit binary
/// number and a comment, or if there are more bytes than fit in memory.
pub fn parse_ls8(text: &str) -> Result<Vec<u8>> {
    let mut out = vec![];
    for (i, line) in text.lines().enumerate() {
        let (_, byte) = lex_line(line).map_err(|_| LoadError::Syntax {
            line: i + 1,
            text: line.trim().to_string(),
        })?;
        out.extend(byte);
    }
    if out.len() > ADDRESS_SPACE {
        return Err(LoadError::TooLarge(out.len()).into());
    }
    Ok(out)
}

/// Reads a program from `path`, assembling it first if it's an `.asm` file.
pub fn load_file(path: &Path) -> Result<Vec<u8>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let program = match path.extension().and_then(|ext| ext.to_str()) {
        Some("asm") => Assembler::default().assemble(&text)?.into_vec(),
        _ => parse_ls8(&text)?,
    };
    log::debug!("loaded {} bytes from {}", program.len(), path.display());
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::disasm::to_ls8;

    #[test]
    fn test_parse_ls8() {
        let text = "
# print8.ls8
10011001 # LDI R0,8
00000000
00001000

  01000011   # PRN R0
00000000
00000001 # HLT
";
        assert_eq!(
            parse_ls8(text).unwrap(),
            [0b1001_1001, 0, 8, 0b0100_0011, 0, 1]
        );
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_ls8("00000001\n1010\n").unwrap_err();
        assert_eq!(
            err.downcast_ref::<LoadError>(),
            Some(&LoadError::Syntax {
                line: 2,
                text: "1010".to_string()
            })
        );
        assert!(parse_ls8("000000012").is_err());
        assert!(parse_ls8("00000001 00000001").is_err());
    }

    #[test]
    fn test_too_large() {
        let text = "00000000\n".repeat(ADDRESS_SPACE + 1);
        let err = parse_ls8(&text).unwrap_err();
        assert_eq!(
            err.downcast_ref::<LoadError>(),
            Some(&LoadError::TooLarge(ADDRESS_SPACE + 1))
        );
        assert_eq!(parse_ls8(&text[9..]).unwrap().len(), ADDRESS_SPACE);
    }

    #[test]
    fn test_reads_disassembly_listing() {
        let program = [0b1001_1001, 2, 0xF0, 0b0100_1101, 2, 0xFF, 0b0000_0001];
        assert_eq!(parse_ls8(&to_ls8(&program)).unwrap(), program);
    }

    #[test]
    fn test_load_file() {
        let dir = std::env::temp_dir().join(format!("ls8-loader-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let asm = dir.join("print.asm");
        fs::write(&asm, "LDI R0, 8\nPRN R0\nHLT\n").unwrap();
        assert_eq!(
            load_file(&asm).unwrap(),
            [0b1001_1001, 0, 8, 0b0100_0011, 0, 1]
        );

        let ls8 = dir.join("halt.ls8");
        fs::write(&ls8, "00000001 # HLT\n").unwrap();
        assert_eq!(load_file(&ls8).unwrap(), [1]);

        assert!(load_file(&dir.join("missing.ls8")).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}

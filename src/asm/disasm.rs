use std::fmt::{self, Write as _};

use crate::plat::{operand_count, Instruction};

/// One disassembled instruction, or a byte that doesn't decode as one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub addr: u8,
    pub bytes: Vec<u8>,
    pub text: String,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = String::new();
        for b in &self.bytes {
            write!(hex, "{:02X} ", b)?;
        }
        write!(f, "{:02X}: {:<9}{}", self.addr, hex, self.text)
    }
}

/// Walks `program` from address 0, decoding as it goes.
///
/// Bytes that aren't a valid instruction (unknown opcode, out of range register, truncated
/// operands) come out as a single-byte `DB`, and decoding picks up again at the next byte.
pub fn disassemble(program: &[u8]) -> Vec<Line> {
    let mut lines = vec![];
    let mut addr = 0usize;
    while addr < program.len() {
        let len = (1 + operand_count(program[addr]) as usize).min(3);
        let decoded = program.get(addr..addr + len).and_then(|bytes| {
            let mut buf = [0u8; 3];
            buf[..bytes.len()].copy_from_slice(bytes);
            Instruction::from_bytes(buf).ok()
        });
        let line = match decoded {
            Some(instr) => Line {
                addr: addr as u8,
                bytes: program[addr..addr + len].to_vec(),
                text: instr.to_string(),
            },
            None => Line {
                addr: addr as u8,
                bytes: vec![program[addr]],
                text: format!("DB {:#04x}", program[addr]),
            },
        };
        addr += line.bytes.len();
        lines.push(line);
    }
    lines
}

/// Renders `program` in `.ls8` text form: one byte per line in binary, with the disassembly of
/// each instruction as a comment on its first byte.
pub fn to_ls8(program: &[u8]) -> String {
    let mut out = String::new();
    for line in disassemble(program) {
        for (i, b) in line.bytes.iter().enumerate() {
            if i == 0 {
                out.push_str(&format!("{:08b} # {}\n", b, line.text));
            } else {
                out.push_str(&format!("{:08b}\n", b));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plat::Opcode;

    #[test]
    #[rustfmt::skip]
    fn test_disassemble() {
        let program = [
            Opcode::Ldi as u8, 0, 8,
            Opcode::Mul as u8, 0, 1,
            Opcode::Prn as u8, 0,
            Opcode::Hlt as u8,
        ];
        let text: Vec<_> = disassemble(&program)
            .into_iter()
            .map(|l| (l.addr, l.text))
            .collect();
        assert_eq!(
            text,
            [
                (0, "LDI R0,8".to_string()),
                (3, "MUL R0,R1".to_string()),
                (6, "PRN R0".to_string()),
                (8, "HLT".to_string()),
            ]
        );
    }

    #[test]
    fn test_undecodable_bytes() {
        let lines = disassemble(&[0xFF, Opcode::Push as u8, 8, Opcode::Ldi as u8, 1]);
        let text: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        // bad register, then operands running off the end
        assert_eq!(
            text,
            ["DB 0xff", "DB 0x4d", "DB 0x08", "DB 0x99", "HLT"]
        );
    }

    #[test]
    fn test_line_display() {
        let lines = disassemble(&[Opcode::Ldi as u8, 2, 0x10]);
        assert_eq!(lines[0].to_string(), "00: 99 02 10 LDI R2,16");
    }

    #[test]
    fn test_to_ls8() {
        let text = to_ls8(&[Opcode::Prn as u8, 3, Opcode::Hlt as u8]);
        assert_eq!(text, "01000011 # PRN R3\n00000011\n00000001 # HLT\n");
    }
}

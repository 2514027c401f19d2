use super::{registers::Fl, EmuError};

/// The operations the ALU can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AluOp {
    Add = 0,
    Sub,
    Mul,
    Div,
    Mod,
    Inc,
    Dec,
    And,
    Or,
    Xor,
    Not,
    Cmp,
}

/// What an ALU operation produces: a new value for the destination register, or new flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOutput {
    Value(u8),
    Flags(Fl),
}

/// Performs `op` on `left` and `right`. Unary operations ignore `right`.
///
/// All arithmetic wraps at 8 bits. Nothing is written anywhere; committing the
/// [AluOutput] is up to the caller, so a failing operation leaves no trace.
///
/// # Errors
///
/// Returns [`EmuError::DivisionByZero`] for [`AluOp::Div`] and [`AluOp::Mod`] with a zero `right`.
pub fn apply(op: AluOp, left: u8, right: u8) -> Result<AluOutput, EmuError> {
    let value = match op {
        AluOp::Add => left.wrapping_add(right),
        AluOp::Sub => left.wrapping_sub(right),
        AluOp::Mul => left.wrapping_mul(right),
        AluOp::Div => left
            .checked_div(right)
            .ok_or(EmuError::DivisionByZero(op))?,
        AluOp::Mod => left
            .checked_rem(right)
            .ok_or(EmuError::DivisionByZero(op))?,
        AluOp::Inc => left.wrapping_add(1),
        AluOp::Dec => left.wrapping_sub(1),
        AluOp::And => left & right,
        AluOp::Or => left | right,
        AluOp::Xor => left ^ right,
        AluOp::Not => !left,
        AluOp::Cmp => return Ok(AluOutput::Flags(Fl::compare(left, right))),
    };
    Ok(AluOutput::Value(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(op: AluOp, left: u8, right: u8) -> u8 {
        match apply(op, left, right).unwrap() {
            AluOutput::Value(v) => v,
            AluOutput::Flags(f) => panic!("{op:?} produced flags {f:?}"),
        }
    }

    #[test]
    fn test_arithmetic_wraps() {
        assert_eq!(value(AluOp::Add, 200, 100), 44);
        assert_eq!(value(AluOp::Sub, 5, 10), 251);
        assert_eq!(value(AluOp::Mul, 16, 17), 16);
        assert_eq!(value(AluOp::Inc, 255, 0), 0);
        assert_eq!(value(AluOp::Dec, 0, 0), 255);
    }

    #[test]
    fn test_division() {
        assert_eq!(value(AluOp::Div, 100, 7), 14);
        assert_eq!(value(AluOp::Mod, 100, 7), 2);
        assert_eq!(
            apply(AluOp::Div, 1, 0),
            Err(EmuError::DivisionByZero(AluOp::Div))
        );
        assert_eq!(
            apply(AluOp::Mod, 1, 0),
            Err(EmuError::DivisionByZero(AluOp::Mod))
        );
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(value(AluOp::And, 0b1100, 0b1010), 0b1000);
        assert_eq!(value(AluOp::Or, 0b1100, 0b1010), 0b1110);
        assert_eq!(value(AluOp::Xor, 0b1100, 0b1010), 0b0110);
        assert_eq!(value(AluOp::Not, 0b0000_1111, 0xAA), 0b1111_0000);
    }

    #[test]
    fn test_compare() {
        assert_eq!(apply(AluOp::Cmp, 5, 10), Ok(AluOutput::Flags(Fl::LT)));
        assert_eq!(apply(AluOp::Cmp, 10, 10), Ok(AluOutput::Flags(Fl::EQ)));
        assert_eq!(apply(AluOp::Cmp, 200, 10), Ok(AluOutput::Flags(Fl::GT)));
    }
}

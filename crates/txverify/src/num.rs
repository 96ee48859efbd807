//! Script numeric

use std::ops::{Add, Neg, Sub};

/// Script number error type.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum NumError {
    #[error("Script number overflow")]
    Overflow,
    #[error("Non-minimally encoded script number")]
    NotMinimallyEncoded,
}

/// Numeric value as seen by the arithmetic opcodes.
///
/// Operands are little-endian sign-magnitude byte strings of at most
/// [`ScriptNum::MAX_NUM_SIZE`] bytes, results may exceed that range and are
/// only rejected once they are read back as an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScriptNum {
    value: i64,
}

impl<T: Into<i64>> From<T> for ScriptNum {
    fn from(value: T) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl ScriptNum {
    /// Default operand width in bytes.
    pub const MAX_NUM_SIZE: usize = 4;

    /// Operand width accepted by OP_CHECKLOCKTIMEVERIFY and OP_CHECKSEQUENCEVERIFY.
    pub const LOCKTIME_NUM_SIZE: usize = 5;

    /// Decodes a stack element, rejecting values wider than `max_size` bytes.
    pub fn from_bytes(data: &[u8], require_minimal: bool, max_size: usize) -> Result<Self, NumError> {
        if data.len() > max_size {
            return Err(NumError::Overflow);
        }

        let Some((&last, _)) = data.split_last() else {
            return Ok(Self { value: 0 });
        };

        if require_minimal && !is_minimally_encoded(data) {
            return Err(NumError::NotMinimallyEncoded);
        }

        let magnitude = data
            .iter()
            .enumerate()
            .fold(0i64, |acc, (i, &byte)| acc | i64::from(byte).wrapping_shl(8 * i as u32));

        if last & 0x80 != 0 {
            let sign_bit = 0x80i64.wrapping_shl(8 * (data.len() as u32 - 1));
            Ok(Self {
                value: -(magnitude & !sign_bit),
            })
        } else {
            Ok(Self { value: magnitude })
        }
    }

    /// Minimal encoding of the number.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.value == 0 {
            return Vec::new();
        }

        let negative = self.value < 0;
        let mut abs_value = self.value.unsigned_abs();
        let mut out = Vec::with_capacity(9);

        while abs_value != 0 {
            out.push((abs_value & 0xff) as u8);
            abs_value >>= 8;
        }

        // The top bit of the last byte is the sign, add a byte if it's taken.
        match out.last_mut() {
            Some(last) if *last & 0x80 != 0 => out.push(if negative { 0x80 } else { 0x00 }),
            Some(last) if negative => *last |= 0x80,
            _ => {}
        }

        out
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// Value saturated to the `i32` range, used for counts and indices.
    pub fn to_i32(&self) -> i32 {
        self.value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    pub fn is_negative(&self) -> bool {
        self.value.is_negative()
    }

    pub fn abs(&self) -> Self {
        self.value.abs().into()
    }
}

/// Returns `true` if `data` carries no superfluous most-significant zero byte.
pub fn is_minimally_encoded(data: &[u8]) -> bool {
    match data {
        [] => true,
        [.., last] if last & 0x7f != 0 => true,
        // A lone sign byte or a zero byte whose predecessor doesn't need the sign bit.
        [_] => false,
        [.., prev, _] => prev & 0x80 != 0,
    }
}

impl Add for ScriptNum {
    type Output = Result<Self, NumError>;

    fn add(self, other: Self) -> Self::Output {
        self.value
            .checked_add(other.value)
            .map(|value| Self { value })
            .ok_or(NumError::Overflow)
    }
}

impl Sub for ScriptNum {
    type Output = Result<Self, NumError>;

    fn sub(self, other: Self) -> Self::Output {
        self.value
            .checked_sub(other.value)
            .map(|value| Self { value })
            .ok_or(NumError::Overflow)
    }
}

impl Neg for ScriptNum {
    type Output = Result<Self, NumError>;

    fn neg(self) -> Self::Output {
        self.value
            .checked_neg()
            .map(|value| Self { value })
            .ok_or(NumError::Overflow)
    }
}

use super::opcode::Opcode;
use bitcoin::Script;

/// Script decoding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("push length prefix truncated at byte {0}")]
    TruncatedLength(usize),
    #[error("push at byte {offset} declares {declared} bytes but only {available} remain")]
    TruncatedPush {
        offset: usize,
        declared: usize,
        available: usize,
    },
}

/// A decoded script operation.
///
/// Every opcode up to and including `OP_PUSHDATA4` is a push, `OP_0` pushes
/// the empty vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    Push { opcode: u8, data: &'a [u8] },
    Op(u8),
}

impl<'a> Operation<'a> {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Push { opcode, .. } => *opcode,
            Self::Op(opcode) => *opcode,
        }
    }

    pub fn data(&self) -> Option<&'a [u8]> {
        match self {
            Self::Push { data, .. } => Some(data),
            Self::Op(_) => None,
        }
    }

    pub fn is_push(&self) -> bool {
        matches!(self, Self::Push { .. })
    }

    /// Number of length bytes between the opcode and the payload.
    pub fn prefix_size(&self) -> usize {
        match self.opcode() {
            0x4c => 1,
            0x4d => 2,
            0x4e => 4,
            _ => 0,
        }
    }

    /// Size of the operation as it appears in the script.
    pub fn encoded_len(&self) -> usize {
        1 + self.prefix_size() + self.data().map_or(0, <[u8]>::len)
    }

    /// Whether the payload uses the shortest possible push encoding.
    pub fn is_minimal_push(&self) -> bool {
        let Self::Push { opcode, data } = *self else {
            return true;
        };

        match data {
            // Should have used OP_0.
            [] => opcode == Opcode::OP_0.to_u8(),
            // Should have used OP_1 .. OP_16.
            [n] if (1..=16).contains(n) => false,
            // Should have used OP_1NEGATE.
            [0x81] => false,
            _ if data.len() <= 75 => opcode as usize == data.len(),
            _ if data.len() <= 255 => opcode == Opcode::OP_PUSHDATA1.to_u8(),
            _ if data.len() <= 65535 => opcode == Opcode::OP_PUSHDATA2.to_u8(),
            _ => true,
        }
    }

    /// Appends the exact encoding of this operation.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode());
        if let Some(data) = self.data() {
            let len = data.len();
            match self.prefix_size() {
                1 => out.push(len as u8),
                2 => out.extend_from_slice(&(len as u16).to_le_bytes()),
                4 => out.extend_from_slice(&(len as u32).to_le_bytes()),
                _ => {}
            }
            out.extend_from_slice(data);
        }
    }
}

/// Decodes the operation starting at byte `offset`.
///
/// Returns the operation and the offset right after it.
pub(crate) fn decode_at(script: &[u8], offset: usize) -> Result<(Operation<'_>, usize), ParseError> {
    let opcode = script[offset];
    let mut pos = offset + 1;

    let len = match opcode {
        0x00..=0x4b => opcode as usize,
        0x4c..=0x4e => {
            let width = match opcode {
                0x4c => 1,
                0x4d => 2,
                _ => 4,
            };
            let Some(prefix) = script.get(pos..pos + width) else {
                return Err(ParseError::TruncatedLength(offset));
            };
            pos += width;
            prefix
                .iter()
                .rev()
                .fold(0usize, |acc, &byte| (acc << 8) | byte as usize)
        }
        _ => return Ok((Operation::Op(opcode), pos)),
    };

    let available = script.len() - pos;
    if len > available {
        return Err(ParseError::TruncatedPush {
            offset,
            declared: len,
            available,
        });
    }

    let data = &script[pos..pos + len];
    Ok((Operation::Push { opcode, data }, pos + len))
}

/// Lazy script decoder.
///
/// Operations are decoded on demand and memoized, so [`Parser::get`] is O(1)
/// for any index that was reached before, and [`Parser::rewind`] restarts
/// iteration without decoding anything twice.
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    script: &'a [u8],
    /// Decoded operations with the byte offset following each of them.
    decoded: Vec<(Operation<'a>, usize)>,
    /// Sticky decoding failure, nothing past it is reachable.
    error: Option<ParseError>,
    /// Index of the next operation handed out by the iterator.
    cursor: usize,
}

impl<'a> Parser<'a> {
    pub fn new(script: &'a Script) -> Self {
        Self::from_bytes(script.as_bytes())
    }

    pub fn from_bytes(script: &'a [u8]) -> Self {
        Self {
            script,
            decoded: Vec::new(),
            error: None,
            cursor: 0,
        }
    }

    pub fn script(&self) -> &'a [u8] {
        self.script
    }

    /// Returns the `index`-th operation, decoding forward as needed.
    pub fn get(&mut self, index: usize) -> Option<Result<Operation<'a>, ParseError>> {
        while self.decoded.len() <= index {
            if let Some(err) = self.error {
                return Some(Err(err));
            }
            let offset = self.decoded_end();
            if offset >= self.script.len() {
                return None;
            }
            match decode_at(self.script, offset) {
                Ok(entry) => self.decoded.push(entry),
                Err(err) => {
                    self.error = Some(err);
                    return Some(Err(err));
                }
            }
        }
        Some(Ok(self.decoded[index].0))
    }

    /// Byte offset right after the operation most recently returned by the iterator.
    pub fn position(&self) -> usize {
        match self.cursor.checked_sub(1) {
            Some(index) => self.decoded[index].1,
            None => 0,
        }
    }

    /// Restarts iteration from the first operation.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn decoded_end(&self) -> usize {
        self.decoded.last().map_or(0, |(_, end)| *end)
    }
}

impl<'a> Iterator for Parser<'a> {
    type Item = Result<Operation<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.get(self.cursor)?;
        if item.is_ok() {
            self.cursor += 1;
        }
        Some(item)
    }
}

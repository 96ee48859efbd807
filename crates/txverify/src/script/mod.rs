//! Script decoding and the byte-level helpers consensus depends on.

pub mod classifier;
pub mod opcode;
pub mod parser;

pub use self::classifier::{InputTemplate, OutputType};
pub use self::opcode::{Opcode, is_op_success};
pub use self::parser::{Operation, ParseError, Parser};

use self::parser::decode_at;

/// Decodes the whole script.
pub fn decode(script: &[u8]) -> Result<Vec<Operation<'_>>, ParseError> {
    Parser::from_bytes(script).collect()
}

/// Encodes operations back into script bytes.
///
/// Push prefixes are reproduced exactly, so `encode(decode(s)) == s`.
pub fn encode(ops: &[Operation<'_>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ops.iter().map(Operation::encoded_len).sum());
    for op in ops {
        op.encode_into(&mut out);
    }
    out
}

/// Encodes `data` as a single push using the shortest length prefix.
///
/// An empty payload becomes `OP_0`, one-byte payloads are never turned into
/// `OP_N`.
pub fn push_data_script(data: &[u8]) -> Vec<u8> {
    let len = data.len();
    let mut out = Vec::with_capacity(len + 5);
    match len {
        0..=0x4b => out.push(len as u8),
        0x4c..=0xff => {
            out.push(Opcode::OP_PUSHDATA1.to_u8());
            out.push(len as u8);
        }
        0x100..=0xffff => {
            out.push(Opcode::OP_PUSHDATA2.to_u8());
            out.extend_from_slice(&(len as u16).to_le_bytes());
        }
        _ => {
            out.push(Opcode::OP_PUSHDATA4.to_u8());
            out.extend_from_slice(&(len as u32).to_le_bytes());
        }
    }
    out.extend_from_slice(data);
    out
}

/// Returns `true` if the script decodes and contains only push opcodes.
///
/// `OP_1NEGATE`, `OP_RESERVED` and `OP_1` through `OP_16` count as pushes.
pub fn is_push_only(script: &[u8]) -> bool {
    Parser::from_bytes(script).all(|op| match op {
        Ok(op) => op.opcode() <= Opcode::OP_16.to_u8(),
        Err(_) => false,
    })
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`
pub fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23
        && script[0] == Opcode::OP_HASH160.to_u8()
        && script[1] == 0x14
        && script[22] == Opcode::OP_EQUAL.to_u8()
}

/// Splits a witness program into its version and program bytes.
///
/// A witness program is a version push (`OP_0` or `OP_1` .. `OP_16`)
/// followed by a single direct push of 2 to 40 bytes.
pub fn witness_program(script: &[u8]) -> Option<(u8, &[u8])> {
    if !(4..=42).contains(&script.len()) {
        return None;
    }

    let version = match script[0] {
        0x00 => 0,
        byte @ 0x51..=0x60 => byte - 0x50,
        _ => return None,
    };

    if script[1] as usize + 2 != script.len() {
        return None;
    }

    Some((version, &script[2..]))
}

/// Removes every occurrence of `pattern` that starts at an operation boundary.
///
/// Returns the number of removed occurrences, `script` is left untouched
/// when nothing matched.
pub fn find_and_delete(script: &mut Vec<u8>, pattern: &[u8]) -> usize {
    if pattern.is_empty() {
        return 0;
    }

    let mut found = 0;
    let mut result = Vec::with_capacity(script.len());
    let mut pos = 0;
    let mut kept_from = 0;

    loop {
        result.extend_from_slice(&script[kept_from..pos]);
        while script[pos..].starts_with(pattern) {
            pos += pattern.len();
            found += 1;
        }
        kept_from = pos;

        if pos >= script.len() {
            break;
        }
        match decode_at(script, pos) {
            Ok((_, next)) => pos = next,
            Err(_) => break,
        }
    }

    if found > 0 {
        result.extend_from_slice(&script[kept_from..]);
        *script = result;
    }

    found
}

/// Copies the script without its `OP_CODESEPARATOR`s.
///
/// Bytes following an undecodable operation are kept verbatim.
pub fn strip_code_separators(script: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(script.len());
    let mut segment_start = 0;
    let mut pos = 0;

    while pos < script.len() {
        let Ok((op, next)) = decode_at(script, pos) else {
            break;
        };
        if op == Operation::Op(Opcode::OP_CODESEPARATOR.to_u8()) {
            out.extend_from_slice(&script[segment_start..pos]);
            segment_start = next;
        }
        pos = next;
    }

    out.extend_from_slice(&script[segment_start..]);
    out
}

//! Standard script template matching.

use super::opcode::Opcode;
use super::parser::{Operation, ParseError};
use super::{decode, encode};

const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

/// Classification of an output script together with its solution data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputType {
    NonStandard,
    /// `<pubkey> OP_CHECKSIG`
    PubKey(Vec<u8>),
    /// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
    PubKeyHash([u8; 20]),
    /// `OP_HASH160 <20 bytes> OP_EQUAL`
    ScriptHash([u8; 20]),
    /// `m <pubkey>... n OP_CHECKMULTISIG`
    Multisig { required: u8, keys: Vec<Vec<u8>> },
    /// `OP_RETURN <pushes>...`
    NullData,
    /// `OP_RETURN <0xaa21a9ed || 32-byte commitment>`
    WitnessCoinbaseCommitment([u8; 32]),
    WitnessV0KeyHash([u8; 20]),
    WitnessV0ScriptHash([u8; 32]),
    WitnessV1Taproot([u8; 32]),
    /// Pay-to-anchor, `OP_1 <0x4e73>`.
    Anchor,
    /// Witness program of a version without defined semantics.
    WitnessUnknown { version: u8, program: Vec<u8> },
}

impl OutputType {
    /// Classifies raw script bytes, undecodable scripts are non-standard.
    pub fn classify(script: &[u8]) -> Self {
        decode(script).map_or(Self::NonStandard, |ops| Self::from_operations(&ops))
    }

    /// Classifies an already decoded script.
    pub fn from_operations(ops: &[Operation<'_>]) -> Self {
        use Operation::{Op, Push};

        const OP_CHECKSIG: u8 = Opcode::OP_CHECKSIG.to_u8();
        const OP_DUP: u8 = Opcode::OP_DUP.to_u8();
        const OP_HASH160: u8 = Opcode::OP_HASH160.to_u8();
        const OP_EQUALVERIFY: u8 = Opcode::OP_EQUALVERIFY.to_u8();
        const OP_EQUAL: u8 = Opcode::OP_EQUAL.to_u8();
        const OP_RETURN: u8 = Opcode::OP_RETURN.to_u8();

        if let Some(output_type) = match_witness_program(ops) {
            return output_type;
        }

        match ops {
            [Push { data, .. }, Op(OP_CHECKSIG)] if is_pubkey(data) => Self::PubKey(data.to_vec()),
            [
                Op(OP_DUP),
                Op(OP_HASH160),
                Push { opcode: 20, data },
                Op(OP_EQUALVERIFY),
                Op(OP_CHECKSIG),
            ] => Self::PubKeyHash(to_array(data)),
            [Op(OP_HASH160), Push { opcode: 20, data }, Op(OP_EQUAL)] => {
                Self::ScriptHash(to_array(data))
            }
            [Op(OP_RETURN), Push { opcode: 36, data }, ..]
                if data.starts_with(&WITNESS_COMMITMENT_HEADER) =>
            {
                Self::WitnessCoinbaseCommitment(to_array(&data[4..]))
            }
            [Op(OP_RETURN), rest @ ..]
                if rest
                    .iter()
                    .all(|op| op.opcode() <= Opcode::OP_16.to_u8()) =>
            {
                Self::NullData
            }
            _ => match_multisig(ops).unwrap_or(Self::NonStandard),
        }
    }

    /// Script type name as used in Bitcoin Core RPC responses.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NonStandard => "nonstandard",
            Self::PubKey(_) => "pubkey",
            Self::PubKeyHash(_) => "pubkeyhash",
            Self::ScriptHash(_) => "scripthash",
            Self::Multisig { .. } => "multisig",
            Self::NullData => "nulldata",
            Self::WitnessCoinbaseCommitment(_) => "witness_coinbase_commitment",
            Self::WitnessV0KeyHash(_) => "witness_v0_keyhash",
            Self::WitnessV0ScriptHash(_) => "witness_v0_scripthash",
            Self::WitnessV1Taproot(_) => "witness_v1_taproot",
            Self::Anchor => "anchor",
            Self::WitnessUnknown { .. } => "witness_unknown",
        }
    }

    pub fn is_standard(&self) -> bool {
        !matches!(self, Self::NonStandard)
    }
}

/// Error returned by [`decode_sequence`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("operations starting at index {0} match no standard template")]
    Unclassifiable(usize),
}

/// Splits a script into consecutive standard templates.
///
/// At each position the shortest run of operations forming a standard
/// template wins. Operations that start no template are skipped when
/// `allow_nonstandard` is set and rejected otherwise.
pub fn decode_sequence(
    script: &[u8],
    allow_nonstandard: bool,
) -> Result<Vec<(OutputType, Vec<u8>)>, ClassifyError> {
    let ops = decode(script)?;
    let mut result = Vec::new();
    let mut start = 0;

    while start < ops.len() {
        let matched = (1..=ops.len() - start).find_map(|len| {
            let slice = &ops[start..start + len];
            let output_type = OutputType::from_operations(slice);
            output_type
                .is_standard()
                .then(|| (len, output_type, encode(slice)))
        });

        match matched {
            Some((len, output_type, template)) => {
                result.push((output_type, template));
                start += len;
            }
            None if allow_nonstandard => start += 1,
            None => return Err(ClassifyError::Unclassifiable(start)),
        }
    }

    Ok(result)
}

/// Classification of a signature script by the spend template it satisfies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputTemplate<'a> {
    /// `<sig>`
    PayToPubKey { signature: &'a [u8] },
    /// `<sig> <pubkey>`
    PayToPubKeyHash {
        signature: &'a [u8],
        pubkey: &'a [u8],
    },
    /// `OP_0 <sig>...`
    Multisig { signatures: Vec<&'a [u8]> },
    /// `<pushes>... <redeem script>` whose redeem script is itself standard.
    PayToScriptHash {
        redeem_script: &'a [u8],
        redeem_type: OutputType,
    },
    Unknown,
}

/// Upper bound of a DER signature plus its sighash byte.
const MAX_SIGNATURE_LEN: usize = 73;

impl<'a> InputTemplate<'a> {
    pub fn classify(script_sig: &'a [u8]) -> Self {
        if let Some(signature) = Self::decode_p2pk(script_sig) {
            return Self::PayToPubKey { signature };
        }

        if let Some((signature, pubkey)) = Self::decode_p2pkh(script_sig) {
            return Self::PayToPubKeyHash { signature, pubkey };
        }

        if let Some(signatures) = Self::decode_multisig(script_sig) {
            return Self::Multisig { signatures };
        }

        pushes(script_sig)
            .and_then(|pushes| pushes.last().copied())
            .and_then(|redeem_script| {
                p2sh_redeem_type(redeem_script).map(|redeem_type| Self::PayToScriptHash {
                    redeem_script,
                    redeem_type,
                })
            })
            .unwrap_or(Self::Unknown)
    }

    /// `<sig>`
    pub fn decode_p2pk(script_sig: &'a [u8]) -> Option<&'a [u8]> {
        match pushes(script_sig)?.as_slice() {
            [signature] if is_signature_like(signature) => Some(*signature),
            _ => None,
        }
    }

    /// `<sig> <pubkey>`
    pub fn decode_p2pkh(script_sig: &'a [u8]) -> Option<(&'a [u8], &'a [u8])> {
        match pushes(script_sig)?.as_slice() {
            [signature, pubkey] if is_signature_like(signature) && is_pubkey(pubkey) => {
                Some((*signature, *pubkey))
            }
            _ => None,
        }
    }

    /// `OP_0 <sig>...`, returns the signatures.
    pub fn decode_multisig(script_sig: &'a [u8]) -> Option<Vec<&'a [u8]>> {
        match pushes(script_sig)?.as_slice() {
            [dummy, signatures @ ..]
                if dummy.is_empty()
                    && !signatures.is_empty()
                    && signatures.iter().all(|sig| is_signature_like(sig)) =>
            {
                Some(signatures.to_vec())
            }
            _ => None,
        }
    }
}

/// Data of every operation, `None` unless the script is push data only.
fn pushes(script_sig: &[u8]) -> Option<Vec<&[u8]>> {
    decode(script_sig)
        .ok()?
        .iter()
        .map(Operation::data)
        .collect()
}

fn p2sh_redeem_type(script: &[u8]) -> Option<OutputType> {
    if script.is_empty() {
        return None;
    }
    let output_type = OutputType::classify(script);
    output_type.is_standard().then_some(output_type)
}

fn is_signature_like(data: &[u8]) -> bool {
    data.first() == Some(&0x30) && data.len() <= MAX_SIGNATURE_LEN
}

/// Loose public key shape check, compressed or uncompressed.
fn is_pubkey(data: &[u8]) -> bool {
    matches!((data.len(), data.first()), (33, Some(0x02 | 0x03)) | (65, Some(0x04)))
}

fn to_array<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[..N]);
    out
}

fn match_witness_program(ops: &[Operation<'_>]) -> Option<OutputType> {
    let [version_op, Operation::Push { opcode, data: program }] = ops else {
        return None;
    };

    // The program must be a direct push of 2 to 40 bytes.
    if *opcode as usize != program.len() || !(2..=40).contains(&program.len()) {
        return None;
    }

    let version = match *version_op {
        Operation::Push { opcode: 0, .. } => 0,
        Operation::Op(op) => Opcode::from_u8(op)?.small_int().filter(|v| *v >= 1)? as u8,
        Operation::Push { .. } => return None,
    };

    let output_type = match (version, program.len()) {
        (0, 20) => OutputType::WitnessV0KeyHash(to_array(program)),
        (0, 32) => OutputType::WitnessV0ScriptHash(to_array(program)),
        (0, _) => OutputType::NonStandard,
        (1, 32) => OutputType::WitnessV1Taproot(to_array(program)),
        (1, 2) if *program == [0x4e, 0x73] => OutputType::Anchor,
        _ => OutputType::WitnessUnknown {
            version,
            program: program.to_vec(),
        },
    };

    Some(output_type)
}

/// `m <pubkey>... n OP_CHECKMULTISIG` with `1 <= m <= n <= 16`.
fn match_multisig(ops: &[Operation<'_>]) -> Option<OutputType> {
    let [Operation::Op(m), keys @ .., Operation::Op(n), Operation::Op(checkmultisig)] = ops else {
        return None;
    };

    if *checkmultisig != Opcode::OP_CHECKMULTISIG.to_u8() {
        return None;
    }

    let small_int = |op: u8| {
        Opcode::from_u8(op)
            .and_then(Opcode::small_int)
            .filter(|v| (1..=16).contains(v))
    };
    let required = small_int(*m)?;
    let total = small_int(*n)?;

    let keys = keys
        .iter()
        .map(|op| op.data().filter(|key| is_pubkey(key)).map(<[u8]>::to_vec))
        .collect::<Option<Vec<_>>>()?;

    if keys.len() as i64 != total || required > total {
        return None;
    }

    Some(OutputType::Multisig {
        required: required as u8,
        keys,
    })
}

use crate::constants::{SIGHASH_ANYONECANPAY, SIGHASH_NONE, SIGHASH_SINGLE};
use crate::hash::sha256d;
use crate::script::strip_code_separators;
use bitcoin::consensus::encode::serialize;
use bitcoin::{Amount, ScriptBuf, Sequence, Transaction, TxOut, Witness};

/// Digest returned for an out of range input or a SIGHASH_SINGLE without a
/// matching output, the value 1 as a little endian uint256.
const SIGHASH_ONE: [u8; 32] = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

/// Computes the pre-segwit signature hash of input `input_index`.
///
/// `script_code` is the executed script from the last OP_CODESEPARATOR on,
/// with the signature already removed by FindAndDelete.
pub fn legacy_signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    hash_type: u32,
) -> [u8; 32] {
    if input_index >= tx.input.len() {
        return SIGHASH_ONE;
    }

    let base_type = (hash_type & 0x1f) as u8;
    let anyone_can_pay = hash_type & u32::from(SIGHASH_ANYONECANPAY) != 0;

    // SIGHASH_SINGLE without a corresponding output signs the constant 1.
    if base_type == SIGHASH_SINGLE && input_index >= tx.output.len() {
        return SIGHASH_ONE;
    }

    let mut copy = tx.clone();

    let script_code = ScriptBuf::from(strip_code_separators(script_code));
    for (i, input) in copy.input.iter_mut().enumerate() {
        input.witness = Witness::default();
        if i == input_index {
            input.script_sig = script_code.clone();
        } else {
            input.script_sig = ScriptBuf::new();
            if base_type == SIGHASH_NONE || base_type == SIGHASH_SINGLE {
                input.sequence = Sequence(0);
            }
        }
    }

    match base_type {
        SIGHASH_NONE => copy.output.clear(),
        SIGHASH_SINGLE => {
            copy.output.truncate(input_index + 1);
            for output in &mut copy.output[..input_index] {
                *output = TxOut {
                    value: Amount::from_sat(u64::MAX),
                    script_pubkey: ScriptBuf::new(),
                };
            }
        }
        _ => {}
    }

    if anyone_can_pay {
        copy.input = vec![copy.input.swap_remove(input_index)];
    }

    let mut data = serialize(&copy);
    data.extend(hash_type.to_le_bytes());
    sha256d(&data)
}

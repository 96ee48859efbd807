use super::SegwitV0Hashes;
use crate::constants::{SIGHASH_ANYONECANPAY, SIGHASH_NONE, SIGHASH_SINGLE};
use crate::hash::{compact_size, sha256d};
use bitcoin::consensus::encode::serialize;
use bitcoin::{Amount, Transaction};

/// Computes the BIP 143 signature hash of input `input_index`.
///
/// Returns `None` if the input does not exist.
pub fn segwit_v0_signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    amount: Amount,
    hash_type: u32,
    hashes: &SegwitV0Hashes,
) -> Option<[u8; 32]> {
    let input = tx.input.get(input_index)?;

    let base_type = (hash_type & 0x1f) as u8;
    let anyone_can_pay = hash_type & u32::from(SIGHASH_ANYONECANPAY) != 0;
    let zero = [0u8; 32];

    let hash_prevouts = if anyone_can_pay {
        zero
    } else {
        hashes.hash_prevouts
    };

    let hash_sequence =
        if anyone_can_pay || base_type == SIGHASH_SINGLE || base_type == SIGHASH_NONE {
            zero
        } else {
            hashes.hash_sequence
        };

    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        hashes.hash_outputs
    } else if base_type == SIGHASH_SINGLE && input_index < tx.output.len() {
        sha256d(&serialize(&tx.output[input_index]))
    } else {
        zero
    };

    let mut data = Vec::with_capacity(156 + script_code.len());
    data.extend(tx.version.0.to_le_bytes());
    data.extend(hash_prevouts);
    data.extend(hash_sequence);
    data.extend(serialize(&input.previous_output));
    data.extend(compact_size(script_code.len()));
    data.extend_from_slice(script_code);
    data.extend(amount.to_sat().to_le_bytes());
    data.extend(input.sequence.0.to_le_bytes());
    data.extend(hash_outputs);
    data.extend(tx.lock_time.to_consensus_u32().to_le_bytes());
    data.extend(hash_type.to_le_bytes());

    Some(sha256d(&data))
}

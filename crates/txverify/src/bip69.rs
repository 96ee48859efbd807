//! BIP 69 lexicographical ordering of transaction inputs and outputs.

use bitcoin::hashes::Hash;
use bitcoin::{Transaction, TxIn, TxOut, Witness};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Bip69Error {
    #[error("Number of inputs ({inputs}) must match witnesses ({witnesses})")]
    WitnessCountMismatch { inputs: usize, witnesses: usize },
}

/// Orders inputs by previous txid, compared in its displayed byte order,
/// then by previous output index.
pub fn compare_inputs(a: &TxIn, b: &TxIn) -> Ordering {
    let txid = |input: &TxIn| {
        let mut bytes = input.previous_output.txid.to_byte_array();
        bytes.reverse();
        bytes
    };

    txid(a)
        .cmp(&txid(b))
        .then(a.previous_output.vout.cmp(&b.previous_output.vout))
}

/// Orders outputs by amount, then by script bytes.
pub fn compare_outputs(a: &TxOut, b: &TxOut) -> Ordering {
    a.value
        .cmp(&b.value)
        .then_with(|| a.script_pubkey.as_bytes().cmp(b.script_pubkey.as_bytes()))
}

pub fn sort_inputs(inputs: &mut [TxIn]) {
    inputs.sort_by(compare_inputs);
}

pub fn sort_outputs(outputs: &mut [TxOut]) {
    outputs.sort_by(compare_outputs);
}

/// Sorts `inputs` and reorders the separately held `witnesses` along with them.
pub fn sort_inputs_and_witnesses(
    inputs: Vec<TxIn>,
    witnesses: Vec<Witness>,
) -> Result<(Vec<TxIn>, Vec<Witness>), Bip69Error> {
    if inputs.len() != witnesses.len() {
        return Err(Bip69Error::WitnessCountMismatch {
            inputs: inputs.len(),
            witnesses: witnesses.len(),
        });
    }

    let mut pairs = inputs.into_iter().zip(witnesses).collect::<Vec<_>>();
    pairs.sort_by(|(a, _), (b, _)| compare_inputs(a, b));

    Ok(pairs.into_iter().unzip())
}

/// Returns a copy of `tx` with sorted inputs and outputs.
///
/// Witnesses stay attached to their inputs, signatures over the original
/// ordering are invalidated unless they commit to neither.
pub fn mutate(tx: &Transaction) -> Transaction {
    let mut tx = tx.clone();
    sort_inputs(&mut tx.input);
    sort_outputs(&mut tx.output);
    tx
}

/// Returns `true` if both the inputs and the outputs of `tx` are sorted.
pub fn check(tx: &Transaction) -> bool {
    let inputs_sorted = tx
        .input
        .windows(2)
        .all(|pair| compare_inputs(&pair[0], &pair[1]) != Ordering::Greater);
    let outputs_sorted = tx
        .output
        .windows(2)
        .all(|pair| compare_outputs(&pair[0], &pair[1]) != Ordering::Greater);

    inputs_sorted && outputs_sorted
}

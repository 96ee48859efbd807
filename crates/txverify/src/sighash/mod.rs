//! Signature hash algorithms.
//!
//! - [`legacy_signature_hash`]: the original algorithm, used by bare and P2SH scripts.
//! - [`segwit_v0_signature_hash`]: BIP 143, used by witness v0 programs.
//! - [`taproot_signature_hash`]: BIP 341, used by key path and tapscript spends.

mod legacy;
mod segwit_v0;
mod taproot;

pub use self::legacy::legacy_signature_hash;
pub use self::segwit_v0::segwit_v0_signature_hash;
pub use self::taproot::{is_valid_taproot_hashtype, taproot_signature_hash};
pub use crate::signature::is_defined_hashtype;

use crate::hash::sha256;
use bitcoin::consensus::encode::serialize;
use bitcoin::{Transaction, TxOut};

/// Sighash computation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SighashError {
    #[error("Input index {index} out of range, transaction has {inputs} inputs")]
    InputIndexOutOfRange { index: usize, inputs: usize },
    #[error("Invalid taproot sighash type {0:#04x}")]
    InvalidHashType(u8),
    #[error("SIGHASH_SINGLE for input {0} has no corresponding output")]
    SingleWithoutOutput(usize),
    #[error("Spent output for input {0} is missing")]
    MissingSpentOutput(usize),
    #[error("Tapscript signature hash requires the tapleaf hash")]
    MissingTapleafHash,
    #[error("Taproot signature hash is not defined for {0:?}")]
    UnsupportedSigVersion(crate::SigVersion),
}

/// Single SHA256 of the prevouts, sequences and outputs of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SingleHashes {
    prevouts: [u8; 32],
    sequences: [u8; 32],
    outputs: [u8; 32],
}

impl SingleHashes {
    fn new(tx: &Transaction) -> Self {
        let mut prevouts = Vec::with_capacity(tx.input.len() * 36);
        let mut sequences = Vec::with_capacity(tx.input.len() * 4);
        for input in &tx.input {
            prevouts.extend(serialize(&input.previous_output));
            sequences.extend(input.sequence.0.to_le_bytes());
        }

        let outputs = tx.output.iter().flat_map(serialize).collect::<Vec<_>>();

        Self {
            prevouts: sha256(&prevouts),
            sequences: sha256(&sequences),
            outputs: sha256(&outputs),
        }
    }
}

/// BIP 143 `hashPrevouts`, `hashSequence` and `hashOutputs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegwitV0Hashes {
    pub hash_prevouts: [u8; 32],
    pub hash_sequence: [u8; 32],
    pub hash_outputs: [u8; 32],
}

impl SegwitV0Hashes {
    pub fn new(tx: &Transaction) -> Self {
        Self::from_single(&SingleHashes::new(tx))
    }

    fn from_single(single: &SingleHashes) -> Self {
        Self {
            hash_prevouts: sha256(&single.prevouts),
            hash_sequence: sha256(&single.sequences),
            hash_outputs: sha256(&single.outputs),
        }
    }
}

/// BIP 341 transaction-wide hashes, these commit to every spent output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaprootHashes {
    pub sha_prevouts: [u8; 32],
    pub sha_amounts: [u8; 32],
    pub sha_scriptpubkeys: [u8; 32],
    pub sha_sequences: [u8; 32],
    pub sha_outputs: [u8; 32],
}

impl TaprootHashes {
    pub fn new(tx: &Transaction, spent_outputs: &[TxOut]) -> Self {
        Self::from_single(&SingleHashes::new(tx), spent_outputs)
    }

    fn from_single(single: &SingleHashes, spent_outputs: &[TxOut]) -> Self {
        let mut amounts = Vec::with_capacity(spent_outputs.len() * 8);
        let mut scripts = Vec::new();
        for spent in spent_outputs {
            amounts.extend(spent.value.to_sat().to_le_bytes());
            scripts.extend(serialize(&spent.script_pubkey));
        }

        Self {
            sha_prevouts: single.prevouts,
            sha_amounts: sha256(&amounts),
            sha_scriptpubkeys: sha256(&scripts),
            sha_sequences: single.sequences,
            sha_outputs: single.outputs,
        }
    }
}

/// Transaction-wide sighash data, computed on first use and reused for every
/// signature checked against the same transaction.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedTransactionData {
    single: Option<SingleHashes>,
    segwit_v0: Option<SegwitV0Hashes>,
    taproot: Option<TaprootHashes>,
}

impl PrecomputedTransactionData {
    fn single(&mut self, tx: &Transaction) -> SingleHashes {
        *self.single.get_or_insert_with(|| SingleHashes::new(tx))
    }

    pub fn segwit_v0(&mut self, tx: &Transaction) -> SegwitV0Hashes {
        if let Some(hashes) = self.segwit_v0 {
            return hashes;
        }
        let hashes = SegwitV0Hashes::from_single(&self.single(tx));
        self.segwit_v0 = Some(hashes);
        hashes
    }

    pub fn taproot(&mut self, tx: &Transaction, spent_outputs: &[TxOut]) -> TaprootHashes {
        if let Some(hashes) = self.taproot {
            return hashes;
        }
        let hashes = TaprootHashes::from_single(&self.single(tx), spent_outputs);
        self.taproot = Some(hashes);
        hashes
    }
}

//! Input signing with the signature hash algorithms of [`crate::sighash`].

use crate::constants::SIGHASH_DEFAULT;
use crate::hash::{compact_size, sha256};
use crate::sighash::{
    PrecomputedTransactionData, SighashError, legacy_signature_hash, segwit_v0_signature_hash,
    taproot_signature_hash,
};
use crate::signature::{TaprootSignature, TransactionSignature};
use crate::taproot::{TaprootError, TaprootLeaf, TaprootSpendInfo};
use crate::{AnnexInfo, LOG_TARGET, ScriptExecutionData, SigVersion};
use bitcoin::secp256k1::{Keypair, Message, Secp256k1, SecretKey, Signing, Verification};
use bitcoin::{Amount, Transaction, TxOut};

/// Signing error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    #[error("Input index {index} out of range, transaction has {inputs} inputs")]
    InputIndexOutOfRange { index: usize, inputs: usize },
    #[error("Taproot signatures require the outputs spent by every input")]
    MissingSpentOutputs,
    #[error("ECDSA signatures are not defined for {0:?}")]
    UnsupportedSigVersion(SigVersion),
    #[error(transparent)]
    Sighash(#[from] SighashError),
    #[error(transparent)]
    Taproot(#[from] TaprootError),
}

/// Produces signatures for input `input_index` of `tx`.
///
/// The counterpart of [`crate::TransactionSignatureChecker`], it is bound to
/// the same data and shares its precomputed sighash midstates.
pub struct TransactionSigner<'a, C: Signing + Verification> {
    secp: &'a Secp256k1<C>,
    tx: &'a Transaction,
    input_index: usize,
    amount: Amount,
    spent_outputs: Option<&'a [TxOut]>,
    precomputed: PrecomputedTransactionData,
}

impl<'a, C: Signing + Verification> TransactionSigner<'a, C> {
    /// Creates a signer for input `input_index` spending `amount`.
    ///
    /// `spent_outputs` must hold the output spent by every input of `tx` in
    /// order to produce taproot signatures.
    pub fn with_context(
        secp: &'a Secp256k1<C>,
        tx: &'a Transaction,
        input_index: usize,
        amount: Amount,
        spent_outputs: Option<&'a [TxOut]>,
    ) -> Result<Self, SignError> {
        if input_index >= tx.input.len() {
            return Err(SignError::InputIndexOutOfRange {
                index: input_index,
                inputs: tx.input.len(),
            });
        }

        Ok(Self {
            secp,
            tx,
            input_index,
            amount,
            spent_outputs,
            precomputed: PrecomputedTransactionData::default(),
        })
    }

    /// Signs `script_code` with the legacy (`Base`) or BIP 143 (`WitnessV0`)
    /// algorithm. Signatures are deterministic (RFC 6979) and low S.
    pub fn sign_ecdsa(
        &mut self,
        secret_key: &SecretKey,
        script_code: &[u8],
        hash_type: u8,
        sig_version: SigVersion,
    ) -> Result<TransactionSignature, SignError> {
        let sighash = match sig_version {
            SigVersion::Base => legacy_signature_hash(
                self.tx,
                self.input_index,
                script_code,
                u32::from(hash_type),
            ),
            SigVersion::WitnessV0 => {
                let hashes = self.precomputed.segwit_v0(self.tx);
                segwit_v0_signature_hash(
                    self.tx,
                    self.input_index,
                    script_code,
                    self.amount,
                    u32::from(hash_type),
                    &hashes,
                )
                .ok_or(SignError::InputIndexOutOfRange {
                    index: self.input_index,
                    inputs: self.tx.input.len(),
                })?
            }
            SigVersion::Taproot | SigVersion::Tapscript => {
                return Err(SignError::UnsupportedSigVersion(sig_version));
            }
        };

        tracing::trace!(
            target: LOG_TARGET,
            "Signing input {} ({sig_version:?}, hash_type {hash_type:#04x})",
            self.input_index,
        );

        Ok(TransactionSignature {
            signature: self
                .secp
                .sign_ecdsa(&Message::from_digest(sighash), secret_key),
            hash_type,
        })
    }

    /// Signs the BIP 341 digest selected by `sig_version` and `exec_data`.
    ///
    /// `keypair` is used as is, see [`Self::sign_key_path`] for key path
    /// spends of a tweaked output.
    pub fn sign_schnorr(
        &mut self,
        keypair: &Keypair,
        hash_type: u8,
        sig_version: SigVersion,
        exec_data: &mut ScriptExecutionData,
    ) -> Result<TaprootSignature, SignError> {
        let spent_outputs = self.spent_outputs.ok_or(SignError::MissingSpentOutputs)?;
        let hashes = self.precomputed.taproot(self.tx, spent_outputs);
        let sighash = taproot_signature_hash(
            self.tx,
            self.input_index,
            spent_outputs,
            &hashes,
            hash_type,
            sig_version,
            exec_data,
        )?;

        tracing::trace!(
            target: LOG_TARGET,
            "Signing input {} ({sig_version:?}, hash_type {hash_type:#04x})",
            self.input_index,
        );

        Ok(TaprootSignature {
            signature: self
                .secp
                .sign_schnorr_no_aux_rand(&Message::from_digest(sighash), keypair),
            hash_type: (hash_type != SIGHASH_DEFAULT).then_some(hash_type),
        })
    }

    /// Key path signature for the output described by `spend_info`, `keypair`
    /// holds the untweaked internal key.
    pub fn sign_key_path(
        &mut self,
        spend_info: &TaprootSpendInfo,
        keypair: &Keypair,
        hash_type: u8,
        annex: Option<&[u8]>,
    ) -> Result<TaprootSignature, SignError> {
        let tweaked = spend_info.tweak_keypair(self.secp, keypair)?;
        let mut exec_data = ScriptExecutionData {
            annex: annex.map(annex_info),
            ..Default::default()
        };
        self.sign_schnorr(&tweaked, hash_type, SigVersion::Taproot, &mut exec_data)
    }

    /// Tapscript signature for a script path spend of `leaf` without an
    /// executed OP_CODESEPARATOR.
    pub fn sign_script_path(
        &mut self,
        keypair: &Keypair,
        leaf: &TaprootLeaf,
        hash_type: u8,
        annex: Option<&[u8]>,
    ) -> Result<TaprootSignature, SignError> {
        let mut exec_data = ScriptExecutionData {
            tapleaf_hash: Some(leaf.hash()),
            annex: annex.map(annex_info),
            ..Default::default()
        };
        self.sign_schnorr(keypair, hash_type, SigVersion::Tapscript, &mut exec_data)
    }
}

fn annex_info(annex: &[u8]) -> AnnexInfo {
    let mut data = compact_size(annex.len());
    data.extend_from_slice(annex);
    AnnexInfo { hash: sha256(&data) }
}

use crate::constants::{
    LOCKTIME_THRESHOLD, SEQUENCE_FINAL, SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_MASK,
    SEQUENCE_LOCKTIME_TYPE_FLAG, SIGHASH_DEFAULT,
};
use crate::error::Error;
use crate::num::ScriptNum;
use crate::sighash::{
    PrecomputedTransactionData, legacy_signature_hash, segwit_v0_signature_hash,
    taproot_signature_hash,
};
use crate::{LOG_TARGET, ScriptExecutionData, SigVersion};
use bitcoin::secp256k1::{
    Message, Parity, PublicKey, Scalar, Secp256k1, Verification, ecdsa, schnorr,
};
use bitcoin::{Amount, Transaction, TxOut, XOnlyPublicKey};

/// Checks transaction signatures and lock times on behalf of the interpreter.
pub trait SignatureChecker {
    /// Verifies a `DER || hash_type` signature against `pubkey`.
    ///
    /// Returns `false` for unparsable keys and signatures, the encoding rules
    /// selected by the verify flags are enforced by the interpreter beforehand.
    fn check_ecdsa_signature(
        &mut self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> bool;

    /// Verifies a BIP 340 signature against a 32-byte x-only `pubkey`.
    fn check_schnorr_signature(
        &mut self,
        sig: &[u8],
        pubkey: &[u8],
        sig_version: SigVersion,
        exec_data: &mut ScriptExecutionData,
    ) -> Result<(), Error>;

    /// BIP 65 check of the spending transaction's lock time.
    fn check_lock_time(&self, lock_time: ScriptNum) -> bool;

    /// BIP 112 check of the spending input's relative lock time.
    fn check_sequence(&self, sequence: ScriptNum) -> bool;

    /// BIP 341 check that `output_key` is `internal_key` tweaked by `tweak`
    /// with the given parity.
    fn check_taproot_commitment(
        &self,
        internal_key: &XOnlyPublicKey,
        output_key: &XOnlyPublicKey,
        parity: Parity,
        tweak: Scalar,
    ) -> bool;
}

/// Checker accepting every signature, lock time and taproot commitment.
///
/// Used to evaluate scripts without a spending transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignatureCheck;

impl SignatureChecker for NoSignatureCheck {
    fn check_ecdsa_signature(
        &mut self,
        _sig: &[u8],
        _pubkey: &[u8],
        _script_code: &[u8],
        _sig_version: SigVersion,
    ) -> bool {
        true
    }

    fn check_schnorr_signature(
        &mut self,
        _sig: &[u8],
        _pubkey: &[u8],
        _sig_version: SigVersion,
        _exec_data: &mut ScriptExecutionData,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn check_lock_time(&self, _lock_time: ScriptNum) -> bool {
        true
    }

    fn check_sequence(&self, _sequence: ScriptNum) -> bool {
        true
    }

    fn check_taproot_commitment(
        &self,
        _internal_key: &XOnlyPublicKey,
        _output_key: &XOnlyPublicKey,
        _parity: Parity,
        _tweak: Scalar,
    ) -> bool {
        true
    }
}

/// Checks signatures against input `input_index` of `tx`.
pub struct TransactionSignatureChecker<'a, C: Verification> {
    secp: &'a Secp256k1<C>,
    tx: &'a Transaction,
    input_index: usize,
    amount: Amount,
    spent_outputs: Option<&'a [TxOut]>,
    precomputed: PrecomputedTransactionData,
}

impl<'a, C: Verification> TransactionSignatureChecker<'a, C> {
    /// Creates a checker for input `input_index` spending `amount`.
    ///
    /// `spent_outputs` must hold the output spent by every input of `tx` in
    /// order, taproot signatures can not be verified without it.
    pub fn with_context(
        secp: &'a Secp256k1<C>,
        tx: &'a Transaction,
        input_index: usize,
        amount: Amount,
        spent_outputs: Option<&'a [TxOut]>,
    ) -> Self {
        Self {
            secp,
            tx,
            input_index,
            amount,
            spent_outputs,
            precomputed: PrecomputedTransactionData::default(),
        }
    }

    pub fn secp(&self) -> &'a Secp256k1<C> {
        self.secp
    }

    pub fn tx(&self) -> &'a Transaction {
        self.tx
    }

    pub fn input_index(&self) -> usize {
        self.input_index
    }

    fn ecdsa_sighash(
        &mut self,
        script_code: &[u8],
        hash_type: u32,
        sig_version: SigVersion,
    ) -> Option<[u8; 32]> {
        match sig_version {
            SigVersion::Base => Some(legacy_signature_hash(
                self.tx,
                self.input_index,
                script_code,
                hash_type,
            )),
            SigVersion::WitnessV0 => {
                let hashes = self.precomputed.segwit_v0(self.tx);
                segwit_v0_signature_hash(
                    self.tx,
                    self.input_index,
                    script_code,
                    self.amount,
                    hash_type,
                    &hashes,
                )
            }
            SigVersion::Taproot | SigVersion::Tapscript => None,
        }
    }
}

impl<C: Verification> SignatureChecker for TransactionSignatureChecker<'_, C> {
    fn check_ecdsa_signature(
        &mut self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> bool {
        let Ok(pubkey) = PublicKey::from_slice(pubkey) else {
            return false;
        };

        // Hash type is one byte tacked on to the end of the signature
        let Some((&hash_type, der)) = sig.split_last() else {
            return false;
        };

        let Some(sighash) = self.ecdsa_sighash(script_code, u32::from(hash_type), sig_version)
        else {
            return false;
        };

        let Ok(mut signature) = ecdsa::Signature::from_der_lax(der) else {
            return false;
        };
        // libsecp256k1 only accepts low S signatures, the LOW_S rule is
        // enforced by the interpreter.
        signature.normalize_s();

        let msg = Message::from_digest(sighash);
        let valid = self.secp.verify_ecdsa(&msg, &signature, &pubkey).is_ok();

        tracing::trace!(
            target: LOG_TARGET,
            "ECDSA check on input {} ({sig_version:?}, hash_type {hash_type:#04x}): {valid}",
            self.input_index,
        );

        valid
    }

    fn check_schnorr_signature(
        &mut self,
        sig: &[u8],
        pubkey: &[u8],
        sig_version: SigVersion,
        exec_data: &mut ScriptExecutionData,
    ) -> Result<(), Error> {
        // Schnorr signatures have 32-byte public keys. The caller is responsible for enforcing this.
        debug_assert_eq!(pubkey.len(), 32);

        let (sig, hash_type) = match sig.len() {
            64 => (sig, SIGHASH_DEFAULT),
            65 => {
                let hash_type = sig[64];
                if hash_type == SIGHASH_DEFAULT {
                    return Err(Error::SchnorrSigHashType);
                }
                (&sig[..64], hash_type)
            }
            _ => return Err(Error::SchnorrSigSize),
        };

        let spent_outputs = self.spent_outputs.ok_or(Error::SchnorrSigHashType)?;
        let hashes = self.precomputed.taproot(self.tx, spent_outputs);
        let sighash = taproot_signature_hash(
            self.tx,
            self.input_index,
            spent_outputs,
            &hashes,
            hash_type,
            sig_version,
            exec_data,
        )
        .map_err(|err| {
            tracing::debug!(target: LOG_TARGET, "Taproot sighash failed: {err}");
            Error::SchnorrSigHashType
        })?;

        let signature = schnorr::Signature::from_slice(sig).map_err(|_| Error::SchnorrSig)?;
        let pubkey = XOnlyPublicKey::from_slice(pubkey).map_err(|_| Error::SchnorrSig)?;
        let msg = Message::from_digest(sighash);

        let valid = self.secp.verify_schnorr(&signature, &msg, &pubkey).is_ok();

        tracing::trace!(
            target: LOG_TARGET,
            "Schnorr check on input {} ({sig_version:?}, hash_type {hash_type:#04x}): {valid}",
            self.input_index,
        );

        if valid {
            Ok(())
        } else {
            Err(Error::SchnorrSig)
        }
    }

    fn check_lock_time(&self, lock_time: ScriptNum) -> bool {
        let lock_time = lock_time.value();
        let tx_lock_time = i64::from(self.tx.lock_time.to_consensus_u32());

        // There are two kinds of nLockTime: lock-by-blockheight
        // and lock-by-blocktime, distinguished by whether
        // nLockTime < LOCKTIME_THRESHOLD.
        //
        // We want to compare apples to apples, so fail the script
        // unless the type of nLockTime being tested is the same as
        // the nLockTime in the transaction.
        if !((tx_lock_time < LOCKTIME_THRESHOLD && lock_time < LOCKTIME_THRESHOLD)
            || (tx_lock_time >= LOCKTIME_THRESHOLD && lock_time >= LOCKTIME_THRESHOLD))
        {
            return false;
        }

        // Now that we know we're comparing apples-to-apples, the
        // comparison is a simple numeric one.
        if lock_time > tx_lock_time {
            return false;
        }

        // Finally the nLockTime feature can be disabled in IsFinalTx()
        // and thus CHECKLOCKTIMEVERIFY bypassed if every txin has
        // been finalized by setting nSequence to maxint. The
        // transaction would be allowed into the blockchain, making
        // the opcode ineffective.
        //
        // Testing if this vin is not final is sufficient to
        // prevent this condition. Alternatively we could test all
        // inputs, but testing just this input minimizes the data
        // required to prove correct CHECKLOCKTIMEVERIFY execution.
        self.tx
            .input
            .get(self.input_index)
            .is_some_and(|input| input.sequence.0 != SEQUENCE_FINAL)
    }

    fn check_sequence(&self, sequence: ScriptNum) -> bool {
        let Some(input) = self.tx.input.get(self.input_index) else {
            return false;
        };

        // Relative lock times are supported by comparing the passed
        // in operand to the sequence number of the input.
        let to_sequence = sequence.value();
        let tx_to_sequence = i64::from(input.sequence.0);

        // Fail if the transaction's version number is not set high
        // enough to trigger BIP 68 rules.
        if (self.tx.version.0 as u32) < 2 {
            return false;
        }

        // Sequence numbers with their most significant bit set are not
        // consensus constrained. Testing that the transaction's sequence
        // number do not have this bit set prevents using this property
        // to get around a CHECKSEQUENCEVERIFY check.
        if tx_to_sequence & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG) != 0 {
            return false;
        }

        // Mask off any bits that do not have consensus-enforced meaning
        // before doing the integer comparisons
        let lock_time_mask = i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK);
        let tx_to_sequence_masked = tx_to_sequence & lock_time_mask;
        let to_sequence_masked = to_sequence & lock_time_mask;

        // There are two kinds of nSequence: lock-by-blockheight
        // and lock-by-blocktime, distinguished by whether
        // nSequenceMasked < CTxIn::SEQUENCE_LOCKTIME_TYPE_FLAG.
        //
        // We want to compare apples to apples, so fail the script
        // unless the type of nSequenceMasked being tested is the same as
        // the nSequenceMasked in the transaction.
        let type_flag = i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG);
        if !((tx_to_sequence_masked < type_flag && to_sequence_masked < type_flag)
            || (tx_to_sequence_masked >= type_flag && to_sequence_masked >= type_flag))
        {
            return false;
        }

        // Now that we know we're comparing apples-to-apples, the
        // comparison is a simple numeric one.
        to_sequence_masked <= tx_to_sequence_masked
    }

    fn check_taproot_commitment(
        &self,
        internal_key: &XOnlyPublicKey,
        output_key: &XOnlyPublicKey,
        parity: Parity,
        tweak: Scalar,
    ) -> bool {
        internal_key.tweak_add_check(self.secp, output_key, parity, tweak)
    }
}

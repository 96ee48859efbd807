//! Input verification entry points.
//!
//! Every function here checks that input `input_index` of a transaction is
//! allowed to spend its previous output. Caller mistakes are reported as
//! [`ConsensusError`] before any script runs, a spend rejected by the scripts
//! is a [`Verdict::Invalid`] (or `Ok(false)`) carrying the reason.

use crate::error::{ConsensusError, Error};
use crate::script::OutputType;
use crate::script::witness_program;
use crate::signature_checker::TransactionSignatureChecker;
use crate::{LOG_TARGET, VerifyFlags, verify_script};
use bitcoin::consensus::encode::deserialize_partial;
use bitcoin::secp256k1::{Secp256k1, Verification};
use bitcoin::{Amount, OutPoint, Script, Transaction, TxOut};

/// Output being spent together with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub output: TxOut,
}

/// Outcome of verifying a single input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    /// The scripts rejected the spend.
    Invalid(Error),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl From<Result<(), Error>> for Verdict {
    fn from(result: Result<(), Error>) -> Self {
        match result {
            Ok(()) => Self::Valid,
            Err(err) => Self::Invalid(err),
        }
    }
}

/// Returns whether input `input_index` of `tx` may spend an output locked by
/// `prevout_script` holding `prevout_amount`.
pub fn verify(
    tx: &Transaction,
    input_index: usize,
    prevout_script: &Script,
    prevout_amount: Amount,
    flags: VerifyFlags,
) -> Result<bool, ConsensusError> {
    verify_with_reason(tx, input_index, prevout_script, prevout_amount, flags)
        .map(|verdict| verdict.is_valid())
}

/// Same as [`verify`] but reports why the scripts rejected the spend.
///
/// Taproot spends of a transaction with more than one input need the outputs
/// spent by every input, use [`verify_with_spent_outputs`] for them.
pub fn verify_with_reason(
    tx: &Transaction,
    input_index: usize,
    prevout_script: &Script,
    prevout_amount: Amount,
    flags: VerifyFlags,
) -> Result<Verdict, ConsensusError> {
    let secp = Secp256k1::verification_only();
    verify_with_context(&secp, tx, input_index, prevout_script, prevout_amount, flags)
}

/// Same as [`verify_with_reason`] with a caller provided secp256k1 context,
/// which can be shared by every input of a block.
pub fn verify_with_context<C: Verification>(
    secp: &Secp256k1<C>,
    tx: &Transaction,
    input_index: usize,
    prevout_script: &Script,
    prevout_amount: Amount,
    flags: VerifyFlags,
) -> Result<Verdict, ConsensusError> {
    let prevout = TxOut {
        value: prevout_amount,
        script_pubkey: prevout_script.to_owned(),
    };
    verify_input(secp, tx, input_index, &prevout, None, flags)
}

/// Verifies input `input_index` given the outputs spent by all inputs of `tx`, in order.
pub fn verify_with_spent_outputs(
    tx: &Transaction,
    input_index: usize,
    spent_outputs: &[TxOut],
    flags: VerifyFlags,
) -> Result<Verdict, ConsensusError> {
    let secp = Secp256k1::verification_only();
    verify_with_spent_outputs_with_context(&secp, tx, input_index, spent_outputs, flags)
}

/// Same as [`verify_with_spent_outputs`] with a caller provided secp256k1 context.
pub fn verify_with_spent_outputs_with_context<C: Verification>(
    secp: &Secp256k1<C>,
    tx: &Transaction,
    input_index: usize,
    spent_outputs: &[TxOut],
    flags: VerifyFlags,
) -> Result<Verdict, ConsensusError> {
    check_input_index(tx, input_index)?;

    if spent_outputs.len() != tx.input.len() {
        return Err(ConsensusError::SpentOutputsMismatch {
            expected: tx.input.len(),
            got: spent_outputs.len(),
        });
    }

    verify_input(
        secp,
        tx,
        input_index,
        &spent_outputs[input_index],
        Some(spent_outputs),
        flags,
    )
}

/// Verifies input `input_index` spending `utxo`.
///
/// The outpoint of `utxo` must be the one referenced by the input.
pub fn verify_utxo(
    tx: &Transaction,
    input_index: usize,
    utxo: &Utxo,
    flags: VerifyFlags,
) -> Result<Verdict, ConsensusError> {
    check_input_index(tx, input_index)?;

    if tx.input[input_index].previous_output != utxo.outpoint {
        return Err(ConsensusError::SpentOutputMismatch(input_index));
    }

    let secp = Secp256k1::verification_only();
    verify_input(&secp, tx, input_index, &utxo.output, None, flags)
}

/// Same as [`verify`] for a consensus encoded transaction.
pub fn verify_raw(
    tx_bytes: &[u8],
    input_index: usize,
    prevout_script: &Script,
    prevout_amount: Amount,
    flags: VerifyFlags,
) -> Result<bool, ConsensusError> {
    let (tx, consumed) = deserialize_partial::<Transaction>(tx_bytes)
        .map_err(|err| ConsensusError::TxDeserialize(err.to_string()))?;

    if consumed != tx_bytes.len() {
        return Err(ConsensusError::TrailingData(tx_bytes.len() - consumed));
    }

    verify(&tx, input_index, prevout_script, prevout_amount, flags)
}

fn check_input_index(tx: &Transaction, input_index: usize) -> Result<(), ConsensusError> {
    if input_index >= tx.input.len() {
        return Err(ConsensusError::InputIndexOutOfRange {
            index: input_index,
            inputs: tx.input.len(),
        });
    }
    Ok(())
}

fn verify_input<C: Verification>(
    secp: &Secp256k1<C>,
    tx: &Transaction,
    input_index: usize,
    prevout: &TxOut,
    spent_outputs: Option<&[TxOut]>,
    flags: VerifyFlags,
) -> Result<Verdict, ConsensusError> {
    check_input_index(tx, input_index)?;
    flags.validate()?;

    if let Some(spent_outputs) = spent_outputs {
        if spent_outputs.get(input_index) != Some(prevout) {
            return Err(ConsensusError::SpentOutputMismatch(input_index));
        }
    }

    // The given prevout is the whole spent output set of a single input transaction.
    let spent_outputs = spent_outputs.or_else(|| {
        (tx.input.len() == 1).then_some(std::slice::from_ref(prevout))
    });

    let script_pubkey = prevout.script_pubkey.as_script();

    let is_taproot_spend = matches!(
        witness_program(script_pubkey.as_bytes()),
        Some((1, program)) if program.len() == 32
    );
    // Taproot programs are only executed as part of witness verification.
    if flags.verify_witness()
        && flags.verify_taproot()
        && is_taproot_spend
        && spent_outputs.is_none()
    {
        return Err(ConsensusError::MissingSpentOutputs);
    }

    let input = &tx.input[input_index];

    tracing::debug!(
        target: LOG_TARGET,
        "Verifying input {input_index} of {} spending {} output, flags: {flags}",
        tx.compute_txid(),
        OutputType::classify(script_pubkey.as_bytes()).name(),
    );

    let mut checker = TransactionSignatureChecker::with_context(
        secp,
        tx,
        input_index,
        prevout.value,
        spent_outputs,
    );

    let verdict = Verdict::from(verify_script(
        &input.script_sig,
        script_pubkey,
        &input.witness,
        &flags,
        &mut checker,
    ));

    match &verdict {
        Verdict::Valid => {
            tracing::debug!(target: LOG_TARGET, "Input {input_index} is valid");
        }
        Verdict::Invalid(err) => {
            tracing::debug!(target: LOG_TARGET, "Input {input_index} is invalid: {err}");
        }
    }

    Ok(verdict)
}

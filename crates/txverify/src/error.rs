use crate::constants::{MAX_OPS_PER_SCRIPT, MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE, MAX_STACK_SIZE};
use crate::flags::FlagsError;
use crate::num::NumError;
use crate::script::{Opcode, ParseError};
use crate::signature::SignatureEncodingError;
use crate::stack::StackError;

/// Script error type.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    ///////////////////////////
    // Script error.
    ///////////////////////////
    /// The script evaluated without error but terminated with an empty or
    /// false top stack element.
    #[error("script terminated with a false stack element")]
    EvalFalse,
    #[error("OP_RETURN was executed")]
    OpReturn,

    // Max sizes.
    #[error("Exceeds max script size ({MAX_SCRIPT_SIZE})")]
    ScriptSize,
    #[error("Size of the element pushed to the stack exceeds MAX_SCRIPT_ELEMENT_SIZE ({MAX_SCRIPT_ELEMENT_SIZE})")]
    PushSize,
    #[error("Exceeds max operations ({MAX_OPS_PER_SCRIPT}) per script")]
    OpCount,
    // Stack and altstack combined depth is over the limit.
    #[error("Exceeds stack limit ({MAX_STACK_SIZE})")]
    StackSize,
    #[error("Invalid number of signatures for multisig")]
    SigCount,
    #[error("Invalid number of public keys for multisig")]
    PubkeyCount,

    // Failed verify operations.
    #[error("{0} failed")]
    Verify(Opcode),

    // Logical/Format/Canonical errors.
    #[error("bad opcode")]
    BadOpcode,
    #[error("attempt to execute disabled opcode {0}")]
    DisabledOpcode(Opcode),
    #[error("invalid stack operation")]
    InvalidStackOperation,
    #[error("invalid alt stack operation")]
    InvalidAltStackOperation,
    // OP_ELSE or OP_ENDIF without a matching OP_IF/OP_NOTIF, or an OP_IF
    // left open at the end of the script.
    #[error("unbalanced conditional")]
    UnbalancedConditional,

    // CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY
    #[error("Locktime is negative")]
    NegativeLocktime,
    #[error("Required lock time has not been reached")]
    UnsatisfiedLocktime,

    // Malleability
    #[error("Signature hash type is undefined")]
    SigHashType,
    #[error("Non-canonical DER signature: {0}")]
    SigDer(SignatureEncodingError),
    #[error("Push is not minimally encoded")]
    MinimalData,
    #[error("Only push operators allowed in signatures")]
    SigPushOnly,
    #[error("Signature S value is unnecessarily high")]
    SigHighS,
    #[error("Dummy CHECKMULTISIG argument must be zero")]
    SigNullDummy,
    #[error("Public key is neither compressed or uncompressed")]
    PubkeyType,
    #[error("Stack size must be exactly one after execution")]
    CleanStack,
    #[error("OP_IF/NOTIF argument must be minimal")]
    Minimalif,
    #[error("Signature must be zero for failed CHECK(MULTI)SIG operation")]
    NullFail,

    // Softfork safeness.
    #[error("NOP opcode encountered when DISCOURAGE_UPGRADABLE_NOPS flag is set")]
    DiscourageUpgradableNops,
    #[error("Witness version reserved for soft-fork upgrades")]
    DiscourageUpgradableWitnessProgram,
    #[error("Taproot version reserved for soft-fork upgrades")]
    DiscourageUpgradableTaprootVersion,
    #[error("OP_SUCCESSx reserved for soft-fork upgrades")]
    DiscourageOpSuccess,
    #[error("Public key version reserved for soft-fork upgrades")]
    DiscourageUpgradablePubkeyType,

    // Segregated witness
    #[error("Witness program has incorrect length")]
    WitnessProgramWrongLength,
    #[error("Witness program was passed an empty witness")]
    WitnessProgramWitnessEmpty,
    #[error("Witness program hash mismatch")]
    WitnessProgramMismatch,
    #[error("Witness requires empty scriptSig")]
    WitnessMalleated,
    #[error("Witness requires only-redeemscript scriptSig")]
    WitnessMalleatedP2SH,
    #[error("Witness provided for non-witness script")]
    WitnessUnexpected,
    #[error("Using non-compressed keys in segwit")]
    WitnessPubkeyType,
    #[error("P2SH redeem script hash mismatch")]
    P2shHashMismatch,

    // Taproot
    #[error("Invalid Schnorr signature size")]
    SchnorrSigSize,
    #[error("Invalid Schnorr signature hash type")]
    SchnorrSigHashType,
    #[error("Invalid Schnorr signature")]
    SchnorrSig,
    #[error("Invalid Taproot control block size")]
    TaprootWrongControlSize,
    #[error("Too much signature validation relative to witness weight")]
    TaprootValidationWeight,
    #[error("OP_CHECKMULTISIG(VERIFY) is not available in tapscript")]
    TaprootCheckmultisig,
    #[error("OP_IF/NOTIF argument must be minimal in tapscript")]
    TaprootMinimalif,
    #[error("Empty public key in tapscript")]
    TaprootEmptyPubkey,

    // Constant scriptCode
    #[error("Using OP_CODESEPARATOR in non-witness script")]
    OpCodeSeparator,
    #[error("Signature is found in scriptCode")]
    SigFindAndDelete,

    // Extended errors.
    #[error("Taproot key path spends have no script to execute")]
    NoScriptExecution,
    #[error("Failed to read instruction: {0}")]
    ReadInstruction(ParseError),
    #[error(transparent)]
    Num(#[from] NumError),
}

impl From<StackError> for Error {
    fn from(err: StackError) -> Self {
        match err {
            StackError::InvalidOperation => Self::InvalidStackOperation,
            StackError::Num(err) => Self::Num(err),
        }
    }
}

impl From<SignatureEncodingError> for Error {
    fn from(err: SignatureEncodingError) -> Self {
        Self::SigDer(err)
    }
}

/// Caller mistakes detected before any script runs.
///
/// These never describe the validity of a spend, a script that fails
/// evaluation is reported as [`Error`] instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("Input index {index} out of range, transaction has {inputs} inputs")]
    InputIndexOutOfRange { index: usize, inputs: usize },
    #[error(transparent)]
    InvalidFlags(#[from] FlagsError),
    #[error("Expected {expected} spent outputs, got {got}")]
    SpentOutputsMismatch { expected: usize, got: usize },
    #[error("Spent output at input {0} differs from the given prevout")]
    SpentOutputMismatch(usize),
    #[error("Taproot verification requires every spent output")]
    MissingSpentOutputs,
    #[error("Failed to deserialize transaction: {0}")]
    TxDeserialize(String),
    #[error("Transaction has {0} trailing bytes")]
    TrailingData(usize),
}

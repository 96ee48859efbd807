//! Bitcoin script interpreter and transaction signature verification.
//!
//! The entry points are [`verify`] and friends in [`consensus`], which check
//! that a transaction input is allowed to spend a given output under a set of
//! [`VerifyFlags`]. The building blocks ([`eval_script`], [`verify_script`],
//! the sighash engine and the signature codecs) are public as well.

pub mod bip69;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod flags;
pub mod hash;
pub mod interpreter;
pub mod num;
pub mod script;
pub mod sighash;
pub mod signature;
pub mod signature_checker;
pub mod signer;
pub mod stack;
pub mod taproot;


const LOG_TARGET: &str = "txverify";

pub use self::consensus::{
    Utxo, Verdict, verify, verify_raw, verify_utxo, verify_with_context, verify_with_reason,
    verify_with_spent_outputs, verify_with_spent_outputs_with_context,
};
pub use self::error::{ConsensusError, Error};
pub use self::flags::{FlagsError, VerifyFlags};
pub use self::interpreter::{eval_script, verify_script};
pub use self::num::ScriptNum;
pub use self::signature::{CompactSignature, TaprootSignature, TransactionSignature};
pub use self::signature_checker::{
    NoSignatureCheck, SignatureChecker, TransactionSignatureChecker,
};
pub use self::signer::{SignError, TransactionSigner};
pub use self::stack::Stack;
pub use self::taproot::{TapTree, TaprootLeaf, TaprootSpendInfo};

/// Represents different signature verification schemes used in Bitcoin
///
/// https://github.com/bitcoin/bitcoin/blob/6f9db1ebcab4064065ccd787161bf2b87e03cc1f/src/script/interpreter.h#L190
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigVersion {
    /// Bare scripts and BIP16 P2SH-wrapped redeemscripts
    Base,
    /// Witness v0 (P2WPKH and P2WSH); see BIP 141
    WitnessV0,
    /// Witness v1 with 32-byte program, not BIP16 P2SH-wrapped, key path spending; see BIP 341
    Taproot,
    /// Witness v1 with 32-byte program, not BIP16 P2SH-wrapped, script path spending,
    /// leaf version 0xc0; see BIP 342
    Tapscript,
}

/// Annex carried by a taproot witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnexInfo {
    /// SHA256 of the compact size prefixed annex, committed to by the sighash.
    pub hash: [u8; 32],
}

/// State shared between the witness program dispatcher, the interpreter and
/// the signature checker while a single input is verified.
///
/// https://github.com/bitcoin/bitcoin/blob/6f9db1ebcab4064065ccd787161bf2b87e03cc1f/src/script/interpreter.h#L198
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptExecutionData {
    /// The tapleaf hash, set for script path spends.
    pub tapleaf_hash: Option<[u8; 32]>,
    /// Opcode position of the last executed OP_CODESEPARATOR (or 0xFFFFFFFF if none executed)
    pub codeseparator_pos: u32,
    /// The annex, if the witness has one.
    pub annex: Option<AnnexInfo>,
    /// How much validation weight is left (decremented for every successful non-empty signature check)
    pub validation_weight_left: Option<i64>,
    /// The hash of the corresponding output, memoized for SIGHASH_SINGLE.
    pub output_hash: Option<[u8; 32]>,
}

impl Default for ScriptExecutionData {
    fn default() -> Self {
        Self {
            tapleaf_hash: None,
            codeseparator_pos: u32::MAX,
            annex: None,
            validation_weight_left: None,
            output_hash: None,
        }
    }
}

//! Signature and public key encoding rules enforced by the script flags.

use crate::constants::{
    COMPRESSED_PUBKEY_SIZE, CURVE_ORDER, HALF_CURVE_ORDER, SIGHASH_ALL, SIGHASH_ANYONECANPAY,
    SIGHASH_SINGLE,
};
use crate::error::Error;
use crate::{SigVersion, VerifyFlags};
use num_bigint::BigUint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureEncodingError {
    #[error("DER encoded signature is too short")]
    TooShort,
    #[error("DER encoded signature is too long")]
    TooLong,
    #[error("signature does not have the expected ASN.1 sequence ID")]
    InvalidSequenceId,
    #[error("signature length")]
    InvalidDataLength,
    #[error("R integer marker")]
    InvalidIntegerIdR,
    #[error("R length is zero")]
    ZeroLengthR,
    #[error("R is negative")]
    NegativeR,
    #[error("R value has too much padding")]
    TooMuchPaddingR,
    #[error("S integer marker")]
    InvalidIntegerIdS,
    #[error("S length is zero")]
    ZeroLengthS,
    #[error("S is negative")]
    NegativeS,
    #[error("S value has too much padding")]
    TooMuchPaddingS,
}

/// Location of the R and S integers inside a strictly encoded signature.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DerLayout {
    pub r_offset: usize,
    pub r_len: usize,
    pub s_offset: usize,
    pub s_len: usize,
}

/// Checks the BIP66 strict DER encoding of `sig`, including the trailing
/// hash type byte.
///
/// Format: 0x30 [total-length] 0x02 [R-length] [R] 0x02 [S-length] [S] [sighash]
///
/// https://github.com/bitcoin/bips/blob/master/bip-0066.mediawiki#der-encoding-reference
pub fn is_valid_signature_encoding(sig: &[u8]) -> Result<(), SignatureEncodingError> {
    der_layout(sig).map(|_| ())
}

pub(crate) fn der_layout(sig: &[u8]) -> Result<DerLayout, SignatureEncodingError> {
    // Minimum and maximum size constraints
    if sig.len() < 9 {
        return Err(SignatureEncodingError::TooShort);
    }

    if sig.len() > 73 {
        return Err(SignatureEncodingError::TooLong);
    }

    // A signature is of type 0x30 (compound)
    if sig[0] != 0x30 {
        return Err(SignatureEncodingError::InvalidSequenceId);
    }

    // Make sure the length covers the entire signature
    if sig[1] as usize != sig.len() - 3 {
        return Err(SignatureEncodingError::InvalidDataLength);
    }

    let len_r = sig[3] as usize;

    // Make sure the length of the S element is still inside the signature
    if 5 + len_r >= sig.len() {
        return Err(SignatureEncodingError::InvalidDataLength);
    }

    let len_s = sig[5 + len_r] as usize;

    // Verify that the length of the signature matches the sum of the length of the elements
    if len_r + len_s + 7 != sig.len() {
        return Err(SignatureEncodingError::InvalidDataLength);
    }

    if sig[2] != 0x02 {
        return Err(SignatureEncodingError::InvalidIntegerIdR);
    }

    if len_r == 0 {
        return Err(SignatureEncodingError::ZeroLengthR);
    }

    if sig[4] & 0x80 != 0 {
        return Err(SignatureEncodingError::NegativeR);
    }

    // Null bytes at the start of R are not allowed, unless R would otherwise be interpreted as a negative number
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return Err(SignatureEncodingError::TooMuchPaddingR);
    }

    if sig[len_r + 4] != 0x02 {
        return Err(SignatureEncodingError::InvalidIntegerIdS);
    }

    if len_s == 0 {
        return Err(SignatureEncodingError::ZeroLengthS);
    }

    if sig[len_r + 6] & 0x80 != 0 {
        return Err(SignatureEncodingError::NegativeS);
    }

    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return Err(SignatureEncodingError::TooMuchPaddingS);
    }

    Ok(DerLayout {
        r_offset: 4,
        r_len: len_r,
        s_offset: len_r + 6,
        s_len: len_s,
    })
}

/// Returns `true` if the strictly encoded `sig` has an S value above half the
/// curve order.
///
/// Signatures libsecp256k1 would reject anyway (R or S not below the order)
/// are not reported as high-S.
pub fn is_high_s(sig: &[u8]) -> Result<bool, SignatureEncodingError> {
    let layout = der_layout(sig)?;

    let r = BigUint::from_bytes_be(&sig[layout.r_offset..layout.r_offset + layout.r_len]);
    let s = BigUint::from_bytes_be(&sig[layout.s_offset..layout.s_offset + layout.s_len]);

    // When S is higher than half the order, its complement modulo the order
    // is a valid signature too, which makes S a source of malleability.
    Ok(r < *CURVE_ORDER && s > *HALF_CURVE_ORDER && s < *CURVE_ORDER)
}

/// Whether the last byte of `sig` is SIGHASH_ALL, SIGHASH_NONE or
/// SIGHASH_SINGLE, optionally combined with SIGHASH_ANYONECANPAY.
pub fn is_defined_hashtype_signature(sig: &[u8]) -> bool {
    let Some(&hash_type) = sig.last() else {
        return false;
    };

    is_defined_hashtype(hash_type)
}

pub fn is_defined_hashtype(hash_type: u8) -> bool {
    let base_type = hash_type & !SIGHASH_ANYONECANPAY;
    (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base_type)
}

/// Checks `sig` against the DERSIG, LOW_S and STRICTENC rules.
pub fn check_signature_encoding(sig: &[u8], flags: &VerifyFlags) -> Result<(), Error> {
    // Empty signature. Not strictly DER encoded, but allowed to provide a
    // compact way to provide an invalid signature for use with CHECK(MULTI)SIG
    if sig.is_empty() {
        return Ok(());
    }

    if flags.intersects(VerifyFlags::DERSIG | VerifyFlags::LOW_S | VerifyFlags::STRICTENC) {
        is_valid_signature_encoding(sig)?;
    }

    if flags.contains(VerifyFlags::LOW_S) && is_high_s(sig)? {
        return Err(Error::SigHighS);
    }

    if flags.contains(VerifyFlags::STRICTENC) && !is_defined_hashtype_signature(sig) {
        return Err(Error::SigHashType);
    }

    Ok(())
}

/// Checks whether or not the passed public key adheres to the strict
/// encoding requirements if enabled.
pub fn check_pubkey_encoding(
    pubkey: &[u8],
    flags: &VerifyFlags,
    sig_version: SigVersion,
) -> Result<(), Error> {
    if flags.contains(VerifyFlags::STRICTENC) && !is_public_key(pubkey) {
        return Err(Error::PubkeyType);
    }

    // Only compressed keys are accepted in segwit
    if flags.contains(VerifyFlags::WITNESS_PUBKEYTYPE)
        && sig_version == SigVersion::WitnessV0
        && !is_compressed_pubkey(pubkey)
    {
        return Err(Error::WitnessPubkeyType);
    }

    Ok(())
}

/// Compressed or uncompressed SEC1 public key, hybrid keys are rejected.
pub fn is_public_key(v: &[u8]) -> bool {
    match v.len() {
        33 => matches!(v[0], 0x02 | 0x03),
        65 => v[0] == 0x04,
        _ => false,
    }
}

pub fn is_compressed_pubkey(pubkey: &[u8]) -> bool {
    pubkey.len() == COMPRESSED_PUBKEY_SIZE && matches!(pubkey[0], 0x02 | 0x03)
}

//! Transaction signature codecs.

pub mod encoding;

pub use self::encoding::{
    SignatureEncodingError, check_pubkey_encoding, check_signature_encoding, is_compressed_pubkey,
    is_defined_hashtype, is_defined_hashtype_signature, is_high_s, is_public_key,
    is_valid_signature_encoding,
};

use crate::constants::SIGHASH_DEFAULT;
use bitcoin::secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use bitcoin::secp256k1::{Message, Secp256k1, Verification, ecdsa, schnorr};

/// Signature decoding error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("empty signature")]
    Empty,
    #[error(transparent)]
    Encoding(#[from] SignatureEncodingError),
    #[error("invalid signature length {0}")]
    InvalidLength(usize),
    #[error("explicit SIGHASH_DEFAULT in a 65-byte schnorr signature")]
    ExplicitDefaultHashType,
    #[error("invalid compact signature header {0:#04x}")]
    InvalidCompactHeader(u8),
    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
}

/// ECDSA signature followed by its hash type byte, as it appears in scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSignature {
    pub signature: ecdsa::Signature,
    pub hash_type: u8,
}

impl TransactionSignature {
    /// Parses `DER || hash_type`, requiring strict DER encoding.
    pub fn from_slice(sig: &[u8]) -> Result<Self, SignatureError> {
        is_valid_signature_encoding(sig)?;
        let (hash_type, der) = sig.split_last().ok_or(SignatureError::Empty)?;
        Ok(Self {
            signature: ecdsa::Signature::from_der(der)?,
            hash_type: *hash_type,
        })
    }

    /// Parses `DER || hash_type`, tolerating the BER violations found in
    /// historical signatures.
    pub fn from_slice_lax(sig: &[u8]) -> Result<Self, SignatureError> {
        let (hash_type, der) = sig.split_last().ok_or(SignatureError::Empty)?;
        Ok(Self {
            signature: ecdsa::Signature::from_der_lax(der)?,
            hash_type: *hash_type,
        })
    }

    /// Strict DER encoding with the hash type appended.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.signature.serialize_der().to_vec();
        out.push(self.hash_type);
        out
    }

    /// Whether S is already in the lower half of the curve order.
    pub fn is_low_s(&self) -> bool {
        let mut normalized = self.signature;
        normalized.normalize_s();
        normalized == self.signature
    }
}

/// BIP340 signature with the optional BIP341 hash type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaprootSignature {
    pub signature: schnorr::Signature,
    /// `None` for 64-byte signatures, meaning SIGHASH_DEFAULT.
    pub hash_type: Option<u8>,
}

impl TaprootSignature {
    pub fn from_slice(sig: &[u8]) -> Result<Self, SignatureError> {
        match sig.len() {
            64 => Ok(Self {
                signature: schnorr::Signature::from_slice(sig)?,
                hash_type: None,
            }),
            65 => {
                let (hash_type, sig) = (sig[64], &sig[..64]);
                if hash_type == SIGHASH_DEFAULT {
                    return Err(SignatureError::ExplicitDefaultHashType);
                }
                Ok(Self {
                    signature: schnorr::Signature::from_slice(sig)?,
                    hash_type: Some(hash_type),
                })
            }
            len => Err(SignatureError::InvalidLength(len)),
        }
    }

    /// Hash type committed to by the signature.
    pub fn sighash_type(&self) -> u8 {
        self.hash_type.unwrap_or(SIGHASH_DEFAULT)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.signature.as_ref().to_vec();
        out.extend(self.hash_type);
        out
    }
}

/// 65-byte recoverable signature used for message signing.
///
/// The header byte is `27 + recovery_id`, plus 4 when the signing key is
/// compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSignature {
    pub signature: RecoverableSignature,
    pub compressed: bool,
}

impl CompactSignature {
    pub const SIZE: usize = 65;

    pub fn new(signature: RecoverableSignature, compressed: bool) -> Self {
        Self {
            signature,
            compressed,
        }
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, SignatureError> {
        if data.len() != Self::SIZE {
            return Err(SignatureError::InvalidLength(data.len()));
        }

        let header = data[0];
        let Some(flags) = header.checked_sub(27).filter(|flags| *flags < 8) else {
            return Err(SignatureError::InvalidCompactHeader(header));
        };

        let recovery_id = RecoveryId::from_i32(i32::from(flags & 0x03))?;
        Ok(Self {
            signature: RecoverableSignature::from_compact(&data[1..], recovery_id)?,
            compressed: flags & 0x04 != 0,
        })
    }

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let (recovery_id, compact) = self.signature.serialize_compact();
        let mut out = [0u8; Self::SIZE];
        out[0] = 27 + recovery_id.to_i32() as u8 + if self.compressed { 4 } else { 0 };
        out[1..].copy_from_slice(&compact);
        out
    }

    /// Recovers the public key that produced this signature over `msg`.
    pub fn recover<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        msg: &Message,
    ) -> Result<bitcoin::PublicKey, SignatureError> {
        let inner = secp.recover_ecdsa(msg, &self.signature)?;
        Ok(bitcoin::PublicKey {
            compressed: self.compressed,
            inner,
        })
    }
}

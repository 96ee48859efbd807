//! Hash functions used by script evaluation and the sighash algorithms.

use bitcoin::consensus::encode::{VarInt, serialize};
use bitcoin::hashes::{Hash, HashEngine, hash160, ripemd160, sha1, sha256, sha256d};

pub const TAG_TAPLEAF: &str = "TapLeaf";
pub const TAG_TAPBRANCH: &str = "TapBranch";
pub const TAG_TAPTWEAK: &str = "TapTweak";
pub const TAG_TAPSIGHASH: &str = "TapSighash";

#[inline]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    sha256::Hash::hash(data).to_byte_array()
}

#[inline]
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}

#[inline]
pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

#[inline]
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    ripemd160::Hash::hash(data).to_byte_array()
}

#[inline]
pub fn sha1(data: &[u8]) -> [u8; 20] {
    sha1::Hash::hash(data).to_byte_array()
}

/// BIP340 tagged hash: `SHA256(SHA256(tag) || SHA256(tag) || data)`.
pub fn tagged_hash(tag: &str, data: &[u8]) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag.as_bytes());
    let mut engine = sha256::Hash::engine();
    engine.input(tag_hash.as_ref());
    engine.input(tag_hash.as_ref());
    engine.input(data);
    sha256::Hash::from_engine(engine).to_byte_array()
}

/// Compact size encoding of `n`.
pub fn compact_size(n: usize) -> Vec<u8> {
    serialize(&VarInt(n as u64))
}

/// Hash of a tapscript leaf.
pub fn tapleaf_hash(leaf_version: u8, script: &[u8]) -> [u8; 32] {
    let mut data = Vec::with_capacity(script.len() + 10);
    data.push(leaf_version);
    data.extend(compact_size(script.len()));
    data.extend_from_slice(script);
    tagged_hash(TAG_TAPLEAF, &data)
}

/// Hash of an inner node of the script tree, children are sorted first.
pub fn tapbranch_hash(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (left, right) = if a <= b { (a, b) } else { (b, a) };
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left);
    data[32..].copy_from_slice(right);
    tagged_hash(TAG_TAPBRANCH, &data)
}

/// Tweak committing the internal key to the script tree root, if any.
pub fn taptweak_hash(internal_key: &[u8; 32], merkle_root: Option<&[u8; 32]>) -> [u8; 32] {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(internal_key);
    if let Some(root) = merkle_root {
        data.extend_from_slice(root);
    }
    tagged_hash(TAG_TAPTWEAK, &data)
}

//! BIP 341 output construction from a script tree.
//!
//! [`TaprootSpendInfo`] commits an internal key to an optional [`TapTree`] and
//! hands out the output script, the control block of every leaf and the
//! tweaked key pair used for key path spends.

use crate::constants::{
    ANNEX_TAG, TAPROOT_CONTROL_MAX_NODE_COUNT, TAPROOT_LEAF_MASK, TAPROOT_LEAF_TAPSCRIPT,
};
use crate::hash::{tapbranch_hash, tapleaf_hash, taptweak_hash};
use bitcoin::ScriptBuf;
use bitcoin::opcodes::all::OP_PUSHNUM_1;
use bitcoin::secp256k1::{Keypair, Parity, Scalar, Secp256k1, Verification, XOnlyPublicKey};

/// Taproot construction error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaprootError {
    #[error("Invalid leaf version {0:#04x}")]
    InvalidLeafVersion(u8),
    #[error("Script tree deeper than 128 levels")]
    TreeTooDeep,
    #[error("Tweak is not a valid secp256k1 scalar")]
    InvalidTweak,
    #[error("Key pair does not match the internal key")]
    KeyMismatch,
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
}

/// Script committed to by a taproot output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaprootLeaf {
    pub version: u8,
    pub script: ScriptBuf,
}

impl TaprootLeaf {
    /// Leaf executed as tapscript (leaf version 0xc0).
    pub fn tapscript(script: ScriptBuf) -> Self {
        Self {
            version: TAPROOT_LEAF_TAPSCRIPT,
            script,
        }
    }

    pub fn hash(&self) -> [u8; 32] {
        tapleaf_hash(self.version, self.script.as_bytes())
    }
}

/// Binary tree of taproot leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapTree {
    Leaf(TaprootLeaf),
    Branch(Box<TapTree>, Box<TapTree>),
}

impl TapTree {
    pub fn branch(left: TapTree, right: TapTree) -> Self {
        Self::Branch(Box::new(left), Box::new(right))
    }

    /// Builds a tree by splitting `leaves` in two halves recursively, the
    /// right half takes the extra leaf of an odd count.
    ///
    /// Returns `None` for an empty list.
    pub fn from_leaves(mut leaves: Vec<TaprootLeaf>) -> Option<Self> {
        match leaves.len() {
            0 => None,
            1 => leaves.pop().map(Self::Leaf),
            len => {
                let right = leaves.split_off(len / 2);
                Some(Self::branch(
                    Self::from_leaves(leaves)?,
                    Self::from_leaves(right)?,
                ))
            }
        }
    }

    /// Merkle root of the tree.
    pub fn root_hash(&self) -> [u8; 32] {
        match self {
            Self::Leaf(leaf) => leaf.hash(),
            Self::Branch(left, right) => tapbranch_hash(&left.root_hash(), &right.root_hash()),
        }
    }

    /// Returns the leaves in depth-first order with their merkle paths, the
    /// sibling closest to the leaf first, and the root hash.
    fn collect(&self) -> Result<(Vec<(TaprootLeaf, Vec<[u8; 32]>)>, [u8; 32]), TaprootError> {
        match self {
            Self::Leaf(leaf) => {
                if leaf.version & TAPROOT_LEAF_MASK != leaf.version || leaf.version == ANNEX_TAG {
                    return Err(TaprootError::InvalidLeafVersion(leaf.version));
                }
                Ok((vec![(leaf.clone(), Vec::new())], leaf.hash()))
            }
            Self::Branch(left, right) => {
                let (mut left_leaves, left_hash) = left.collect()?;
                let (mut right_leaves, right_hash) = right.collect()?;

                for (_, path) in &mut left_leaves {
                    path.push(right_hash);
                }
                for (_, path) in &mut right_leaves {
                    path.push(left_hash);
                }

                if left_leaves
                    .iter()
                    .chain(right_leaves.iter())
                    .any(|(_, path)| path.len() > TAPROOT_CONTROL_MAX_NODE_COUNT)
                {
                    return Err(TaprootError::TreeTooDeep);
                }

                left_leaves.append(&mut right_leaves);
                Ok((left_leaves, tapbranch_hash(&left_hash, &right_hash)))
            }
        }
    }
}

/// Internal key, script tree and the output key committing to both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaprootSpendInfo {
    internal_key: XOnlyPublicKey,
    merkle_root: Option<[u8; 32]>,
    output_key: XOnlyPublicKey,
    parity: Parity,
    leaves: Vec<(TaprootLeaf, Vec<[u8; 32]>)>,
}

impl TaprootSpendInfo {
    /// Tweaks `internal_key` with the root of `tree`, a key path only output
    /// when `tree` is `None`.
    pub fn new<C: Verification>(
        secp: &Secp256k1<C>,
        internal_key: XOnlyPublicKey,
        tree: Option<&TapTree>,
    ) -> Result<Self, TaprootError> {
        let (leaves, merkle_root) = match tree {
            Some(tree) => {
                let (leaves, root) = tree.collect()?;
                (leaves, Some(root))
            }
            None => (Vec::new(), None),
        };

        let tweak = tweak_scalar(&internal_key, merkle_root.as_ref())?;
        let (output_key, parity) = internal_key.add_tweak(secp, &tweak)?;

        Ok(Self {
            internal_key,
            merkle_root,
            output_key,
            parity,
            leaves,
        })
    }

    pub fn internal_key(&self) -> XOnlyPublicKey {
        self.internal_key
    }

    pub fn output_key(&self) -> XOnlyPublicKey {
        self.output_key
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    pub fn merkle_root(&self) -> Option<[u8; 32]> {
        self.merkle_root
    }

    /// `OP_1 <output_key>`.
    pub fn script_pubkey(&self) -> ScriptBuf {
        let mut script = vec![OP_PUSHNUM_1.to_u8(), 32];
        script.extend(self.output_key.serialize());
        ScriptBuf::from_bytes(script)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &TaprootLeaf> {
        self.leaves.iter().map(|(leaf, _)| leaf)
    }

    /// Control block revealing `leaf`, `None` if the tree does not hold it.
    pub fn control_block(&self, leaf: &TaprootLeaf) -> Option<Vec<u8>> {
        let (leaf, path) = self.leaves.iter().find(|(candidate, _)| candidate == leaf)?;

        let mut control = Vec::with_capacity(33 + path.len() * 32);
        control.push(leaf.version | self.parity.to_u8());
        control.extend(self.internal_key.serialize());
        for node in path {
            control.extend(node);
        }

        Some(control)
    }

    /// Applies the output tweak to `keypair`, which must own the internal key.
    pub fn tweak_keypair<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        keypair: &Keypair,
    ) -> Result<Keypair, TaprootError> {
        if keypair.x_only_public_key().0 != self.internal_key {
            return Err(TaprootError::KeyMismatch);
        }

        let tweak = tweak_scalar(&self.internal_key, self.merkle_root.as_ref())?;
        Ok(keypair.add_xonly_tweak(secp, &tweak)?)
    }
}

fn tweak_scalar(
    internal_key: &XOnlyPublicKey,
    merkle_root: Option<&[u8; 32]>,
) -> Result<Scalar, TaprootError> {
    Scalar::from_be_bytes(taptweak_hash(&internal_key.serialize(), merkle_root))
        .map_err(|_| TaprootError::InvalidTweak)
}

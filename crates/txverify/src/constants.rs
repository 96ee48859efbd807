use num_bigint::BigUint;
use num_traits::Num;
use std::sync::LazyLock;

/// Maximum number of bytes pushable to the stack.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum script length in bytes, enforced for legacy and witness v0 scripts.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// The maximum combined height of stack and alt stack during script execution.
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations per script.
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum number of public keys per multisig.
pub const MAX_PUBKEYS_PER_MULTISIG: i32 = 20;

pub const COMPRESSED_PUBKEY_SIZE: usize = 33;

pub const WITNESS_V0_SCRIPTHASH_SIZE: usize = 32;
pub const WITNESS_V0_KEYHASH_SIZE: usize = 20;
pub const WITNESS_V1_TAPROOT_SIZE: usize = 32;

pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Taproot only, implies SIGHASH_ALL without a trailing hash type byte.
pub const SIGHASH_DEFAULT: u8 = 0x00;
pub const SIGHASH_OUTPUT_MASK: u8 = 0x03;
pub const SIGHASH_INPUT_MASK: u8 = 0x80;

/// Threshold for nLockTime: below this value it is interpreted as block number,
/// otherwise as UNIX timestamp.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;

/// Setting nSequence to this value for every input disables nLockTime.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Below flags apply in the context of BIP 68.
/// If this flag set, CTxIn::nSequence is NOT interpreted as a relative lock-time.
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// If CTxIn::nSequence encodes a relative lock-time and this flag is set, the
/// relative lock-time has units of 512 seconds, otherwise blocks.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// Mask extracting the relative lock-time from the sequence field.
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// Annex tag, first byte of the last witness element.
pub const ANNEX_TAG: u8 = 0x50;

pub const TAPROOT_LEAF_MASK: u8 = 0xfe;
pub const TAPROOT_LEAF_TAPSCRIPT: u8 = 0xc0;
pub const TAPROOT_CONTROL_BASE_SIZE: usize = 33;
pub const TAPROOT_CONTROL_NODE_SIZE: usize = 32;
pub const TAPROOT_CONTROL_MAX_NODE_COUNT: usize = 128;
pub const TAPROOT_CONTROL_MAX_SIZE: usize =
    TAPROOT_CONTROL_BASE_SIZE + TAPROOT_CONTROL_NODE_SIZE * TAPROOT_CONTROL_MAX_NODE_COUNT;

/// Validation weight per passing signature (Tapscript only, see BIP 342).
pub const VALIDATION_WEIGHT_PER_SIGOP_PASSED: i64 = 50;

/// How much weight budget is added to the witness size (Tapscript only, see BIP 342).
pub const VALIDATION_WEIGHT_OFFSET: i64 = 50;

/// Order of the secp256k1 group.
pub static CURVE_ORDER: LazyLock<BigUint> = LazyLock::new(|| {
    BigUint::from_str_radix(
        "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
        16,
    )
    .expect("Static value must be valid; qed")
});

/// Half the order of the secp256k1 group, the largest S accepted under LOW_S.
pub static HALF_CURVE_ORDER: LazyLock<BigUint> = LazyLock::new(|| &*CURVE_ORDER >> 1u32);

use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Script verification flags.
    ///
    /// Bit positions match Bitcoin Core's `SCRIPT_VERIFY_*` constants.
    ///
    /// https://github.com/bitcoin/bitcoin/blob/6f9db1ebcab4064065ccd787161bf2b87e03cc1f/src/script/interpreter.h#L45
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VerifyFlags: u32 {
        /// Evaluate P2SH subscripts (BIP16).
        const P2SH = 1 << 0;
        /// Passing a non-strict-DER signature or one with undefined hashtype to a checksig operation
        /// causes script failure. Evaluating a pubkey that is not (0x04 + 64 bytes) or
        /// (0x02 or 0x03 + 32 bytes) by checksig causes script failure.
        const STRICTENC = 1 << 1;
        /// Passing a non-strict-DER signature to a checksig operation causes script failure (BIP62 rule 1).
        const DERSIG = 1 << 2;
        /// Passing a non-strict-DER signature or one with S > order/2 to a checksig operation
        /// causes script failure (BIP62 rule 5).
        const LOW_S = 1 << 3;
        /// Verify dummy stack item consumed by CHECKMULTISIG is of zero-length (BIP62 rule 7).
        const NULLDUMMY = 1 << 4;
        /// Using a non-push operator in the scriptSig causes script failure (BIP62 rule 2).
        const SIGPUSHONLY = 1 << 5;
        /// Require minimal encodings for all push operations and numeric operands.
        const MINIMALDATA = 1 << 6;
        /// Discourage use of NOPs reserved for upgrades (NOP1 and NOP4-10).
        const DISCOURAGE_UPGRADABLE_NOPS = 1 << 7;
        /// Require that only a single stack element remains after evaluation.
        const CLEANSTACK = 1 << 8;
        /// Verify CHECKLOCKTIMEVERIFY (BIP65).
        const CHECKLOCKTIMEVERIFY = 1 << 9;
        /// Support CHECKSEQUENCEVERIFY opcode (BIP112).
        const CHECKSEQUENCEVERIFY = 1 << 10;
        /// Support segregated witness (BIP141).
        const WITNESS = 1 << 11;
        /// Making v1-v16 witness program non-standard.
        const DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM = 1 << 12;
        /// Segwit script only: require the argument of OP_IF/NOTIF to be exactly 0x01 or empty vector.
        const MINIMALIF = 1 << 13;
        /// Signature(s) must be empty vector if a CHECK(MULTI)SIG operation failed.
        const NULLFAIL = 1 << 14;
        /// Public keys in segregated witness scripts must be compressed.
        const WITNESS_PUBKEYTYPE = 1 << 15;
        /// Making OP_CODESEPARATOR and FindAndDelete fail any non-segwit scripts.
        const CONST_SCRIPTCODE = 1 << 16;
        /// Taproot/Tapscript validation (BIPs 341 & 342).
        const TAPROOT = 1 << 17;
        /// Making unknown Taproot leaf versions non-standard.
        const DISCOURAGE_UPGRADABLE_TAPROOT_VERSION = 1 << 18;
        /// Making unknown OP_SUCCESS non-standard.
        const DISCOURAGE_OP_SUCCESS = 1 << 19;
        /// Making unknown public key versions (in BIP 342 scripts) non-standard.
        const DISCOURAGE_UPGRADABLE_PUBKEYTYPE = 1 << 20;
    }
}

/// Flag names in bit order, as spelled by Bitcoin Core's test vectors.
const FLAG_NAMES: &[(&str, VerifyFlags)] = &[
    ("P2SH", VerifyFlags::P2SH),
    ("STRICTENC", VerifyFlags::STRICTENC),
    ("DERSIG", VerifyFlags::DERSIG),
    ("LOW_S", VerifyFlags::LOW_S),
    ("NULLDUMMY", VerifyFlags::NULLDUMMY),
    ("SIGPUSHONLY", VerifyFlags::SIGPUSHONLY),
    ("MINIMALDATA", VerifyFlags::MINIMALDATA),
    ("DISCOURAGE_UPGRADABLE_NOPS", VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS),
    ("CLEANSTACK", VerifyFlags::CLEANSTACK),
    ("CHECKLOCKTIMEVERIFY", VerifyFlags::CHECKLOCKTIMEVERIFY),
    ("CHECKSEQUENCEVERIFY", VerifyFlags::CHECKSEQUENCEVERIFY),
    ("WITNESS", VerifyFlags::WITNESS),
    (
        "DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM",
        VerifyFlags::DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM,
    ),
    ("MINIMALIF", VerifyFlags::MINIMALIF),
    ("NULLFAIL", VerifyFlags::NULLFAIL),
    ("WITNESS_PUBKEYTYPE", VerifyFlags::WITNESS_PUBKEYTYPE),
    ("CONST_SCRIPTCODE", VerifyFlags::CONST_SCRIPTCODE),
    ("TAPROOT", VerifyFlags::TAPROOT),
    (
        "DISCOURAGE_UPGRADABLE_TAPROOT_VERSION",
        VerifyFlags::DISCOURAGE_UPGRADABLE_TAPROOT_VERSION,
    ),
    ("DISCOURAGE_OP_SUCCESS", VerifyFlags::DISCOURAGE_OP_SUCCESS),
    (
        "DISCOURAGE_UPGRADABLE_PUBKEYTYPE",
        VerifyFlags::DISCOURAGE_UPGRADABLE_PUBKEYTYPE,
    ),
];

/// Flag set rejected before any script runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlagsError {
    #[error("unknown verification flag `{0}`")]
    UnknownName(String),
    #[error("unknown verification flag bits {0:#x}")]
    UnknownBits(u32),
    #[error("CLEANSTACK requires both P2SH and WITNESS")]
    CleanStackWithoutP2shWitness,
    #[error("WITNESS requires P2SH")]
    WitnessWithoutP2sh,
}

impl VerifyFlags {
    /// Rules enforced by consensus on mainnet today.
    pub const MANDATORY: Self = Self::P2SH
        .union(Self::DERSIG)
        .union(Self::NULLDUMMY)
        .union(Self::CHECKLOCKTIMEVERIFY)
        .union(Self::CHECKSEQUENCEVERIFY)
        .union(Self::WITNESS)
        .union(Self::TAPROOT);

    /// Bitcoin Core's standard script verification flags (relay policy).
    pub const STANDARD: Self = Self::MANDATORY
        .union(Self::STRICTENC)
        .union(Self::MINIMALDATA)
        .union(Self::DISCOURAGE_UPGRADABLE_NOPS)
        .union(Self::CLEANSTACK)
        .union(Self::MINIMALIF)
        .union(Self::NULLFAIL)
        .union(Self::LOW_S)
        .union(Self::DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM)
        .union(Self::WITNESS_PUBKEYTYPE)
        .union(Self::CONST_SCRIPTCODE)
        .union(Self::DISCOURAGE_UPGRADABLE_TAPROOT_VERSION)
        .union(Self::DISCOURAGE_OP_SUCCESS)
        .union(Self::DISCOURAGE_UPGRADABLE_PUBKEYTYPE);

    /// Parses raw bits, rejecting any bit without a defined rule.
    pub fn from_raw(bits: u32) -> Result<Self, FlagsError> {
        Self::from_bits(bits).ok_or(FlagsError::UnknownBits(bits & !Self::all().bits()))
    }

    /// Checks the flag dependencies the interpreter relies on.
    pub fn validate(&self) -> Result<(), FlagsError> {
        let unknown = self.bits() & !Self::all().bits();
        if unknown != 0 {
            return Err(FlagsError::UnknownBits(unknown));
        }
        if self.contains(Self::CLEANSTACK) && !self.contains(Self::P2SH | Self::WITNESS) {
            return Err(FlagsError::CleanStackWithoutP2shWitness);
        }
        if self.contains(Self::WITNESS) && !self.contains(Self::P2SH) {
            return Err(FlagsError::WitnessWithoutP2sh);
        }
        Ok(())
    }

    #[inline]
    pub fn verify_p2sh(&self) -> bool {
        self.contains(Self::P2SH)
    }

    #[inline]
    pub fn verify_witness(&self) -> bool {
        self.contains(Self::WITNESS)
    }

    #[inline]
    pub fn verify_minimaldata(&self) -> bool {
        self.contains(Self::MINIMALDATA)
    }

    #[inline]
    pub fn verify_taproot(&self) -> bool {
        self.contains(Self::TAPROOT)
    }
}

impl Default for VerifyFlags {
    fn default() -> Self {
        Self::MANDATORY
    }
}

impl FromStr for VerifyFlags {
    type Err = FlagsError;

    /// Parses a comma separated list of flag names, `NONE` or an empty string
    /// yields the empty set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != "NONE")
            .try_fold(Self::empty(), |flags, name| {
                FLAG_NAMES
                    .iter()
                    .find(|(flag_name, _)| *flag_name == name)
                    .map(|(_, flag)| flags | *flag)
                    .ok_or_else(|| FlagsError::UnknownName(name.to_string()))
            })
    }
}

impl fmt::Display for VerifyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let names = FLAG_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        f.write_str(&names.join(","))
    }
}

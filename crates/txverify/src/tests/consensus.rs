use crate::{
    ConsensusError, Error, FlagsError, SigVersion, TransactionSigner, Utxo, Verdict, VerifyFlags,
    verify, verify_raw, verify_utxo, verify_with_context, verify_with_reason,
    verify_with_spent_outputs,
};
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::*;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{All, Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, PublicKey, Script, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Txid, Witness,
};

const PREVOUT_AMOUNT: Amount = Amount::from_sat(100_000);

fn secret_key(byte: u8) -> SecretKey {
    SecretKey::from_slice(&[byte; 32]).unwrap()
}

fn public_key(secp: &Secp256k1<All>, byte: u8) -> PublicKey {
    PublicKey::new(secret_key(byte).public_key(secp))
}

fn unsigned_tx(version: Version, lock_time: u32, sequence: u32) -> Transaction {
    Transaction {
        version,
        lock_time: LockTime::from_consensus(lock_time),
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array([0x42; 32]),
                vout: 1,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence(sequence),
            witness: Witness::default(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(90_000),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

/// DER signature with the SIGHASH_ALL byte over the legacy sighash of input 0.
fn sign_legacy(secp: &Secp256k1<All>, tx: &Transaction, script_code: &Script, key: u8) -> Vec<u8> {
    TransactionSigner::with_context(secp, tx, 0, PREVOUT_AMOUNT, None)
        .unwrap()
        .sign_ecdsa(&secret_key(key), script_code.as_bytes(), 0x01, SigVersion::Base)
        .unwrap()
        .serialize()
}

fn push(data: Vec<u8>) -> PushBytesBuf {
    PushBytesBuf::try_from(data).unwrap()
}

fn p2pkh_spend(secp: &Secp256k1<All>, signer: u8, owner: u8) -> (Transaction, ScriptBuf) {
    let pubkey = public_key(secp, owner);
    let script_pubkey = ScriptBuf::new_p2pkh(&pubkey.pubkey_hash());

    let mut tx = unsigned_tx(Version::ONE, 0, u32::MAX);
    let sig = sign_legacy(secp, &tx, &script_pubkey, signer);
    tx.input[0].script_sig = Builder::new().push_slice(push(sig)).push_key(&pubkey).into_script();

    (tx, script_pubkey)
}

#[test]
fn test_p2pkh() {
    let _ = sp_tracing::try_init_simple();

    let secp = Secp256k1::new();
    let (tx, script_pubkey) = p2pkh_spend(&secp, 1, 1);

    for flags in [VerifyFlags::P2SH, VerifyFlags::MANDATORY, VerifyFlags::STANDARD] {
        assert_eq!(
            verify(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
            Ok(true),
            "{flags}"
        );
    }
}

#[test]
fn test_verify_with_context() {
    let secp = Secp256k1::new();
    let verify_ctx = Secp256k1::verification_only();

    for (signer, owner, expected) in [
        (1, 1, Verdict::Valid),
        (2, 1, Verdict::Invalid(Error::NullFail)),
        (3, 3, Verdict::Valid),
    ] {
        let (tx, script_pubkey) = p2pkh_spend(&secp, signer, owner);
        assert_eq!(
            verify_with_context(
                &verify_ctx,
                &tx,
                0,
                &script_pubkey,
                PREVOUT_AMOUNT,
                VerifyFlags::STANDARD
            ),
            Ok(expected)
        );
    }
}

#[test]
fn test_p2pkh_with_other_key() {
    let secp = Secp256k1::new();
    let (tx, script_pubkey) = p2pkh_spend(&secp, 2, 1);

    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::P2SH),
        Ok(Verdict::Invalid(Error::EvalFalse))
    );
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::STANDARD),
        Ok(Verdict::Invalid(Error::NullFail))
    );
}

#[test]
fn test_p2pkh_with_bit_flipped_signature() {
    let secp = Secp256k1::new();
    let pubkey = public_key(&secp, 1);
    let script_pubkey = ScriptBuf::new_p2pkh(&pubkey.pubkey_hash());

    let mut tx = unsigned_tx(Version::ONE, 0, u32::MAX);
    let mut sig = sign_legacy(&secp, &tx, &script_pubkey, 1);
    // Last byte of S, keeps the DER layout intact.
    let last_s_byte = sig.len() - 2;
    sig[last_s_byte] ^= 0x01;
    tx.input[0].script_sig = Builder::new().push_slice(push(sig)).push_key(&pubkey).into_script();

    assert_eq!(
        verify(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::P2SH),
        Ok(false)
    );
}

#[test]
fn test_p2sh_multisig() {
    let secp = Secp256k1::new();
    let keys = [1, 2, 3].map(|byte| public_key(&secp, byte));

    let redeem_script = Builder::new()
        .push_int(2)
        .push_key(&keys[0])
        .push_key(&keys[1])
        .push_key(&keys[2])
        .push_int(3)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script();
    let script_pubkey = ScriptBuf::new_p2sh(&redeem_script.script_hash());

    let mut tx = unsigned_tx(Version::ONE, 0, u32::MAX);
    let first = sign_legacy(&secp, &tx, &redeem_script, 1);
    let third = sign_legacy(&secp, &tx, &redeem_script, 3);

    let script_sig = |sigs: &[&Vec<u8>]| {
        sigs.iter()
            .fold(Builder::new().push_int(0), |builder, sig| {
                builder.push_slice(push(sig.to_vec()))
            })
            .push_slice(push(redeem_script.to_bytes()))
            .into_script()
    };

    tx.input[0].script_sig = script_sig(&[&first, &third]);
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::STANDARD),
        Ok(Verdict::Valid)
    );

    // Signatures must follow the key order.
    tx.input[0].script_sig = script_sig(&[&third, &first]);
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::P2SH),
        Ok(Verdict::Invalid(Error::EvalFalse))
    );

    // Without P2SH only the hash of the redeem script is checked.
    assert_eq!(
        verify(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::empty()),
        Ok(true)
    );
}

#[test]
fn test_p2sh_redeem_script_hash_mismatch() {
    let redeem_script = Builder::new().push_int(1).into_script();
    let script_pubkey = ScriptBuf::new_p2sh(&redeem_script.script_hash());

    let mut tx = unsigned_tx(Version::ONE, 0, u32::MAX);
    tx.input[0].script_sig = Builder::new()
        .push_slice(push(Builder::new().push_int(2).into_script().to_bytes()))
        .into_script();

    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::P2SH),
        Ok(Verdict::Invalid(Error::P2shHashMismatch))
    );
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::empty()),
        Ok(Verdict::Invalid(Error::EvalFalse))
    );

    // Redeem script must come from push only script_sig.
    tx.input[0].script_sig = Builder::new()
        .push_opcode(OP_NOP)
        .push_slice(push(redeem_script.to_bytes()))
        .into_script();
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::P2SH),
        Ok(Verdict::Invalid(Error::SigPushOnly))
    );
}

#[test]
fn test_checklocktimeverify() {
    let script_pubkey = Builder::new()
        .push_int(100)
        .push_opcode(OP_CLTV)
        .push_opcode(OP_DROP)
        .push_int(1)
        .into_script();
    let flags = VerifyFlags::STANDARD;

    let tx = unsigned_tx(Version::ONE, 150, 0xffff_fffe);
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
        Ok(Verdict::Valid)
    );

    let tx = unsigned_tx(Version::ONE, 50, 0xffff_fffe);
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
        Ok(Verdict::Invalid(Error::UnsatisfiedLocktime))
    );
    // Treated as OP_NOP2 without the flag.
    assert_eq!(
        verify(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::P2SH),
        Ok(true)
    );

    // A final input disables the lock time.
    let tx = unsigned_tx(Version::ONE, 150, u32::MAX);
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
        Ok(Verdict::Invalid(Error::UnsatisfiedLocktime))
    );

    // Timestamp lock time against a height operand.
    let tx = unsigned_tx(Version::ONE, 500_000_001, 0xffff_fffe);
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
        Ok(Verdict::Invalid(Error::UnsatisfiedLocktime))
    );
}

#[test]
fn test_checksequenceverify() {
    let script_pubkey = Builder::new()
        .push_int(10)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_int(1)
        .into_script();
    let flags = VerifyFlags::STANDARD;

    let tx = unsigned_tx(Version::TWO, 0, 10);
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
        Ok(Verdict::Valid)
    );

    let tx = unsigned_tx(Version::TWO, 0, 5);
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
        Ok(Verdict::Invalid(Error::UnsatisfiedLocktime))
    );

    let tx = unsigned_tx(Version::ONE, 0, 10);
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
        Ok(Verdict::Invalid(Error::UnsatisfiedLocktime))
    );

    // Operand with the disable flag set behaves as a NOP.
    let script_pubkey = Builder::new()
        .push_int(1 << 31)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_int(1)
        .into_script();
    let tx = unsigned_tx(Version::ONE, 0, 0);
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
        Ok(Verdict::Valid)
    );
}

#[test]
fn test_op_count_limit_regardless_of_flags() {
    let script_pubkey = (0..202)
        .fold(Builder::new().push_int(1), |builder, _| builder.push_opcode(OP_NOP))
        .into_script();
    let tx = unsigned_tx(Version::ONE, 0, u32::MAX);

    for flags in [VerifyFlags::empty(), VerifyFlags::MANDATORY, VerifyFlags::STANDARD] {
        assert_eq!(
            verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
            Ok(Verdict::Invalid(Error::OpCount)),
            "{flags}"
        );
    }
}

#[test]
fn test_verify_is_deterministic() {
    let secp = Secp256k1::new();
    let (tx, script_pubkey) = p2pkh_spend(&secp, 1, 1);
    let (bad_tx, _) = p2pkh_spend(&secp, 2, 1);

    for _ in 0..3 {
        assert_eq!(
            verify(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::STANDARD),
            Ok(true)
        );
        assert_eq!(
            verify(&bad_tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::STANDARD),
            Ok(false)
        );
    }
}

#[test]
fn test_input_index_out_of_range() {
    let tx = unsigned_tx(Version::ONE, 0, u32::MAX);
    let script_pubkey = Builder::new().push_int(1).into_script();
    let expected = Err(ConsensusError::InputIndexOutOfRange {
        index: 1,
        inputs: 1,
    });

    assert_eq!(
        verify(&tx, 1, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::P2SH),
        expected
    );

    let spent_outputs = vec![TxOut {
        value: PREVOUT_AMOUNT,
        script_pubkey,
    }];
    assert_eq!(
        verify_with_spent_outputs(&tx, 1, &spent_outputs, VerifyFlags::P2SH),
        Err(ConsensusError::InputIndexOutOfRange {
            index: 1,
            inputs: 1
        })
    );
}

#[test]
fn test_invalid_flags() {
    let tx = unsigned_tx(Version::ONE, 0, u32::MAX);
    let script_pubkey = Builder::new().push_int(1).into_script();

    let cases = [
        (
            VerifyFlags::WITNESS,
            FlagsError::WitnessWithoutP2sh,
        ),
        (
            VerifyFlags::P2SH | VerifyFlags::CLEANSTACK,
            FlagsError::CleanStackWithoutP2shWitness,
        ),
        (
            VerifyFlags::P2SH | VerifyFlags::from_bits_retain(1 << 30),
            FlagsError::UnknownBits(1 << 30),
        ),
    ];

    for (flags, expected) in cases {
        assert_eq!(
            verify(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, flags),
            Err(ConsensusError::InvalidFlags(expected))
        );
    }
}

#[test]
fn test_spent_outputs_mismatch() {
    let tx = unsigned_tx(Version::ONE, 0, u32::MAX);
    let output = TxOut {
        value: PREVOUT_AMOUNT,
        script_pubkey: Builder::new().push_int(1).into_script(),
    };

    assert_eq!(
        verify_with_spent_outputs(&tx, 0, &[output.clone(), output.clone()], VerifyFlags::P2SH),
        Err(ConsensusError::SpentOutputsMismatch {
            expected: 1,
            got: 2
        })
    );
    assert_eq!(
        verify_with_spent_outputs(&tx, 0, &[output], VerifyFlags::P2SH),
        Ok(Verdict::Valid)
    );
}

#[test]
fn test_verify_utxo() {
    let tx = unsigned_tx(Version::ONE, 0, u32::MAX);
    let output = TxOut {
        value: PREVOUT_AMOUNT,
        script_pubkey: Builder::new().push_int(1).into_script(),
    };

    let utxo = Utxo {
        outpoint: tx.input[0].previous_output,
        output: output.clone(),
    };
    assert_eq!(
        verify_utxo(&tx, 0, &utxo, VerifyFlags::P2SH),
        Ok(Verdict::Valid)
    );

    let utxo = Utxo {
        outpoint: OutPoint::null(),
        output,
    };
    assert_eq!(
        verify_utxo(&tx, 0, &utxo, VerifyFlags::P2SH),
        Err(ConsensusError::SpentOutputMismatch(0))
    );
}

#[test]
fn test_verify_raw() {
    let secp = Secp256k1::new();
    let (tx, script_pubkey) = p2pkh_spend(&secp, 1, 1);
    let tx_bytes = serialize(&tx);

    assert_eq!(
        verify_raw(&tx_bytes, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::STANDARD),
        Ok(true)
    );

    let mut trailing = tx_bytes.clone();
    trailing.extend([0x00, 0x01]);
    assert_eq!(
        verify_raw(&trailing, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::STANDARD),
        Err(ConsensusError::TrailingData(2))
    );

    assert!(matches!(
        verify_raw(&tx_bytes[..10], 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::STANDARD),
        Err(ConsensusError::TxDeserialize(_))
    ));
}

#[test]
fn test_p2wpkh_signed_in_test() {
    let secp = Secp256k1::new();
    let pubkey = public_key(&secp, 7);
    let script_pubkey = ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash().unwrap());

    // BIP 143 script code of a P2WPKH output.
    let script_code = ScriptBuf::new_p2pkh(&pubkey.pubkey_hash());

    let mut tx = unsigned_tx(Version::TWO, 0, u32::MAX);
    let sig = TransactionSigner::with_context(&secp, &tx, 0, PREVOUT_AMOUNT, None)
        .unwrap()
        .sign_ecdsa(&secret_key(7), script_code.as_bytes(), 0x01, SigVersion::WitnessV0)
        .unwrap()
        .serialize();
    tx.input[0].witness = Witness::from(vec![sig, pubkey.to_bytes()]);

    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::STANDARD),
        Ok(Verdict::Valid)
    );

    // The signature commits to the amount.
    assert_eq!(
        verify_with_reason(
            &tx,
            0,
            &script_pubkey,
            Amount::from_sat(100_001),
            VerifyFlags::MANDATORY
        ),
        Ok(Verdict::Invalid(Error::EvalFalse))
    );

    // Uncompressed keys are policy only.
    let uncompressed = PublicKey {
        compressed: false,
        inner: pubkey.inner,
    };
    let script_pubkey = ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::hash(
        &uncompressed.to_bytes(),
    ));
    let tx = {
        let mut tx = unsigned_tx(Version::TWO, 0, u32::MAX);
        tx.input[0].witness = Witness::from(vec![vec![0x30, 0x01], uncompressed.to_bytes()]);
        tx
    };
    assert_eq!(
        verify_with_reason(&tx, 0, &script_pubkey, PREVOUT_AMOUNT, VerifyFlags::STANDARD),
        Ok(Verdict::Invalid(Error::SigDer(
            crate::signature::SignatureEncodingError::TooShort
        )))
    );
}

//! BIP 341/342 spends signed in the test with fixed keys.

use crate::taproot::{TapTree, TaprootLeaf, TaprootSpendInfo};
use crate::{
    ConsensusError, Error, TransactionSigner, Verdict, VerifyFlags, verify_with_context,
    verify_with_reason, verify_with_spent_outputs, verify_with_spent_outputs_with_context,
};
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::*;
use bitcoin::script::Builder;
use bitcoin::secp256k1::{All, Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

fn flags() -> VerifyFlags {
    VerifyFlags::P2SH | VerifyFlags::WITNESS | VerifyFlags::TAPROOT
}

fn keypair(secp: &Secp256k1<All>, byte: u8) -> Keypair {
    Keypair::from_secret_key(secp, &SecretKey::from_slice(&[byte; 32]).unwrap())
}

fn x_only(keypair: &Keypair) -> XOnlyPublicKey {
    keypair.x_only_public_key().0
}

/// Transaction spending one fake outpoint per entry of `spent_outputs`.
fn spending_tx(spent_outputs: &[TxOut]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: (0..spent_outputs.len())
            .map(|i| TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([i as u8 + 1; 32]),
                    vout: i as u32,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            })
            .collect(),
        output: vec![TxOut {
            value: Amount::from_sat(900),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

fn signer<'a>(
    secp: &'a Secp256k1<All>,
    tx: &'a Transaction,
    spent_outputs: &'a [TxOut],
) -> TransactionSigner<'a, All> {
    TransactionSigner::with_context(secp, tx, 0, spent_outputs[0].value, Some(spent_outputs))
        .unwrap()
}

fn output(spend_info: &TaprootSpendInfo, sats: u64) -> TxOut {
    TxOut {
        value: Amount::from_sat(sats),
        script_pubkey: spend_info.script_pubkey(),
    }
}

fn key_path_info(secp: &Secp256k1<All>, keypair: &Keypair) -> TaprootSpendInfo {
    TaprootSpendInfo::new(secp, x_only(keypair), None).unwrap()
}

/// Output committing to a single `leaf`.
fn single_leaf_info(secp: &Secp256k1<All>, internal: &Keypair, leaf: &TaprootLeaf) -> TaprootSpendInfo {
    TaprootSpendInfo::new(secp, x_only(internal), Some(&TapTree::Leaf(leaf.clone()))).unwrap()
}

fn with_witness(mut tx: Transaction, items: Vec<Vec<u8>>) -> Transaction {
    tx.input[0].witness = Witness::from(items);
    tx
}

fn checksig_leaf(key: &Keypair) -> TaprootLeaf {
    TaprootLeaf::tapscript(
        Builder::new()
            .push_x_only_key(&x_only(key))
            .push_opcode(OP_CHECKSIG)
            .into_script(),
    )
}

#[test]
fn test_key_path_spend() {
    let _ = sp_tracing::try_init_simple();

    let secp = Secp256k1::new();
    let keypair = keypair(&secp, 0x11);
    let spend_info = key_path_info(&secp, &keypair);
    let spent_outputs = vec![output(&spend_info, 1_000)];
    let tx = spending_tx(&spent_outputs);

    for hash_type in [0x00, 0x01, 0x83, 0x82] {
        let sig = signer(&secp, &tx, &spent_outputs)
            .sign_key_path(&spend_info, &keypair, hash_type, None)
            .unwrap();
        let tx = with_witness(tx.clone(), vec![sig.serialize()]);
        assert_eq!(
            verify_with_spent_outputs(&tx, 0, &spent_outputs, flags()),
            Ok(Verdict::Valid),
            "hash_type {hash_type:#04x}"
        );
    }
}

#[test]
fn test_key_path_spend_rejections() {
    let secp = Secp256k1::new();
    let keypair = keypair(&secp, 0x11);
    let spend_info = key_path_info(&secp, &keypair);
    let spent_outputs = vec![output(&spend_info, 1_000)];
    let tx = spending_tx(&spent_outputs);
    let sig = signer(&secp, &tx, &spent_outputs)
        .sign_key_path(&spend_info, &keypair, 0x00, None)
        .unwrap()
        .serialize();

    // The signature commits to the spent amount.
    let mut other_amount = spent_outputs.clone();
    other_amount[0].value = Amount::from_sat(1_001);
    let signed = with_witness(tx.clone(), vec![sig.clone()]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &other_amount, flags()),
        Ok(Verdict::Invalid(Error::SchnorrSig))
    );

    // An explicit SIGHASH_DEFAULT byte is not allowed.
    let mut explicit_default = sig.clone();
    explicit_default.push(0x00);
    let signed = with_witness(tx.clone(), vec![explicit_default]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Invalid(Error::SchnorrSigHashType))
    );

    let signed = with_witness(tx.clone(), vec![sig[..63].to_vec()]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Invalid(Error::SchnorrSigSize))
    );

    let signed = with_witness(tx.clone(), vec![]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Invalid(Error::WitnessProgramWitnessEmpty))
    );

    // Taproot rules are not enforced without the flag.
    let signed = with_witness(tx.clone(), vec![vec![0x01; 10]]);
    assert_eq!(
        verify_with_spent_outputs(
            &signed,
            0,
            &spent_outputs,
            VerifyFlags::P2SH | VerifyFlags::WITNESS
        ),
        Ok(Verdict::Valid)
    );
}

#[test]
fn test_key_path_spend_with_annex() {
    let secp = Secp256k1::new();
    let keypair = keypair(&secp, 0x22);
    let spend_info = key_path_info(&secp, &keypair);
    let spent_outputs = vec![output(&spend_info, 1_000)];
    let tx = spending_tx(&spent_outputs);
    let annex = [0x50, 0x01, 0x02, 0x03];

    let sig = signer(&secp, &tx, &spent_outputs)
        .sign_key_path(&spend_info, &keypair, 0x00, Some(&annex[..]))
        .unwrap()
        .serialize();
    let signed = with_witness(tx.clone(), vec![sig.clone(), annex.to_vec()]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Valid)
    );

    // The annex is committed to.
    let signed = with_witness(tx.clone(), vec![sig.clone(), vec![0x50, 0x01]]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Invalid(Error::SchnorrSig))
    );
    let signed = with_witness(tx, vec![sig]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Invalid(Error::SchnorrSig))
    );
}

#[test]
fn test_single_input_uses_prevout_as_spent_outputs() {
    let secp = Secp256k1::new();
    let keypair = keypair(&secp, 0x11);
    let spend_info = key_path_info(&secp, &keypair);
    let spent_outputs = vec![output(&spend_info, 1_000)];
    let tx = spending_tx(&spent_outputs);
    let sig = signer(&secp, &tx, &spent_outputs)
        .sign_key_path(&spend_info, &keypair, 0x00, None)
        .unwrap();
    let tx = with_witness(tx, vec![sig.serialize()]);

    assert_eq!(
        verify_with_reason(
            &tx,
            0,
            &spent_outputs[0].script_pubkey,
            spent_outputs[0].value,
            flags()
        ),
        Ok(Verdict::Valid)
    );
}

#[test]
fn test_multi_input_requires_spent_outputs() {
    let secp = Secp256k1::new();
    let keypair = keypair(&secp, 0x11);
    let spend_info = key_path_info(&secp, &keypair);
    let spent_outputs = vec![output(&spend_info, 1_000), output(&spend_info, 1_000)];
    let tx = spending_tx(&spent_outputs);
    let sig = signer(&secp, &tx, &spent_outputs)
        .sign_key_path(&spend_info, &keypair, 0x00, None)
        .unwrap();
    let tx = with_witness(tx, vec![sig.serialize()]);

    assert_eq!(
        verify_with_reason(
            &tx,
            0,
            &spent_outputs[0].script_pubkey,
            spent_outputs[0].value,
            flags()
        ),
        Err(ConsensusError::MissingSpentOutputs)
    );
    assert_eq!(
        verify_with_spent_outputs(&tx, 0, &spent_outputs, flags()),
        Ok(Verdict::Valid)
    );

    // Taproot programs are not executed without WITNESS.
    assert_eq!(
        verify_with_reason(
            &tx,
            0,
            &spent_outputs[0].script_pubkey,
            spent_outputs[0].value,
            VerifyFlags::P2SH | VerifyFlags::TAPROOT
        ),
        Ok(Verdict::Valid)
    );
}

#[test]
fn test_caller_provided_context() {
    let secp = Secp256k1::new();
    let verify_ctx = Secp256k1::verification_only();
    let internal = keypair(&secp, 0x12);
    let signer_key = keypair(&secp, 0x13);
    let leaf = checksig_leaf(&signer_key);
    let spend_info = single_leaf_info(&secp, &internal, &leaf);

    let spent_outputs = vec![output(&spend_info, 2_000)];
    let tx = spending_tx(&spent_outputs);
    let sig = signer(&secp, &tx, &spent_outputs)
        .sign_script_path(&signer_key, &leaf, 0x00, None)
        .unwrap();
    let tx = with_witness(
        tx,
        vec![
            sig.serialize(),
            leaf.script.to_bytes(),
            spend_info.control_block(&leaf).unwrap(),
        ],
    );

    // One context shared by several verifications.
    for _ in 0..2 {
        assert_eq!(
            verify_with_spent_outputs_with_context(&verify_ctx, &tx, 0, &spent_outputs, flags()),
            Ok(Verdict::Valid)
        );
        assert_eq!(
            verify_with_context(
                &verify_ctx,
                &tx,
                0,
                &spent_outputs[0].script_pubkey,
                spent_outputs[0].value,
                flags()
            ),
            Ok(Verdict::Valid)
        );
    }
}

#[test]
fn test_script_path_checksig() {
    let secp = Secp256k1::new();
    let internal = keypair(&secp, 0x33);
    let signer_key = keypair(&secp, 0x44);
    let leaf = checksig_leaf(&signer_key);
    let spend_info = single_leaf_info(&secp, &internal, &leaf);
    let control = spend_info.control_block(&leaf).unwrap();
    let script = leaf.script.to_bytes();

    let spent_outputs = vec![output(&spend_info, 5_000)];
    let tx = spending_tx(&spent_outputs);
    let sig = signer(&secp, &tx, &spent_outputs)
        .sign_script_path(&signer_key, &leaf, 0x00, None)
        .unwrap()
        .serialize();

    let signed = with_witness(tx.clone(), vec![sig.clone(), script.clone(), control.clone()]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Valid)
    );

    // Wrong parity bit breaks the commitment.
    let mut flipped = control.clone();
    flipped[0] ^= 1;
    let signed = with_witness(tx.clone(), vec![sig.clone(), script.clone(), flipped]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Invalid(Error::WitnessProgramMismatch))
    );

    // Failed non-empty signatures abort the script.
    let mut bad_sig = sig;
    bad_sig[0] ^= 1;
    let signed = with_witness(tx.clone(), vec![bad_sig, script.clone(), control.clone()]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Invalid(Error::SchnorrSig))
    );

    // An empty signature only makes CHECKSIG push false.
    let signed = with_witness(tx, vec![vec![], script, control]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Invalid(Error::EvalFalse))
    );
}

#[test]
fn test_script_path_in_deep_tree() {
    let secp = Secp256k1::new();
    let internal = keypair(&secp, 0x34);
    let signers = [0x41, 0x42, 0x43, 0x44, 0x45].map(|byte| keypair(&secp, byte));
    let leaves = signers.iter().map(checksig_leaf).collect::<Vec<_>>();

    // Five leaves: every leaf sits at depth 2 or 3.
    let tree = TapTree::from_leaves(leaves.clone()).unwrap();
    let spend_info = TaprootSpendInfo::new(&secp, x_only(&internal), Some(&tree)).unwrap();
    let spent_outputs = vec![output(&spend_info, 6_000)];
    let tx = spending_tx(&spent_outputs);

    for (leaf, signer_key) in leaves.iter().zip(&signers) {
        let control = spend_info.control_block(leaf).unwrap();
        assert!(control.len() >= 33 + 2 * 32);

        let sig = signer(&secp, &tx, &spent_outputs)
            .sign_script_path(signer_key, leaf, 0x00, None)
            .unwrap()
            .serialize();

        let signed = with_witness(
            tx.clone(),
            vec![sig.clone(), leaf.script.to_bytes(), control.clone()],
        );
        assert_eq!(
            verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
            Ok(Verdict::Valid)
        );

        // Corrupting any merkle path node breaks the commitment.
        for node in 0..(control.len() - 33) / 32 {
            let mut corrupted = control.clone();
            corrupted[33 + node * 32] ^= 0x01;
            let signed = with_witness(
                tx.clone(),
                vec![sig.clone(), leaf.script.to_bytes(), corrupted],
            );
            assert_eq!(
                verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
                Ok(Verdict::Invalid(Error::WitnessProgramMismatch)),
                "node {node}"
            );
        }

        // A path missing its last node commits to another root.
        let truncated = control[..control.len() - 32].to_vec();
        let signed = with_witness(tx.clone(), vec![sig, leaf.script.to_bytes(), truncated]);
        assert_eq!(
            verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
            Ok(Verdict::Invalid(Error::WitnessProgramMismatch))
        );
    }
}

#[test]
fn test_control_block_size() {
    let secp = Secp256k1::new();
    let internal = keypair(&secp, 0x35);
    let leaf = TaprootLeaf::tapscript(Builder::new().push_int(1).into_script());
    let spend_info = single_leaf_info(&secp, &internal, &leaf);
    let control = spend_info.control_block(&leaf).unwrap();
    assert_eq!(control.len(), 33);

    let spent_outputs = vec![output(&spend_info, 1_000)];
    let tx = spending_tx(&spent_outputs);

    let signed = with_witness(tx.clone(), vec![leaf.script.to_bytes(), control.clone()]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Valid)
    );

    let resize = |len: usize| {
        let mut resized = control.clone();
        resized.resize(len, 0x00);
        resized
    };

    for len in [32, 34, 33 + 31, 33 + 32 + 1, 33 + 32 * 129] {
        let signed = with_witness(tx.clone(), vec![leaf.script.to_bytes(), resize(len)]);
        assert_eq!(
            verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
            Ok(Verdict::Invalid(Error::TaprootWrongControlSize)),
            "control block of {len} bytes"
        );
    }

    // The largest valid size passes the size check and fails the commitment.
    let signed = with_witness(tx, vec![leaf.script.to_bytes(), resize(33 + 32 * 128)]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Invalid(Error::WitnessProgramMismatch))
    );
}

#[test]
fn test_script_path_checksigadd() {
    let secp = Secp256k1::new();
    let internal = keypair(&secp, 0x55);
    let first = keypair(&secp, 0x66);
    let second = keypair(&secp, 0x77);

    let leaf = TaprootLeaf::tapscript(
        Builder::new()
            .push_x_only_key(&x_only(&first))
            .push_opcode(OP_CHECKSIG)
            .push_x_only_key(&x_only(&second))
            .push_opcode(OP_CHECKSIGADD)
            .push_int(2)
            .push_opcode(OP_NUMEQUAL)
            .into_script(),
    );
    let spend_info = single_leaf_info(&secp, &internal, &leaf);
    let control = spend_info.control_block(&leaf).unwrap();

    let spent_outputs = vec![output(&spend_info, 7_000)];
    let tx = spending_tx(&spent_outputs);
    let mut signer = signer(&secp, &tx, &spent_outputs);
    let first_sig = signer.sign_script_path(&first, &leaf, 0x00, None).unwrap().serialize();
    let second_sig = signer.sign_script_path(&second, &leaf, 0x00, None).unwrap().serialize();

    // The first checked signature is on top.
    let signed = with_witness(
        tx.clone(),
        vec![second_sig, first_sig.clone(), leaf.script.to_bytes(), control.clone()],
    );
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Valid)
    );

    // One of two.
    let signed = with_witness(tx, vec![vec![], first_sig, leaf.script.to_bytes(), control]);
    assert_eq!(
        verify_with_spent_outputs(&signed, 0, &spent_outputs, flags()),
        Ok(Verdict::Invalid(Error::EvalFalse))
    );
}

#[test]
fn test_op_success_leaf() {
    let secp = Secp256k1::new();
    let internal = keypair(&secp, 0x88);

    // OP_RETURN would fail, the OP_SUCCESS80 after it short-circuits first.
    let leaf = TaprootLeaf::tapscript(ScriptBuf::from_bytes(vec![0x6a, 0x50]));
    let spend_info = single_leaf_info(&secp, &internal, &leaf);

    let spent_outputs = vec![output(&spend_info, 1_000)];
    let tx = with_witness(
        spending_tx(&spent_outputs),
        vec![
            vec![0x01; 600],
            leaf.script.to_bytes(),
            spend_info.control_block(&leaf).unwrap(),
        ],
    );

    assert_eq!(
        verify_with_spent_outputs(&tx, 0, &spent_outputs, flags()),
        Ok(Verdict::Valid)
    );
    assert_eq!(
        verify_with_spent_outputs(
            &tx,
            0,
            &spent_outputs,
            flags() | VerifyFlags::DISCOURAGE_OP_SUCCESS
        ),
        Ok(Verdict::Invalid(Error::DiscourageOpSuccess))
    );
}

#[test]
fn test_unknown_leaf_version() {
    let secp = Secp256k1::new();
    let internal = keypair(&secp, 0x99);

    let leaf = TaprootLeaf {
        version: 0xc2,
        script: ScriptBuf::from_bytes(vec![0x6a]),
    };
    let spend_info = single_leaf_info(&secp, &internal, &leaf);

    let spent_outputs = vec![output(&spend_info, 1_000)];
    let tx = with_witness(
        spending_tx(&spent_outputs),
        vec![
            vec![],
            leaf.script.to_bytes(),
            spend_info.control_block(&leaf).unwrap(),
        ],
    );

    assert_eq!(
        verify_with_spent_outputs(&tx, 0, &spent_outputs, flags()),
        Ok(Verdict::Valid)
    );
    assert_eq!(
        verify_with_spent_outputs(
            &tx,
            0,
            &spent_outputs,
            flags() | VerifyFlags::DISCOURAGE_UPGRADABLE_TAPROOT_VERSION
        ),
        Ok(Verdict::Invalid(Error::DiscourageUpgradableTaprootVersion))
    );
}

#[test]
fn test_upgradable_pubkey_type() {
    let secp = Secp256k1::new();
    let internal = keypair(&secp, 0xaa);

    // 33-byte key: an unknown public key type.
    let leaf = TaprootLeaf::tapscript(
        Builder::new()
            .push_slice([0x02; 33])
            .push_opcode(OP_CHECKSIG)
            .into_script(),
    );
    let spend_info = single_leaf_info(&secp, &internal, &leaf);

    let spent_outputs = vec![output(&spend_info, 1_000)];
    let tx = with_witness(
        spending_tx(&spent_outputs),
        vec![
            vec![0x01; 64],
            leaf.script.to_bytes(),
            spend_info.control_block(&leaf).unwrap(),
        ],
    );

    assert_eq!(
        verify_with_spent_outputs(&tx, 0, &spent_outputs, flags()),
        Ok(Verdict::Valid)
    );
    assert_eq!(
        verify_with_spent_outputs(
            &tx,
            0,
            &spent_outputs,
            flags() | VerifyFlags::DISCOURAGE_UPGRADABLE_PUBKEYTYPE
        ),
        Ok(Verdict::Invalid(Error::DiscourageUpgradablePubkeyType))
    );
}

#[test]
fn test_p2sh_wrapped_v1_program_is_not_taproot() {
    let secp = Secp256k1::new();
    let program = key_path_info(&secp, &keypair(&secp, 0xbb)).output_key();
    let redeem_script = Builder::new()
        .push_int(1)
        .push_x_only_key(&program)
        .into_script();
    let script_pubkey = ScriptBuf::new_p2sh(&redeem_script.script_hash());

    let spent_outputs = vec![TxOut {
        value: Amount::from_sat(1_000),
        script_pubkey,
    }];
    let mut tx = spending_tx(&spent_outputs);
    tx.input[0].script_sig = Builder::new()
        .push_slice(<&bitcoin::script::PushBytes>::try_from(redeem_script.as_bytes()).unwrap())
        .into_script();
    tx.input[0].witness = Witness::from(vec![vec![0x01; 64]]);

    // Future softfork compatibility: anything goes.
    assert_eq!(
        verify_with_spent_outputs(&tx, 0, &spent_outputs, flags()),
        Ok(Verdict::Valid)
    );
    assert_eq!(
        verify_with_spent_outputs(
            &tx,
            0,
            &spent_outputs,
            flags() | VerifyFlags::DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM
        ),
        Ok(Verdict::Invalid(Error::DiscourageUpgradableWitnessProgram))
    );
}

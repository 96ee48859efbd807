use super::eval_script;
use crate::constants::{
    ANNEX_TAG, MAX_SCRIPT_ELEMENT_SIZE, MAX_STACK_SIZE, TAPROOT_CONTROL_BASE_SIZE,
    TAPROOT_CONTROL_MAX_SIZE, TAPROOT_CONTROL_NODE_SIZE, TAPROOT_LEAF_MASK,
    TAPROOT_LEAF_TAPSCRIPT, VALIDATION_WEIGHT_OFFSET, WITNESS_V0_KEYHASH_SIZE,
    WITNESS_V0_SCRIPTHASH_SIZE, WITNESS_V1_TAPROOT_SIZE,
};
use crate::error::Error;
use crate::hash::{compact_size, sha256, tapbranch_hash, tapleaf_hash, taptweak_hash};
use crate::script::{
    Opcode, Parser, is_op_success, is_p2sh, is_push_only, push_data_script, witness_program,
};
use crate::signature_checker::SignatureChecker;
use crate::stack::Stack;
use crate::{AnnexInfo, LOG_TARGET, ScriptExecutionData, SigVersion, VerifyFlags};
use bitcoin::consensus::encode::serialize;
use bitcoin::secp256k1::{Parity, Scalar, XOnlyPublicKey};
use bitcoin::{Script, Witness};

/// Verifies that `script_sig` and `witness` satisfy `script_pubkey`.
///
/// - Ok(()): `return true` in C++.
/// - Err(err): `return false` with `serror` set.
pub fn verify_script<SC: SignatureChecker>(
    script_sig: &Script,
    script_pubkey: &Script,
    witness: &Witness,
    flags: &VerifyFlags,
    checker: &mut SC,
) -> Result<(), Error> {
    if flags.intersects(VerifyFlags::SIGPUSHONLY) && !is_push_only(script_sig.as_bytes()) {
        return Err(Error::SigPushOnly);
    }

    // scriptSig and scriptPubKey must be evaluated sequentially on the same stack rather
    // than being simply concatenated (see CVE-2010-5141).
    let mut stack = Stack::empty();

    eval_script(
        &mut stack,
        script_sig,
        flags,
        checker,
        SigVersion::Base,
        &mut ScriptExecutionData::default(),
    )?;

    let stack_copy = flags.verify_p2sh().then(|| stack.clone());

    let success = eval_script(
        &mut stack,
        script_pubkey,
        flags,
        checker,
        SigVersion::Base,
        &mut ScriptExecutionData::default(),
    )?;

    let spends_p2sh = flags.verify_p2sh() && is_p2sh(script_pubkey.as_bytes());

    if !success {
        if spends_p2sh {
            return Err(Error::P2shHashMismatch);
        }
        return Err(Error::EvalFalse);
    }

    let mut had_witness = false;

    // Verify witness program
    if flags.verify_witness() {
        if let Some((version, program)) = witness_program(script_pubkey.as_bytes()) {
            if !script_sig.is_empty() {
                // The scriptSig must be _exactly_ CScript(), otherwise we reintroduce malleability.
                return Err(Error::WitnessMalleated);
            }

            had_witness = true;

            verify_witness_program(witness, version, program, flags, checker, false)?;

            // Bypass the cleanstack check at the end. The actual stack is obviously not clean
            // for witness programs.
            stack.truncate(1);
        }
    }

    // Additional validation for spend-to-script-hash transactions:
    if let Some(mut p2sh_stack) = stack_copy.filter(|_| spends_p2sh) {
        // scriptSig must be literals-only or validation fails
        if !is_push_only(script_sig.as_bytes()) {
            return Err(Error::SigPushOnly);
        }

        // The copy cannot be empty here, because if it was the
        // P2SH  HASH <> EQUAL  scriptPubKey would be evaluated with
        // an empty stack and the eval_script above would return false.
        let redeem_script = p2sh_stack.pop()?;
        let redeem_script = Script::from_bytes(&redeem_script);

        tracing::trace!(target: LOG_TARGET, "Evaluating P2SH redeem script {redeem_script:?}");

        let success = eval_script(
            &mut p2sh_stack,
            redeem_script,
            flags,
            checker,
            SigVersion::Base,
            &mut ScriptExecutionData::default(),
        )?;

        if !success {
            return Err(Error::EvalFalse);
        }

        // P2SH witness program
        if flags.verify_witness() {
            if let Some((version, program)) = witness_program(redeem_script.as_bytes()) {
                if script_sig.as_bytes() != push_data_script(redeem_script.as_bytes()) {
                    // The scriptSig must be _exactly_ a single push of the redeemScript. Otherwise
                    // we reintroduce malleability.
                    return Err(Error::WitnessMalleatedP2SH);
                }

                had_witness = true;

                verify_witness_program(witness, version, program, flags, checker, true)?;

                // Bypass the cleanstack check at the end. The actual stack is obviously not clean
                // for witness programs.
                p2sh_stack.truncate(1);
            }
        }

        stack = p2sh_stack;
    }

    // The CLEANSTACK check is only performed after potential P2SH evaluation,
    // as the non-P2SH evaluation of a P2SH script will obviously not result in
    // a clean stack (the P2SH inputs remain). The same holds for witness evaluation.
    if flags.intersects(VerifyFlags::CLEANSTACK) && stack.len() != 1 {
        return Err(Error::CleanStack);
    }

    if flags.verify_witness() && !had_witness && !witness.is_empty() {
        // We can't check for correct unexpected witness data if P2SH was off, so require
        // that WITNESS implies P2SH. Otherwise, going from WITNESS->P2SH+WITNESS would be
        // possible, which is not a softfork.
        return Err(Error::WitnessUnexpected);
    }

    // Only return Ok(()) at the end after all checks pass.
    Ok(())
}

fn verify_witness_program<SC: SignatureChecker>(
    witness: &Witness,
    version: u8,
    program: &[u8],
    flags: &VerifyFlags,
    checker: &mut SC,
    is_p2sh: bool,
) -> Result<(), Error> {
    let mut stack = witness.to_vec();

    tracing::debug!(
        target: LOG_TARGET,
        "Verifying witness v{version} program {}, {} witness items, p2sh: {is_p2sh}",
        hex::encode(program),
        stack.len(),
    );

    if version == 0 {
        match program.len() {
            WITNESS_V0_SCRIPTHASH_SIZE => {
                // BIP141 P2WSH: 32-byte witness v0 program (which encodes SHA256(script))
                let Some(script_bytes) = stack.pop() else {
                    return Err(Error::WitnessProgramWitnessEmpty);
                };

                if sha256(&script_bytes).as_slice() != program {
                    return Err(Error::WitnessProgramMismatch);
                }

                execute_witness_script(
                    stack,
                    Script::from_bytes(&script_bytes),
                    flags,
                    SigVersion::WitnessV0,
                    checker,
                    &mut ScriptExecutionData::default(),
                )
            }
            WITNESS_V0_KEYHASH_SIZE => {
                // BIP141 P2WPKH: 20-byte witness v0 program (which encodes Hash160(pubkey))
                if stack.len() != 2 {
                    return Err(Error::WitnessProgramMismatch);
                }

                let mut exec_script = vec![Opcode::OP_DUP.to_u8(), Opcode::OP_HASH160.to_u8()];
                exec_script.extend(push_data_script(program));
                exec_script.push(Opcode::OP_EQUALVERIFY.to_u8());
                exec_script.push(Opcode::OP_CHECKSIG.to_u8());

                execute_witness_script(
                    stack,
                    Script::from_bytes(&exec_script),
                    flags,
                    SigVersion::WitnessV0,
                    checker,
                    &mut ScriptExecutionData::default(),
                )
            }
            _ => Err(Error::WitnessProgramWrongLength),
        }
    } else if version == 1 && program.len() == WITNESS_V1_TAPROOT_SIZE && !is_p2sh {
        // BIP 341 Taproot: 32-byte non-P2SH witness v1 program (which encodes a P2C-tweaked pubkey)
        if !flags.verify_taproot() {
            return Ok(());
        }

        if stack.is_empty() {
            return Err(Error::WitnessProgramWitnessEmpty);
        }

        let mut exec_data = ScriptExecutionData::default();

        if stack.len() >= 2 && stack.last().is_some_and(|item| item.first() == Some(&ANNEX_TAG)) {
            // Drop annex (this is non-standard; see IsWitnessStandard)
            if let Some(annex) = stack.pop() {
                let mut data = compact_size(annex.len());
                data.extend(annex);
                exec_data.annex = Some(AnnexInfo { hash: sha256(&data) });
            }
        }

        if stack.len() == 1 {
            // Key path spending (stack size is 1 after removing optional annex)
            checker.check_schnorr_signature(
                &stack[0],
                program,
                SigVersion::Taproot,
                &mut exec_data,
            )?;
            return Ok(());
        }

        // Script path spending (stack size is >1 after removing optional annex)
        let (Some(control), Some(script)) = (stack.pop(), stack.pop()) else {
            return Err(Error::WitnessProgramWitnessEmpty);
        };

        if control.len() < TAPROOT_CONTROL_BASE_SIZE
            || control.len() > TAPROOT_CONTROL_MAX_SIZE
            || (control.len() - TAPROOT_CONTROL_BASE_SIZE) % TAPROOT_CONTROL_NODE_SIZE != 0
        {
            return Err(Error::TaprootWrongControlSize);
        }

        let leaf_version = control[0] & TAPROOT_LEAF_MASK;
        let leaf_hash = tapleaf_hash(leaf_version, &script);
        exec_data.tapleaf_hash = Some(leaf_hash);

        if !verify_taproot_commitment(&*checker, &control, program, &leaf_hash) {
            return Err(Error::WitnessProgramMismatch);
        }

        if leaf_version == TAPROOT_LEAF_TAPSCRIPT {
            // Tapscript (leaf version 0xc0)
            exec_data.validation_weight_left =
                Some(serialize(witness).len() as i64 + VALIDATION_WEIGHT_OFFSET);

            return execute_witness_script(
                stack,
                Script::from_bytes(&script),
                flags,
                SigVersion::Tapscript,
                checker,
                &mut exec_data,
            );
        }

        if flags.intersects(VerifyFlags::DISCOURAGE_UPGRADABLE_TAPROOT_VERSION) {
            return Err(Error::DiscourageUpgradableTaprootVersion);
        }

        // Future softforks may introduce new script versions, unknown ones succeed.
        Ok(())
    } else if flags.intersects(VerifyFlags::DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM) {
        Err(Error::DiscourageUpgradableWitnessProgram)
    } else {
        // Other version/size/p2sh combinations return true for future softfork compatibility
        Ok(())
    }
}

/// Checks that the output key `program` commits to `tapleaf_hash` through the
/// merkle path and internal key carried by `control`.
fn verify_taproot_commitment<SC: SignatureChecker>(
    checker: &SC,
    control: &[u8],
    program: &[u8],
    tapleaf_hash: &[u8; 32],
) -> bool {
    let Ok(internal_key) =
        XOnlyPublicKey::from_slice(&control[1..TAPROOT_CONTROL_BASE_SIZE])
    else {
        return false;
    };

    let Ok(output_key) = XOnlyPublicKey::from_slice(program) else {
        return false;
    };

    // Compute the Merkle root from the leaf and the provided path.
    let mut merkle_root = *tapleaf_hash;
    for node in control[TAPROOT_CONTROL_BASE_SIZE..].chunks_exact(TAPROOT_CONTROL_NODE_SIZE) {
        let Ok(node) = <&[u8; 32]>::try_from(node) else {
            return false;
        };
        merkle_root = tapbranch_hash(&merkle_root, node);
    }

    let tweak = taptweak_hash(&internal_key.serialize(), Some(&merkle_root));
    let Ok(tweak) = Scalar::from_be_bytes(tweak) else {
        return false;
    };

    let parity = if control[0] & 1 == 1 {
        Parity::Odd
    } else {
        Parity::Even
    };

    checker.check_taproot_commitment(&internal_key, &output_key, parity, tweak)
}

fn execute_witness_script<SC: SignatureChecker>(
    stack: Vec<Vec<u8>>,
    exec_script: &Script,
    flags: &VerifyFlags,
    sig_version: SigVersion,
    checker: &mut SC,
    exec_data: &mut ScriptExecutionData,
) -> Result<(), Error> {
    let mut stack = Stack::new(stack, flags.verify_minimaldata());

    if sig_version == SigVersion::Tapscript {
        // OP_SUCCESSx processing overrides everything, including stack element size limits
        for operation in Parser::new(exec_script) {
            let operation = operation.map_err(|_| Error::BadOpcode)?;

            // New opcodes will be listed here. May use a different sigversion to modify existing opcodes.
            if !operation.is_push() && is_op_success(operation.opcode()) {
                if flags.intersects(VerifyFlags::DISCOURAGE_OP_SUCCESS) {
                    return Err(Error::DiscourageOpSuccess);
                }
                return Ok(());
            }
        }

        // Tapscript enforces initial stack size limits (altstack is empty here)
        if stack.len() > MAX_STACK_SIZE {
            return Err(Error::StackSize);
        }
    }

    // Disallow stack item size > MAX_SCRIPT_ELEMENT_SIZE in witness stack
    if stack.iter().any(|elem| elem.len() > MAX_SCRIPT_ELEMENT_SIZE) {
        return Err(Error::PushSize);
    }

    // Run the script interpreter.
    eval_script(&mut stack, exec_script, flags, checker, sig_version, exec_data)?;

    // Scripts inside witness implicitly require cleanstack behavior
    if stack.len() != 1 {
        return Err(Error::CleanStack);
    }

    if !stack.peek_bool()? {
        return Err(Error::EvalFalse);
    }

    Ok(())
}

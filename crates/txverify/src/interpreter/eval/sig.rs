use crate::constants::VALIDATION_WEIGHT_PER_SIGOP_PASSED;
use crate::error::Error;
use crate::script::{find_and_delete, push_data_script};
use crate::signature::{check_pubkey_encoding, check_signature_encoding};
use crate::signature_checker::SignatureChecker;
use crate::{ScriptExecutionData, SigVersion, VerifyFlags};

/// Evaluates OP_CHECKSIG, OP_CHECKSIGVERIFY and the signature part of OP_CHECKSIGADD.
///
/// `script_code` is the executed script from the last OP_CODESEPARATOR on.
pub(super) fn eval_checksig(
    sig: &[u8],
    pubkey: &[u8],
    script_code: &[u8],
    exec_data: &mut ScriptExecutionData,
    flags: &VerifyFlags,
    checker: &mut impl SignatureChecker,
    sig_version: SigVersion,
) -> Result<bool, Error> {
    match sig_version {
        SigVersion::Base | SigVersion::WitnessV0 => {
            eval_checksig_pre_tapscript(sig, pubkey, script_code, flags, checker, sig_version)
        }
        SigVersion::Tapscript => {
            eval_checksig_tapscript(sig, pubkey, exec_data, flags, checker, sig_version)
        }
        SigVersion::Taproot => Err(Error::NoScriptExecution),
    }
}

fn eval_checksig_pre_tapscript(
    sig: &[u8],
    pubkey: &[u8],
    script_code: &[u8],
    flags: &VerifyFlags,
    checker: &mut impl SignatureChecker,
    sig_version: SigVersion,
) -> Result<bool, Error> {
    let mut script_code = script_code.to_vec();

    // Drop the signature in pre-segwit scripts but not segwit scripts
    if sig_version == SigVersion::Base {
        let found = find_and_delete(&mut script_code, &push_data_script(sig));
        if found > 0 && flags.intersects(VerifyFlags::CONST_SCRIPTCODE) {
            return Err(Error::SigFindAndDelete);
        }
    }

    check_signature_encoding(sig, flags)?;
    check_pubkey_encoding(pubkey, flags, sig_version)?;

    let success = checker.check_ecdsa_signature(sig, pubkey, &script_code, sig_version);

    if !success && flags.intersects(VerifyFlags::NULLFAIL) && !sig.is_empty() {
        return Err(Error::NullFail);
    }

    Ok(success)
}

fn eval_checksig_tapscript(
    sig: &[u8],
    pubkey: &[u8],
    exec_data: &mut ScriptExecutionData,
    flags: &VerifyFlags,
    checker: &mut impl SignatureChecker,
    sig_version: SigVersion,
) -> Result<bool, Error> {
    // The following validation sequence is consensus critical. Please note how --
    //    upgradable public key versions precede other rules;
    //    the script execution fails when using empty signature with invalid public key;
    //    the script execution fails when using non-empty invalid signature.
    let success = !sig.is_empty();

    if success {
        // Implement the sigops/witnesssize ratio test.
        // Passing with an upgradable public key version is also counted.
        let weight_left =
            exec_data.validation_weight_left.unwrap_or(0) - VALIDATION_WEIGHT_PER_SIGOP_PASSED;
        exec_data.validation_weight_left = Some(weight_left);
        if weight_left < 0 {
            return Err(Error::TaprootValidationWeight);
        }
    }

    if pubkey.is_empty() {
        return Err(Error::TaprootEmptyPubkey);
    } else if pubkey.len() == 32 {
        if success {
            checker.check_schnorr_signature(sig, pubkey, sig_version, exec_data)?;
        }
    } else {
        // New public key version softforks should be defined before this `else` block.
        // Generally, the new code should not do anything but failing the script execution. To avoid
        // consensus bugs, it should not modify any existing values (including `success`).
        if flags.intersects(VerifyFlags::DISCOURAGE_UPGRADABLE_PUBKEYTYPE) {
            return Err(Error::DiscourageUpgradablePubkeyType);
        }
    }

    Ok(success)
}

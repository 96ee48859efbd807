use crate::constants::{MAX_OPS_PER_SCRIPT, MAX_PUBKEYS_PER_MULTISIG};
use crate::error::Error;
use crate::script::{find_and_delete, push_data_script};
use crate::signature::{check_pubkey_encoding, check_signature_encoding};
use crate::signature_checker::SignatureChecker;
use crate::stack::Stack;
use crate::{SigVersion, VerifyFlags};

/// Evaluates OP_CHECKMULTISIG and OP_CHECKMULTISIGVERIFY.
///
/// Consumes `([dummy] [sig ...] num_of_signatures [pubkey ...] num_of_pubkeys)`
/// from `stack` and returns whether every signature matched a public key.
pub(super) fn eval_checkmultisig(
    stack: &mut Stack,
    script_code: &[u8],
    flags: &VerifyFlags,
    checker: &mut impl SignatureChecker,
    sig_version: SigVersion,
    op_count: &mut usize,
) -> Result<bool, Error> {
    if sig_version == SigVersion::Tapscript {
        return Err(Error::TaprootCheckmultisig);
    }

    let keys_count = stack.pop_num()?.value();
    if keys_count < 0 || keys_count > i64::from(MAX_PUBKEYS_PER_MULTISIG) {
        return Err(Error::PubkeyCount);
    }

    let keys_count = keys_count as usize;

    *op_count += keys_count;
    if *op_count > MAX_OPS_PER_SCRIPT {
        return Err(Error::OpCount);
    }

    // keys[0] is the topmost key.
    let keys = (0..keys_count)
        .map(|_| stack.pop())
        .collect::<Result<Vec<_>, _>>()?;

    let sigs_count = stack.pop_num()?.value();
    if sigs_count < 0 || sigs_count > keys_count as i64 {
        return Err(Error::SigCount);
    }

    let sigs_count = sigs_count as usize;

    let sigs = (0..sigs_count)
        .map(|_| stack.pop())
        .collect::<Result<Vec<_>, _>>()?;

    // A bug in the original Satoshi client implementation means one more
    // stack value than should be used must be popped (and ignored).
    let dummy = stack.pop()?;

    let mut script_code = script_code.to_vec();

    // Drop the signature in pre-segwit scripts but not segwit scripts
    if sig_version == SigVersion::Base {
        for sig in &sigs {
            let found = find_and_delete(&mut script_code, &push_data_script(sig));
            if found > 0 && flags.intersects(VerifyFlags::CONST_SCRIPTCODE) {
                return Err(Error::SigFindAndDelete);
            }
        }
    }

    // Both vectors start at the top of the stack, which is where matching starts.
    let mut success = true;
    let mut isig = 0;
    let mut ikey = 0;
    let mut sigs_left = sigs.len();
    let mut keys_left = keys.len();

    while success && sigs_left > 0 {
        let sig = &sigs[isig];
        let key = &keys[ikey];

        // Note how this makes the exact order of pubkey/signature evaluation
        // distinguishable by CHECKMULTISIG NOT if the STRICTENC flag is set.
        // See the script_(in)valid tests for details.
        check_signature_encoding(sig, flags)?;
        check_pubkey_encoding(key, flags, sig_version)?;

        if checker.check_ecdsa_signature(sig, key, &script_code, sig_version) {
            isig += 1;
            sigs_left -= 1;
        }

        ikey += 1;
        keys_left -= 1;

        // If there are more signatures left than keys left,
        // then too many signatures have failed. Exit early,
        // without checking any further signatures.
        if sigs_left > keys_left {
            success = false;
        }
    }

    // If the operation failed, we require that all signatures must be empty vector
    if !success
        && flags.intersects(VerifyFlags::NULLFAIL)
        && sigs.iter().any(|sig| !sig.is_empty())
    {
        return Err(Error::NullFail);
    }

    // BIP 147
    if flags.intersects(VerifyFlags::NULLDUMMY) && !dummy.is_empty() {
        return Err(Error::SigNullDummy);
    }

    Ok(success)
}

use super::{SighashError, TaprootHashes};
use crate::constants::{
    SIGHASH_ALL, SIGHASH_ANYONECANPAY, SIGHASH_DEFAULT, SIGHASH_INPUT_MASK, SIGHASH_OUTPUT_MASK,
    SIGHASH_SINGLE,
};
use crate::hash::{TAG_TAPSIGHASH, sha256, tagged_hash};
use crate::{ScriptExecutionData, SigVersion};
use bitcoin::consensus::encode::serialize;
use bitcoin::{Transaction, TxOut};

/// Sighash epoch, reserved for future extensions of the algorithm.
const EPOCH: u8 = 0x00;

/// Key version committed to by tapscript signatures.
const KEY_VERSION_0: u8 = 0x00;

/// Hash types accepted by BIP 341: 0x00-0x03 and 0x81-0x83.
pub fn is_valid_taproot_hashtype(hash_type: u8) -> bool {
    let base_type = hash_type & !SIGHASH_ANYONECANPAY;
    hash_type <= SIGHASH_SINGLE
        || (hash_type & SIGHASH_ANYONECANPAY != 0
            && (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base_type))
}

/// Computes the BIP 341 signature hash of input `input_index`.
///
/// `sig_version` selects between the key path (`Taproot`) and the script
/// path (`Tapscript`). The script path also commits to the tapleaf hash and
/// the last executed OP_CODESEPARATOR position from `exec_data`. The hash of
/// the output signed by SIGHASH_SINGLE is memoized in `exec_data`.
pub fn taproot_signature_hash(
    tx: &Transaction,
    input_index: usize,
    spent_outputs: &[TxOut],
    hashes: &TaprootHashes,
    hash_type: u8,
    sig_version: SigVersion,
    exec_data: &mut ScriptExecutionData,
) -> Result<[u8; 32], SighashError> {
    let ext_flag: u8 = match sig_version {
        SigVersion::Taproot => 0,
        SigVersion::Tapscript => 1,
        SigVersion::Base | SigVersion::WitnessV0 => {
            return Err(SighashError::UnsupportedSigVersion(sig_version));
        }
    };

    if !is_valid_taproot_hashtype(hash_type) {
        return Err(SighashError::InvalidHashType(hash_type));
    }

    let input = tx
        .input
        .get(input_index)
        .ok_or(SighashError::InputIndexOutOfRange {
            index: input_index,
            inputs: tx.input.len(),
        })?;

    let output_type = if hash_type == SIGHASH_DEFAULT {
        SIGHASH_ALL
    } else {
        hash_type & SIGHASH_OUTPUT_MASK
    };
    let anyone_can_pay = hash_type & SIGHASH_INPUT_MASK == SIGHASH_ANYONECANPAY;

    let mut data = Vec::with_capacity(256);
    data.push(EPOCH);

    // Transaction data.
    data.push(hash_type);
    data.extend(tx.version.0.to_le_bytes());
    data.extend(tx.lock_time.to_consensus_u32().to_le_bytes());
    if !anyone_can_pay {
        data.extend(hashes.sha_prevouts);
        data.extend(hashes.sha_amounts);
        data.extend(hashes.sha_scriptpubkeys);
        data.extend(hashes.sha_sequences);
    }
    if output_type == SIGHASH_ALL {
        data.extend(hashes.sha_outputs);
    }

    // Data about this input.
    let spend_type = (ext_flag << 1) + u8::from(exec_data.annex.is_some());
    data.push(spend_type);
    if anyone_can_pay {
        let spent = spent_outputs
            .get(input_index)
            .ok_or(SighashError::MissingSpentOutput(input_index))?;
        data.extend(serialize(&input.previous_output));
        data.extend(serialize(spent));
        data.extend(input.sequence.0.to_le_bytes());
    } else {
        data.extend((input_index as u32).to_le_bytes());
    }
    if let Some(annex) = &exec_data.annex {
        data.extend(annex.hash);
    }

    // Data about the output (with SIGHASH_SINGLE).
    if output_type == SIGHASH_SINGLE {
        let output = tx
            .output
            .get(input_index)
            .ok_or(SighashError::SingleWithoutOutput(input_index))?;
        let output_hash = *exec_data
            .output_hash
            .get_or_insert_with(|| sha256(&serialize(output)));
        data.extend(output_hash);
    }

    // Additional data for BIP 342 signatures.
    if ext_flag == 1 {
        let tapleaf_hash = exec_data
            .tapleaf_hash
            .ok_or(SighashError::MissingTapleafHash)?;
        data.extend(tapleaf_hash);
        data.push(KEY_VERSION_0);
        data.extend(exec_data.codeseparator_pos.to_le_bytes());
    }

    Ok(tagged_hash(TAG_TAPSIGHASH, &data))
}

mod multisig;
mod sig;

use crate::constants::{
    MAX_OPS_PER_SCRIPT, MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE, MAX_STACK_SIZE,
    SEQUENCE_LOCKTIME_DISABLE_FLAG,
};
use crate::error::Error;
use crate::hash::{hash160, ripemd160, sha1, sha256, sha256d};
use crate::num::ScriptNum;
use crate::script::{Opcode, Operation, Parser};
use crate::signature_checker::SignatureChecker;
use crate::stack::{Stack, StackError, cast_to_bool};
use crate::{ScriptExecutionData, SigVersion, VerifyFlags};
use bitcoin::Script;

/// Evaluates `script` on top of `stack`.
///
/// Returns whether the script left a true element on top of the stack. An
/// `Err` means execution aborted, `Ok(false)` only tells the caller that the
/// final stack is not a success by itself, which is irrelevant for scripts
/// whose result is consumed by another script (scriptSig).
pub fn eval_script<SC: SignatureChecker>(
    stack: &mut Stack,
    script: &Script,
    flags: &VerifyFlags,
    checker: &mut SC,
    sig_version: SigVersion,
    exec_data: &mut ScriptExecutionData,
) -> Result<bool, Error> {
    use Opcode::*;

    if matches!(sig_version, SigVersion::Taproot) {
        return Err(Error::NoScriptExecution);
    }

    let is_legacy_or_v0 = matches!(sig_version, SigVersion::Base | SigVersion::WitnessV0);

    if is_legacy_or_v0 && script.len() > MAX_SCRIPT_SIZE {
        return Err(Error::ScriptSize);
    }

    let require_minimal = flags.verify_minimaldata();
    stack.set_require_minimal(require_minimal);

    let mut alt_stack = Stack::new(Vec::new(), require_minimal);

    // Create a vector of conditional execution states
    let mut exec_stack: Vec<bool> = Vec::new();

    let mut begincode = 0;
    let mut op_count = 0;
    let mut opcode_pos: u32 = 0;
    exec_data.codeseparator_pos = u32::MAX;

    let mut parser = Parser::new(script);

    while let Some(operation) = parser.next() {
        let operation = operation.map_err(Error::ReadInstruction)?;

        let executing = exec_stack.iter().all(|x| *x);

        match operation {
            Operation::Push { data, .. } => {
                if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(Error::PushSize);
                }

                if executing {
                    if require_minimal && !operation.is_minimal_push() {
                        return Err(Error::MinimalData);
                    }
                    stack.push(data.to_vec());
                }
            }
            Operation::Op(byte) => {
                // Note how OP_RESERVED does not count towards the opcode limit.
                if is_legacy_or_v0 && byte > OP_16.to_u8() {
                    op_count += 1;
                    if op_count > MAX_OPS_PER_SCRIPT {
                        return Err(Error::OpCount);
                    }
                }

                let opcode = Opcode::from_u8(byte);

                // Disabled opcodes fail the script even in an unexecuted branch.
                if let Some(op) = opcode.filter(|op| op.is_disabled()) {
                    return Err(Error::DisabledOpcode(op));
                }

                // With SCRIPT_VERIFY_CONST_SCRIPTCODE, OP_CODESEPARATOR in non-segwit script is rejected even in an unexecuted branch
                if opcode == Some(OP_CODESEPARATOR)
                    && sig_version == SigVersion::Base
                    && flags.intersects(VerifyFlags::CONST_SCRIPTCODE)
                {
                    return Err(Error::OpCodeSeparator);
                }

                // OP_IF through OP_ENDIF run regardless of the branch to keep
                // track of nesting, OP_VERIF and OP_VERNOTIF included.
                let is_conditional = (OP_IF.to_u8()..=OP_ENDIF.to_u8()).contains(&byte);
                if !executing && !is_conditional {
                    opcode_pos += 1;
                    continue;
                }

                let Some(opcode) = opcode else {
                    return Err(Error::BadOpcode);
                };

                match opcode {
                    // Decoded as pushes, never reach here.
                    OP_0 | OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4 => {
                        return Err(Error::BadOpcode);
                    }

                    // Constants
                    OP_1NEGATE | OP_1 | OP_2 | OP_3 | OP_4 | OP_5 | OP_6 | OP_7 | OP_8 | OP_9
                    | OP_10 | OP_11 | OP_12 | OP_13 | OP_14 | OP_15 | OP_16 => {
                        let value = opcode.small_int().ok_or(Error::BadOpcode)?;
                        stack.push_num(value);
                    }

                    // Flow control
                    OP_NOP => {}
                    OP_CHECKLOCKTIMEVERIFY => {
                        if flags.intersects(VerifyFlags::CHECKLOCKTIMEVERIFY) {
                            // Note that elsewhere numeric opcodes are limited to
                            // operands in the range -2**31+1 to 2**31-1, however it is
                            // legal for opcodes to produce results exceeding that
                            // range. This limitation is implemented by CScriptNum's
                            // default 4-byte limit.
                            //
                            // If we kept to that limit we'd have a year 2038 problem,
                            // even though the nLockTime field in transactions
                            // themselves is uint32 which only becomes meaningless
                            // after the year 2106.
                            //
                            // Thus as a special case we tell CScriptNum to accept up
                            // to 5-byte bignums, which are good until 2**39-1, well
                            // beyond the 2**32-1 limit of the nLockTime field itself.
                            let lock_time = stack.peek_num(ScriptNum::LOCKTIME_NUM_SIZE)?;

                            // In the rare event that the argument may be < 0 due to
                            // some arithmetic being done first, you can always use
                            // 0 MAX CHECKLOCKTIMEVERIFY.
                            if lock_time.is_negative() {
                                return Err(Error::NegativeLocktime);
                            }

                            // Actually compare the specified lock time with the transaction.
                            if !checker.check_lock_time(lock_time) {
                                return Err(Error::UnsatisfiedLocktime);
                            }
                        }
                        // Otherwise not enabled, treat as a NOP2.
                    }
                    OP_CHECKSEQUENCEVERIFY => {
                        if flags.intersects(VerifyFlags::CHECKSEQUENCEVERIFY) {
                            // nSequence, like nLockTime, is a 32-bit unsigned integer
                            // field. See the comment in CHECKLOCKTIMEVERIFY regarding
                            // 5-byte numeric operands.
                            let sequence = stack.peek_num(ScriptNum::LOCKTIME_NUM_SIZE)?;

                            // In the rare event that the argument may be < 0 due to
                            // some arithmetic being done first, you can always use
                            // 0 MAX CHECKSEQUENCEVERIFY.
                            if sequence.is_negative() {
                                return Err(Error::NegativeLocktime);
                            }

                            // To provide for future soft-fork extensibility, if the
                            // operand has the disabled lock-time flag set,
                            // CHECKSEQUENCEVERIFY behaves as a NOP.
                            if sequence.value() & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG) == 0
                                && !checker.check_sequence(sequence)
                            {
                                return Err(Error::UnsatisfiedLocktime);
                            }
                        }
                        // Otherwise not enabled, treat as a NOP3.
                    }
                    OP_NOP1 | OP_NOP4 | OP_NOP5 | OP_NOP6 | OP_NOP7 | OP_NOP8 | OP_NOP9
                    | OP_NOP10 => {
                        if flags.intersects(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                            return Err(Error::DiscourageUpgradableNops);
                        }
                    }
                    OP_IF | OP_NOTIF => {
                        let mut value = false;

                        if executing {
                            let top = stack.pop().map_err(|_| Error::UnbalancedConditional)?;

                            // Tapscript requires minimal IF/NOTIF inputs as a consensus rule.
                            if sig_version == SigVersion::Tapscript {
                                // The input argument to the OP_IF and OP_NOTIF opcodes must be either
                                // exactly 0 (the empty vector) or exactly 1 (the one-byte vector with value 1).
                                if !is_minimal_if_operand(&top) {
                                    return Err(Error::TaprootMinimalif);
                                }
                            }

                            // Under witness v0 rules it is only a policy rule, enabled through SCRIPT_VERIFY_MINIMALIF.
                            if sig_version == SigVersion::WitnessV0
                                && flags.intersects(VerifyFlags::MINIMALIF)
                                && !is_minimal_if_operand(&top)
                            {
                                return Err(Error::Minimalif);
                            }

                            value = cast_to_bool(&top);

                            if opcode == OP_NOTIF {
                                value = !value;
                            }
                        }

                        exec_stack.push(value);
                    }
                    OP_ELSE => {
                        // Toggle top.
                        let Some(last) = exec_stack.last_mut() else {
                            return Err(Error::UnbalancedConditional);
                        };
                        *last = !*last;
                    }
                    OP_ENDIF => {
                        if exec_stack.pop().is_none() {
                            return Err(Error::UnbalancedConditional);
                        }
                    }
                    OP_VERIFY => {
                        if !stack.pop_bool()? {
                            return Err(Error::Verify(opcode));
                        }
                    }
                    OP_RETURN => return Err(Error::OpReturn),

                    // Stack
                    OP_TOALTSTACK => {
                        let value = stack.pop()?;
                        alt_stack.push(value);
                    }
                    OP_FROMALTSTACK => {
                        let value = alt_stack
                            .pop()
                            .map_err(|_| Error::InvalidAltStackOperation)?;
                        stack.push(value);
                    }
                    OP_2DROP => stack.drop(2)?,
                    OP_2DUP => stack.dup(2)?,
                    OP_3DUP => stack.dup(3)?,
                    OP_2OVER => stack.over(2)?,
                    OP_2ROT => stack.rot(2)?,
                    OP_2SWAP => stack.swap(2)?,
                    OP_IFDUP => {
                        if stack.peek_bool()? {
                            stack.dup(1)?;
                        }
                    }
                    OP_DEPTH => {
                        // Push the current number of stack items onto the stack.
                        let depth = stack.len() as i64;
                        stack.push_num(depth);
                    }
                    OP_DROP => stack.drop(1)?,
                    OP_DUP => stack.dup(1)?,
                    OP_NIP => stack.nip()?,
                    OP_OVER => stack.over(1)?,
                    OP_PICK | OP_ROLL => {
                        // Pop the top stack element as N.
                        let n = stack.pop_num()?.value();
                        if n < 0 || n >= stack.len() as i64 {
                            return Err(StackError::InvalidOperation.into());
                        }
                        let v = if opcode == OP_PICK {
                            // Copy the Nth stack element to the top.
                            stack.top(n as usize)?.clone()
                        } else {
                            // Move the Nth stack element to the top.
                            stack.remove(n as usize)?
                        };
                        stack.push(v);
                    }
                    OP_ROT => stack.rot(1)?,
                    OP_SWAP => stack.swap(1)?,
                    OP_TUCK => stack.tuck()?,

                    // Splice
                    OP_SIZE => {
                        let size = stack.last()?.len() as i64;
                        stack.push_num(size);
                    }

                    // Bitwise logic
                    OP_EQUAL => {
                        let equal = stack.pop()? == stack.pop()?;
                        stack.push_bool(equal);
                    }
                    OP_EQUALVERIFY => {
                        let equal = stack.pop()? == stack.pop()?;
                        if !equal {
                            return Err(Error::Verify(opcode));
                        }
                    }

                    // Arithmetic
                    OP_1ADD => {
                        let n = (stack.pop_num()? + ScriptNum::from(1))?;
                        stack.push_num(n);
                    }
                    OP_1SUB => {
                        let n = (stack.pop_num()? - ScriptNum::from(1))?;
                        stack.push_num(n);
                    }
                    OP_NEGATE => {
                        let n = (-stack.pop_num()?)?;
                        stack.push_num(n);
                    }
                    OP_ABS => {
                        let n = stack.pop_num()?.abs();
                        stack.push_num(n);
                    }
                    OP_NOT => {
                        let n = stack.pop_num()?.is_zero();
                        stack.push_num(n);
                    }
                    OP_0NOTEQUAL => {
                        let n = !stack.pop_num()?.is_zero();
                        stack.push_num(n);
                    }
                    OP_ADD => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num((v2 + v1)?);
                    }
                    OP_SUB => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num((v2 - v1)?);
                    }
                    OP_BOOLAND => {
                        let v1 = !stack.pop_num()?.is_zero();
                        let v2 = !stack.pop_num()?.is_zero();
                        stack.push_num(v1 && v2);
                    }
                    OP_BOOLOR => {
                        let v1 = !stack.pop_num()?.is_zero();
                        let v2 = !stack.pop_num()?.is_zero();
                        stack.push_num(v1 || v2);
                    }
                    OP_NUMEQUAL => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v1 == v2);
                    }
                    OP_NUMEQUALVERIFY => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        if v1 != v2 {
                            return Err(Error::Verify(opcode));
                        }
                    }
                    OP_NUMNOTEQUAL => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v1 != v2);
                    }
                    OP_LESSTHAN => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v2 < v1);
                    }
                    OP_GREATERTHAN => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v2 > v1);
                    }
                    OP_LESSTHANOREQUAL => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v2 <= v1);
                    }
                    OP_GREATERTHANOREQUAL => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v2 >= v1);
                    }
                    OP_MIN => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v1.min(v2));
                    }
                    OP_MAX => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v1.max(v2));
                    }
                    OP_WITHIN => {
                        // [v3 v2 v1] = [x min max]
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        let v3 = stack.pop_num()?;
                        stack.push_bool((v2..v1).contains(&v3));
                    }

                    // Crypto
                    OP_RIPEMD160 => {
                        let v = ripemd160(&stack.pop()?);
                        stack.push(v.to_vec());
                    }
                    OP_SHA1 => {
                        let v = sha1(&stack.pop()?);
                        stack.push(v.to_vec());
                    }
                    OP_SHA256 => {
                        let v = sha256(&stack.pop()?);
                        stack.push(v.to_vec());
                    }
                    OP_HASH160 => {
                        let v = hash160(&stack.pop()?);
                        stack.push(v.to_vec());
                    }
                    OP_HASH256 => {
                        let v = sha256d(&stack.pop()?);
                        stack.push(v.to_vec());
                    }
                    OP_CODESEPARATOR => {
                        // Hash starts after the code separator
                        begincode = parser.position();
                        exec_data.codeseparator_pos = opcode_pos;
                    }
                    OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                        // [sig pubkey] -> bool
                        let pubkey = stack.pop()?;
                        let sig = stack.pop()?;

                        let success = sig::eval_checksig(
                            &sig,
                            &pubkey,
                            &script.as_bytes()[begincode..],
                            exec_data,
                            flags,
                            checker,
                            sig_version,
                        )?;

                        if opcode == OP_CHECKSIG {
                            stack.push_bool(success);
                        } else if !success {
                            return Err(Error::Verify(opcode));
                        }
                    }
                    OP_CHECKSIGADD => {
                        // OP_CHECKSIGADD is only available in Tapscript
                        if is_legacy_or_v0 {
                            return Err(Error::BadOpcode);
                        }

                        // (sig num pubkey -- num)
                        stack.require(3)?;

                        let pubkey = stack.pop()?;
                        let num = stack.pop_num()?;
                        let sig = stack.pop()?;

                        let success = sig::eval_checksig(
                            &sig,
                            &pubkey,
                            &script.as_bytes()[begincode..],
                            exec_data,
                            flags,
                            checker,
                            sig_version,
                        )?;

                        stack.push_num((num + ScriptNum::from(success))?);
                    }
                    OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                        let success = multisig::eval_checkmultisig(
                            stack,
                            &script.as_bytes()[begincode..],
                            flags,
                            checker,
                            sig_version,
                            &mut op_count,
                        )?;

                        if opcode == OP_CHECKMULTISIG {
                            stack.push_bool(success);
                        } else if !success {
                            return Err(Error::Verify(opcode));
                        }
                    }

                    // Reserved words, and the disabled opcodes rejected above.
                    OP_RESERVED | OP_VER | OP_VERIF | OP_VERNOTIF | OP_RESERVED1
                    | OP_RESERVED2 | OP_CAT | OP_SUBSTR | OP_LEFT | OP_RIGHT | OP_INVERT
                    | OP_AND | OP_OR | OP_XOR | OP_2MUL | OP_2DIV | OP_MUL | OP_DIV | OP_MOD
                    | OP_LSHIFT | OP_RSHIFT => return Err(Error::BadOpcode),
                }
            }
        }

        opcode_pos += 1;

        // Size limits
        if stack.len() + alt_stack.len() > MAX_STACK_SIZE {
            return Err(Error::StackSize);
        }
    }

    if !exec_stack.is_empty() {
        return Err(Error::UnbalancedConditional);
    }

    let success = !stack.is_empty() && stack.peek_bool()?;

    tracing::trace!(
        target: crate::LOG_TARGET,
        "Evaluated {sig_version:?} script, {op_count} ops, stack: {stack}",
    );

    Ok(success)
}

/// Empty vector or exactly `[0x01]`.
fn is_minimal_if_operand(value: &[u8]) -> bool {
    value.is_empty() || value == [1]
}

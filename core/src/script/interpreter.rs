//! The stack-based Script evaluator (spec §4.1). Executes a single
//! script against a value stack, failing closed on stack underflow,
//! disabled opcodes, oversized scripts/pushes, or too many non-push
//! operations.

use failure_derive::Fail;

use super::opcodes::Opcode;

/// Hard limits a script must respect to be evaluated at all.
pub const MAX_SCRIPT_SIZE: usize = 10_000;
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
pub const MAX_OPS_PER_SCRIPT: usize = 201;
pub const MAX_STACK_SIZE: usize = 1_000;

#[derive(Debug, Fail, PartialEq, Eq, Clone)]
pub enum ScriptError {
	#[fail(display = "script exceeds {} bytes", _0)]
	ScriptTooLarge(usize),
	#[fail(display = "push of {} bytes exceeds the {} byte element limit", _0, MAX_SCRIPT_ELEMENT_SIZE)]
	PushTooLarge(usize),
	#[fail(display = "script has more than {} non-push operations", MAX_OPS_PER_SCRIPT)]
	TooManyOps,
	#[fail(display = "stack underflow")]
	StackUnderflow,
	#[fail(display = "stack exceeded {} elements", MAX_STACK_SIZE)]
	StackOverflow,
	#[fail(display = "disabled opcode encountered")]
	DisabledOpcode,
	#[fail(display = "unbalanced IF/ELSE/ENDIF")]
	UnbalancedConditional,
	#[fail(display = "OP_VERIFY / OP_EQUALVERIFY / OP_NUMEQUALVERIFY failed")]
	VerifyFailed,
	#[fail(display = "OP_RETURN encountered")]
	ReturnEncountered,
	#[fail(display = "script did not leave exactly one truthy value on the stack")]
	CleanStackFailed,
	#[fail(display = "invalid number encoding")]
	InvalidNumber,
	#[fail(display = "P2SH recursion into another P2SH script is forbidden")]
	P2shRecursion,
	#[fail(display = "invalid signature or public key encoding")]
	InvalidSignatureEncoding,
}

/// What the evaluator should do after handing an opcode to an
/// `EvalHook` (spec §4.1, DESIGN NOTES "Script evaluator polymorphism").
pub enum HookResult {
	/// The hook did not recognize the opcode; fall back to the default
	/// table. Default opcodes are always attempted first, so a hook only
	/// ever sees opcodes this evaluator doesn't already implement.
	Continue,
	/// The hook fully handled the opcode; `bool` is whether evaluation
	/// should keep going (true) or fail immediately (false).
	Done(bool),
}

/// Extension point so alt-chains can add opcodes (e.g. name operations,
/// auxiliary PoW) without forking the evaluator itself.
pub trait EvalHook {
	fn try_eval(&self, op: u8, stack: &mut Vec<Vec<u8>>) -> HookResult;
}

/// The default hook: recognizes nothing, so every opcode falls through
/// to the standard table. Used whenever no alt-chain extension applies.
pub struct NoopHook;

impl EvalHook for NoopHook {
	fn try_eval(&self, _op: u8, _stack: &mut Vec<Vec<u8>>) -> HookResult {
		HookResult::Continue
	}
}

/// Signature and locktime checks are delegated to the caller, since they
/// need the enclosing transaction and the output being spent, neither of
/// which the evaluator itself holds.
pub trait SignatureChecker {
	/// Verifies `sig` (DER ECDSA + sighash byte) against `pubkey` for the
	/// script `script_code` (spec §4.1's substituted-input sighash).
	fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &[u8]) -> bool;
	/// `OP_CHECKLOCKTIMEVERIFY`: is the referenced locktime satisfied by
	/// this input's containing transaction?
	fn check_locktime(&self, locktime: i64) -> bool;
}

/// A checker that always fails; used to evaluate scripts when no
/// signature context is available (e.g. solely inspecting templates).
pub struct RejectingChecker;

impl SignatureChecker for RejectingChecker {
	fn check_sig(&self, _sig: &[u8], _pubkey: &[u8], _script_code: &[u8]) -> bool {
		false
	}
	fn check_locktime(&self, _locktime: i64) -> bool {
		false
	}
}

fn cast_to_bool(v: &[u8]) -> bool {
	for (i, &b) in v.iter().enumerate() {
		if b != 0 {
			// negative zero (-0) encoded as a trailing 0x80 is still falsy
			if i == v.len() - 1 && b == 0x80 {
				return false;
			}
			return true;
		}
	}
	false
}

/// Minimal CScriptNum-style decode: little-endian, sign-magnitude in the
/// top bit of the last byte, 4-byte operating range (spec §4.1).
fn decode_num(v: &[u8]) -> Result<i64, ScriptError> {
	if v.is_empty() {
		return Ok(0);
	}
	if v.len() > 4 {
		return Err(ScriptError::InvalidNumber);
	}
	let mut result: i64 = 0;
	for (i, &b) in v.iter().enumerate() {
		result |= (b as i64) << (8 * i);
	}
	if v[v.len() - 1] & 0x80 != 0 {
		result &= !(0x80i64 << (8 * (v.len() - 1)));
		result = -result;
	}
	Ok(result)
}

fn encode_num(n: i64) -> Vec<u8> {
	if n == 0 {
		return Vec::new();
	}
	let neg = n < 0;
	let mut abs = n.unsigned_abs();
	let mut bytes = Vec::new();
	while abs != 0 {
		bytes.push((abs & 0xff) as u8);
		abs >>= 8;
	}
	if bytes.last().map(|b| b & 0x80 != 0).unwrap_or(false) {
		bytes.push(if neg { 0x80 } else { 0 });
	} else if neg {
		let last = bytes.last_mut().unwrap();
		*last |= 0x80;
	}
	bytes
}

struct ConditionalFrame {
	executing: bool,
	seen_else: bool,
}

/// Executes `script` against `stack` in place. `stack` is shared across
/// the `script_sig` / `script_pubkey` pair so P2PK/P2PKH-style templates
/// can leave the unlocking data for the locking script to consume.
pub fn eval_script(
	script: &[u8],
	stack: &mut Vec<Vec<u8>>,
	checker: &dyn SignatureChecker,
	hook: &dyn EvalHook,
) -> Result<(), ScriptError> {
	if script.len() > MAX_SCRIPT_SIZE {
		return Err(ScriptError::ScriptTooLarge(script.len()));
	}

	let mut alt_stack: Vec<Vec<u8>> = Vec::new();
	let mut conditionals: Vec<ConditionalFrame> = Vec::new();
	let mut op_count = 0usize;
	let mut pc = 0usize;

	macro_rules! pop {
		() => {
			stack.pop().ok_or(ScriptError::StackUnderflow)?
		};
	}

	while pc < script.len() {
		let executing = conditionals.iter().all(|f| f.executing);
		let byte = script[pc];
		pc += 1;

		// push-data opcodes are handled before the executing check only
		// insofar as we must still advance `pc` correctly even inside a
		// non-executing branch.
		if byte <= 0x4e {
			let (len, consumed) = match byte {
				0x00 => (0usize, 0usize),
				0x01..=0x4b => (byte as usize, 0),
				0x4c => {
					let n = *script.get(pc).ok_or(ScriptError::StackUnderflow)? as usize;
					(n, 1)
				}
				0x4d => {
					let hi = *script.get(pc + 1).ok_or(ScriptError::StackUnderflow)? as usize;
					let lo = *script.get(pc).ok_or(ScriptError::StackUnderflow)? as usize;
					(lo | (hi << 8), 2)
				}
				_ => {
					let b = &script[pc..pc + 4.min(script.len() - pc)];
					if b.len() < 4 {
						return Err(ScriptError::StackUnderflow);
					}
					(
						(b[0] as usize) | (b[1] as usize) << 8 | (b[2] as usize) << 16 | (b[3] as usize) << 24,
						4,
					)
				}
			};
			pc += consumed;
			if len > MAX_SCRIPT_ELEMENT_SIZE {
				return Err(ScriptError::PushTooLarge(len));
			}
			if pc + len > script.len() {
				return Err(ScriptError::StackUnderflow);
			}
			if executing {
				if byte == 0x00 {
					stack.push(Vec::new());
				} else {
					stack.push(script[pc..pc + len].to_vec());
				}
			}
			pc += len;
			continue;
		}

		op_count += 1;
		if op_count > MAX_OPS_PER_SCRIPT {
			return Err(ScriptError::TooManyOps);
		}

		let op = Opcode::from_byte(byte);

		// flow control opcodes run regardless of `executing` so IF/ENDIF
		// nesting can be tracked inside a skipped branch.
		match op {
			Opcode::OP_IF | Opcode::OP_NOTIF => {
				let mut value = false;
				if executing {
					let top = pop!();
					value = cast_to_bool(&top);
					if op == Opcode::OP_NOTIF {
						value = !value;
					}
				}
				conditionals.push(ConditionalFrame { executing: value, seen_else: false });
				continue;
			}
			Opcode::OP_ELSE => {
				let frame = conditionals.last_mut().ok_or(ScriptError::UnbalancedConditional)?;
				if frame.seen_else {
					return Err(ScriptError::UnbalancedConditional);
				}
				frame.executing = !frame.executing;
				frame.seen_else = true;
				continue;
			}
			Opcode::OP_ENDIF => {
				conditionals.pop().ok_or(ScriptError::UnbalancedConditional)?;
				continue;
			}
			_ => {}
		}

		if !executing {
			continue;
		}

		match hook.try_eval(byte, stack) {
			HookResult::Done(ok) => {
				if !ok {
					return Err(ScriptError::VerifyFailed);
				}
				continue;
			}
			HookResult::Continue => {}
		}

		match op {
			Opcode::OP_0 | Opcode::PushBytes(_) | Opcode::OP_PUSHDATA1 | Opcode::OP_PUSHDATA2 | Opcode::OP_PUSHDATA4 => {
				unreachable!("push opcodes handled above")
			}
			Opcode::OP_1NEGATE => stack.push(encode_num(-1)),
			Opcode::OP_N(n) => stack.push(encode_num(n as i64)),
			Opcode::OP_RESERVED => return Err(ScriptError::DisabledOpcode),
			Opcode::OP_NOP => {}
			Opcode::OP_VERIFY => {
				let top = pop!();
				if !cast_to_bool(&top) {
					return Err(ScriptError::VerifyFailed);
				}
			}
			Opcode::OP_RETURN => return Err(ScriptError::ReturnEncountered),
			Opcode::OP_TOALTSTACK => alt_stack.push(pop!()),
			Opcode::OP_FROMALTSTACK => stack.push(alt_stack.pop().ok_or(ScriptError::StackUnderflow)?),
			Opcode::OP_IFDUP => {
				let top = stack.last().ok_or(ScriptError::StackUnderflow)?.clone();
				if cast_to_bool(&top) {
					stack.push(top);
				}
			}
			Opcode::OP_DEPTH => stack.push(encode_num(stack.len() as i64)),
			Opcode::OP_DROP => {
				pop!();
			}
			Opcode::OP_DUP => {
				let top = stack.last().ok_or(ScriptError::StackUnderflow)?.clone();
				stack.push(top);
			}
			Opcode::OP_NIP => {
				let top = pop!();
				pop!();
				stack.push(top);
			}
			Opcode::OP_OVER => {
				if stack.len() < 2 {
					return Err(ScriptError::StackUnderflow);
				}
				let v = stack[stack.len() - 2].clone();
				stack.push(v);
			}
			Opcode::OP_PICK | Opcode::OP_ROLL => {
				let n = decode_num(&pop!())?;
				if n < 0 || n as usize >= stack.len() {
					return Err(ScriptError::StackUnderflow);
				}
				let idx = stack.len() - 1 - n as usize;
				let v = if op == Opcode::OP_ROLL { stack.remove(idx) } else { stack[idx].clone() };
				stack.push(v);
			}
			Opcode::OP_ROT => {
				if stack.len() < 3 {
					return Err(ScriptError::StackUnderflow);
				}
				let v = stack.remove(stack.len() - 3);
				stack.push(v);
			}
			Opcode::OP_SWAP => {
				let len = stack.len();
				if len < 2 {
					return Err(ScriptError::StackUnderflow);
				}
				stack.swap(len - 1, len - 2);
			}
			Opcode::OP_TUCK => {
				if stack.len() < 2 {
					return Err(ScriptError::StackUnderflow);
				}
				let top = stack[stack.len() - 1].clone();
				stack.insert(stack.len() - 2, top);
			}
			Opcode::OP_2DROP => {
				pop!();
				pop!();
			}
			Opcode::OP_2DUP => {
				if stack.len() < 2 {
					return Err(ScriptError::StackUnderflow);
				}
				let (a, b) = (stack[stack.len() - 2].clone(), stack[stack.len() - 1].clone());
				stack.push(a);
				stack.push(b);
			}
			Opcode::OP_3DUP => {
				if stack.len() < 3 {
					return Err(ScriptError::StackUnderflow);
				}
				let n = stack.len();
				let (a, b, c) = (stack[n - 3].clone(), stack[n - 2].clone(), stack[n - 1].clone());
				stack.push(a);
				stack.push(b);
				stack.push(c);
			}
			Opcode::OP_2OVER => {
				if stack.len() < 4 {
					return Err(ScriptError::StackUnderflow);
				}
				let n = stack.len();
				let (a, b) = (stack[n - 4].clone(), stack[n - 3].clone());
				stack.push(a);
				stack.push(b);
			}
			Opcode::OP_2ROT => {
				if stack.len() < 6 {
					return Err(ScriptError::StackUnderflow);
				}
				let n = stack.len();
				let a = stack.remove(n - 6);
				let b = stack.remove(n - 6);
				stack.push(a);
				stack.push(b);
			}
			Opcode::OP_2SWAP => {
				if stack.len() < 4 {
					return Err(ScriptError::StackUnderflow);
				}
				let n = stack.len();
				stack.swap(n - 4, n - 2);
				stack.swap(n - 3, n - 1);
			}
			Opcode::OP_EQUAL | Opcode::OP_EQUALVERIFY => {
				let b = pop!();
				let a = pop!();
				let eq = a == b;
				if op == Opcode::OP_EQUALVERIFY {
					if !eq {
						return Err(ScriptError::VerifyFailed);
					}
				} else {
					stack.push(encode_num(eq as i64));
				}
			}
			Opcode::OP_1ADD => {
				let n = decode_num(&pop!())?;
				stack.push(encode_num(n + 1));
			}
			Opcode::OP_1SUB => {
				let n = decode_num(&pop!())?;
				stack.push(encode_num(n - 1));
			}
			Opcode::OP_NEGATE => {
				let n = decode_num(&pop!())?;
				stack.push(encode_num(-n));
			}
			Opcode::OP_ABS => {
				let n = decode_num(&pop!())?;
				stack.push(encode_num(n.abs()));
			}
			Opcode::OP_NOT => {
				let n = decode_num(&pop!())?;
				stack.push(encode_num((n == 0) as i64));
			}
			Opcode::OP_0NOTEQUAL => {
				let n = decode_num(&pop!())?;
				stack.push(encode_num((n != 0) as i64));
			}
			Opcode::OP_ADD => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num(a + b));
			}
			Opcode::OP_SUB => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num(a - b));
			}
			Opcode::OP_BOOLAND => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num((a != 0 && b != 0) as i64));
			}
			Opcode::OP_BOOLOR => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num((a != 0 || b != 0) as i64));
			}
			Opcode::OP_NUMEQUAL | Opcode::OP_NUMEQUALVERIFY => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				let eq = a == b;
				if op == Opcode::OP_NUMEQUALVERIFY {
					if !eq {
						return Err(ScriptError::VerifyFailed);
					}
				} else {
					stack.push(encode_num(eq as i64));
				}
			}
			Opcode::OP_NUMNOTEQUAL => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num((a != b) as i64));
			}
			Opcode::OP_LESSTHAN => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num((a < b) as i64));
			}
			Opcode::OP_GREATERTHAN => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num((a > b) as i64));
			}
			Opcode::OP_LESSTHANOREQUAL => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num((a <= b) as i64));
			}
			Opcode::OP_GREATERTHANOREQUAL => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num((a >= b) as i64));
			}
			Opcode::OP_MIN => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num(a.min(b)));
			}
			Opcode::OP_MAX => {
				let b = decode_num(&pop!())?;
				let a = decode_num(&pop!())?;
				stack.push(encode_num(a.max(b)));
			}
			Opcode::OP_WITHIN => {
				let max = decode_num(&pop!())?;
				let min = decode_num(&pop!())?;
				let x = decode_num(&pop!())?;
				stack.push(encode_num((x >= min && x < max) as i64));
			}
			Opcode::OP_RIPEMD160 => {
				let v = pop!();
				stack.push(ledger_util::hash::ripemd160(&v).to_vec());
			}
			Opcode::OP_SHA1 => {
				let v = pop!();
				stack.push(ledger_util::hash::sha1(&v).to_vec());
			}
			Opcode::OP_SHA256 => {
				let v = pop!();
				stack.push(ledger_util::hash::sha256(&v).to_vec());
			}
			Opcode::OP_HASH160 => {
				let v = pop!();
				stack.push(ledger_util::hash::hash160(&v).to_vec());
			}
			Opcode::OP_HASH256 => {
				let v = pop!();
				stack.push(ledger_util::hash::sha256d(&v).to_vec());
			}
			Opcode::OP_CODESEPARATOR => {}
			Opcode::OP_CHECKSIG | Opcode::OP_CHECKSIGVERIFY => {
				let pubkey = pop!();
				let sig = pop!();
				let ok = checker.check_sig(&sig, &pubkey, script);
				if op == Opcode::OP_CHECKSIGVERIFY {
					if !ok {
						return Err(ScriptError::VerifyFailed);
					}
				} else {
					stack.push(encode_num(ok as i64));
				}
			}
			Opcode::OP_CHECKMULTISIG | Opcode::OP_CHECKMULTISIGVERIFY => {
				let n = decode_num(&pop!())?;
				if !(0..=20).contains(&n) {
					return Err(ScriptError::InvalidNumber);
				}
				let mut pubkeys = Vec::with_capacity(n as usize);
				for _ in 0..n {
					pubkeys.push(pop!());
				}
				let m = decode_num(&pop!())?;
				if m < 0 || m > n {
					return Err(ScriptError::InvalidNumber);
				}
				let mut sigs = Vec::with_capacity(m as usize);
				for _ in 0..m {
					sigs.push(pop!());
				}
				// historical off-by-one: CHECKMULTISIG pops one extra
				// stack item that it does not use.
				pop!();

				let mut sig_idx = 0usize;
				let mut key_idx = 0usize;
				let mut all_ok = true;
				while sig_idx < sigs.len() && all_ok {
					if key_idx >= pubkeys.len() {
						all_ok = false;
						break;
					}
					// signatures must verify in the same relative order
					// as their corresponding pubkeys.
					if checker.check_sig(&sigs[sigs.len() - 1 - sig_idx], &pubkeys[pubkeys.len() - 1 - key_idx], script) {
						sig_idx += 1;
					}
					key_idx += 1;
				}
				let ok = all_ok && sig_idx == sigs.len();
				if op == Opcode::OP_CHECKMULTISIGVERIFY {
					if !ok {
						return Err(ScriptError::VerifyFailed);
					}
				} else {
					stack.push(encode_num(ok as i64));
				}
			}
			Opcode::OP_CHECKLOCKTIMEVERIFY => {
				let top = stack.last().ok_or(ScriptError::StackUnderflow)?;
				let locktime = decode_num(top)?;
				if locktime < 0 || !checker.check_locktime(locktime) {
					return Err(ScriptError::VerifyFailed);
				}
			}
			Opcode::OP_DISABLED => return Err(ScriptError::DisabledOpcode),
			Opcode::OP_UNKNOWN(_) => return Err(ScriptError::DisabledOpcode),
		}

		if stack.len() + alt_stack.len() > MAX_STACK_SIZE {
			return Err(ScriptError::StackOverflow);
		}
	}

	if !conditionals.is_empty() {
		return Err(ScriptError::UnbalancedConditional);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	struct AlwaysOkChecker;
	impl SignatureChecker for AlwaysOkChecker {
		fn check_sig(&self, _sig: &[u8], _pubkey: &[u8], _script_code: &[u8]) -> bool {
			true
		}
		fn check_locktime(&self, _locktime: i64) -> bool {
			true
		}
	}

	fn run(script: &[u8]) -> Result<Vec<Vec<u8>>, ScriptError> {
		let mut stack = Vec::new();
		eval_script(script, &mut stack, &AlwaysOkChecker, &NoopHook)?;
		Ok(stack)
	}

	#[test]
	fn push_and_equal() {
		let script = [0x51, 0x51, 0x87]; // OP_1 OP_1 OP_EQUAL
		let stack = run(&script).unwrap();
		assert_eq!(stack, vec![encode_num(1)]);
	}

	#[test]
	fn verify_fails_on_false() {
		let script = [0x00, 0x69]; // OP_0 OP_VERIFY
		assert_eq!(run(&script), Err(ScriptError::VerifyFailed));
	}

	#[test]
	fn if_else_endif() {
		// OP_0 OP_IF OP_1 OP_ELSE OP_2 OP_ENDIF
		let script = [0x00, 0x63, 0x51, 0x67, 0x52, 0x68];
		let stack = run(&script).unwrap();
		assert_eq!(stack, vec![encode_num(2)]);
	}

	#[test]
	fn disabled_opcode_fails() {
		let script = [0x7e]; // OP_CAT, disabled
		assert_eq!(run(&script), Err(ScriptError::DisabledOpcode));
	}

	#[test]
	fn oversized_script_rejected() {
		let script = vec![0x61; MAX_SCRIPT_SIZE + 1];
		assert_eq!(run(&script), Err(ScriptError::ScriptTooLarge(MAX_SCRIPT_SIZE + 1)));
	}

	#[test]
	fn num_encoding_round_trips() {
		for n in [-1000i64, -1, 0, 1, 127, 128, 255, 256, 1_000_000] {
			assert_eq!(decode_num(&encode_num(n)).unwrap(), n);
		}
	}
}

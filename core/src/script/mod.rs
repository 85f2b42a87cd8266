//! The Script evaluator (spec §4.1): a stack-based bytecode that locks
//! and unlocks transaction outputs. `Script` is the raw byte program;
//! `interpreter` executes it, `sighash` derives the transaction digest
//! that `OP_CHECKSIG`/`OP_CHECKMULTISIG` verify against, and `templates`
//! recognizes the handful of locking-script shapes this design needs to
//! treat specially (P2SH redemption, standardness classification).

pub mod checker;
pub mod interpreter;
pub mod opcodes;
pub mod sighash;
pub mod templates;

use crate::ser::{self, Readable, Reader, Writeable, Writer};

pub use checker::TxSignatureChecker;
pub use interpreter::{eval_script, EvalHook, HookResult, NoopHook, ScriptError, SignatureChecker};
pub use opcodes::Opcode;

/// An opaque Script program: just bytes until evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Script(Vec<u8>);

impl Script {
	pub fn from_bytes(bytes: Vec<u8>) -> Script {
		Script(bytes)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Builds a push-only script from a sequence of data pushes, using the
	/// minimal encoding for each (spec §4.1's push-data minimality note).
	pub fn from_pushes(items: &[&[u8]]) -> Script {
		let mut bytes = Vec::new();
		for item in items {
			push_data(&mut bytes, item);
		}
		Script(bytes)
	}

	/// Runs `script_sig` then `self` against a shared stack, handling the
	/// P2SH special case (spec §4.1): if `self` is a P2SH output and the
	/// inner evaluation succeeds, the serialized redeem script found on
	/// top of the stack is evaluated a second time. P2SH scripts may not
	/// recursively embed another P2SH output.
	pub fn verify(
		&self,
		script_sig: &Script,
		checker: &dyn SignatureChecker,
		hook: &dyn EvalHook,
	) -> Result<bool, ScriptError> {
		if !script_sig.is_push_only() {
			return Err(ScriptError::DisabledOpcode);
		}

		let mut stack = Vec::new();
		eval_script(script_sig.as_bytes(), &mut stack, checker, hook)?;

		let stack_for_p2sh = stack.clone();

		eval_script(self.as_bytes(), &mut stack, checker, hook)?;
		if !top_is_true(&stack) {
			return Ok(false);
		}

		if let Some(script_hash) = templates::match_p2sh(self) {
			let redeem_bytes = stack_for_p2sh.last().ok_or(ScriptError::StackUnderflow)?.clone();
			if ledger_util::hash::hash160(&redeem_bytes) != *script_hash.as_bytes() {
				return Ok(false);
			}
			let redeem_script = Script::from_bytes(redeem_bytes);
			if templates::match_p2sh(&redeem_script).is_some() {
				return Err(ScriptError::P2shRecursion);
			}
			let mut p2sh_stack = stack_for_p2sh;
			p2sh_stack.pop();
			eval_script(redeem_script.as_bytes(), &mut p2sh_stack, checker, hook)?;
			return Ok(top_is_true(&p2sh_stack));
		}

		Ok(true)
	}

	/// True iff every opcode in the script is a data push (required of
	/// every `script_sig`, spec §4.1).
	pub fn is_push_only(&self) -> bool {
		let mut pc = 0usize;
		while pc < self.0.len() {
			let byte = self.0[pc];
			pc += 1;
			if byte > 0x60 {
				return false;
			}
			let len = match byte {
				0x00 => 0,
				0x01..=0x4b => byte as usize,
				0x4c => {
					let Some(&n) = self.0.get(pc) else { return false };
					pc += 1;
					n as usize
				}
				0x4d => {
					let Some(b) = self.0.get(pc..pc + 2) else { return false };
					pc += 2;
					(b[0] as usize) | (b[1] as usize) << 8
				}
				0x4e => {
					let Some(b) = self.0.get(pc..pc + 4) else { return false };
					pc += 4;
					(b[0] as usize) | (b[1] as usize) << 8 | (b[2] as usize) << 16 | (b[3] as usize) << 24
				}
				_ => 0, // OP_1NEGATE / OP_N: not a push of data bytes, but still allowed
			};
			if pc + len > self.0.len() {
				return false;
			}
			pc += len;
		}
		true
	}
}

fn top_is_true(stack: &[Vec<u8>]) -> bool {
	match stack.last() {
		None => false,
		Some(v) => v.iter().enumerate().any(|(i, &b)| b != 0 && !(i == v.len() - 1 && b == 0x80)),
	}
}

fn push_data(out: &mut Vec<u8>, data: &[u8]) {
	match data.len() {
		0 => out.push(0x00),
		n @ 1..=75 => {
			out.push(n as u8);
			out.extend_from_slice(data);
		}
		n @ 76..=255 => {
			out.push(0x4c);
			out.push(n as u8);
			out.extend_from_slice(data);
		}
		n if n <= 0xFFFF => {
			out.push(0x4d);
			out.push((n & 0xff) as u8);
			out.push((n >> 8) as u8);
			out.extend_from_slice(data);
		}
		n => {
			out.push(0x4e);
			out.extend_from_slice(&(n as u32).to_le_bytes());
			out.extend_from_slice(data);
		}
	}
}

impl Writeable for Script {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_bytes(&self.0)
	}
}

impl Readable for Script {
	fn read(reader: &mut dyn Reader) -> Result<Script, ser::Error> {
		Ok(Script(reader.read_bytes()?))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use interpreter::RejectingChecker;

	#[test]
	fn push_only_detection() {
		assert!(Script::from_bytes(vec![0x01, 0xff]).is_push_only());
		assert!(!Script::from_bytes(vec![0x76]).is_push_only()); // OP_DUP
	}

	#[test]
	fn p2pkh_style_round_trip_verifies() {
		// script_sig: <sig-placeholder> <pubkey-placeholder>
		// script_pubkey: OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG
		let pubkey = vec![0x02; 33];
		let hash = ledger_util::hash::hash160(&pubkey);
		let script_sig = Script::from_pushes(&[&[0x30, 0x01], &pubkey]);
		let mut pubkey_script = vec![0x76, 0xa9, 0x14];
		pubkey_script.extend_from_slice(&hash);
		pubkey_script.push(0x88);
		pubkey_script.push(0xac);
		let script_pubkey = Script::from_bytes(pubkey_script);

		struct AlwaysOk;
		impl SignatureChecker for AlwaysOk {
			fn check_sig(&self, _s: &[u8], _p: &[u8], _c: &[u8]) -> bool {
				true
			}
			fn check_locktime(&self, _l: i64) -> bool {
				true
			}
		}

		let ok = script_pubkey.verify(&script_sig, &AlwaysOk, &NoopHook).unwrap();
		assert!(ok);
	}

	#[test]
	fn non_push_only_sig_rejected() {
		let script_sig = Script::from_bytes(vec![0x76]);
		let script_pubkey = Script::from_bytes(vec![0x51]);
		let result = script_pubkey.verify(&script_sig, &RejectingChecker, &NoopHook);
		assert!(result.is_err());
	}
}

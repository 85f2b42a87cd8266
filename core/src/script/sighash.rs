//! Derives the transaction digest that `OP_CHECKSIG` / `OP_CHECKMULTISIG`
//! verify a signature against (spec §4.1). The digest is computed over a
//! modified copy of the spending transaction, never the transaction as
//! broadcast, so a signature commits to exactly the inputs/outputs its
//! signer intended and nothing the transaction might later be extended
//! with.

use crate::hash::Hash256;
use crate::script::Script;
use crate::ser;
use crate::transaction::{Input, Output, Transaction};

bitflags::bitflags! {
	/// The low byte of every signature's final byte (appended after the
	/// DER-encoded ECDSA signature) selects one of these digest recipes.
	pub struct SighashType: u8 {
		const ALL = 0x01;
		const NONE = 0x02;
		const SINGLE = 0x03;
		const ANYONECANPAY = 0x80;
	}
}

const SIGHASH_MASK: u8 = 0x1f;

impl SighashType {
	pub fn from_byte(b: u8) -> SighashType {
		SighashType::from_bits_truncate(b)
	}

	fn base(self) -> u8 {
		self.bits() & SIGHASH_MASK
	}

	fn anyone_can_pay(self) -> bool {
		self.contains(SighashType::ANYONECANPAY)
	}
}

/// Computes the sighash for `input_index` of `tx`, spending an output
/// locked by `script_code` (the subscript active at the last
/// `OP_CODESEPARATOR`, or the whole script if there was none).
///
/// Returns `Hash256::from_bytes([0;32])` with the low byte set to 1 per
/// the historical `SIGHASH_SINGLE` bug when `input_index` has no
/// matching output and `sighash_type` selects `SINGLE` — reproduced here
/// because signatures already committed under that behavior must
/// continue to verify.
pub fn signature_hash(tx: &Transaction, input_index: usize, script_code: &Script, sighash_type: SighashType) -> Hash256 {
	if sighash_type.base() == SighashType::SINGLE.bits() && input_index >= tx.outputs.len() {
		let mut bytes = [0u8; 32];
		bytes[0] = 1;
		return Hash256::from_bytes(bytes);
	}

	let stripped_code = strip_code_separators(script_code);

	let inputs: Vec<Input> = if sighash_type.anyone_can_pay() {
		vec![Input {
			prevout: tx.inputs[input_index].prevout,
			script_sig: stripped_code.clone(),
			sequence: tx.inputs[input_index].sequence,
		}]
	} else {
		tx.inputs
			.iter()
			.enumerate()
			.map(|(i, inp)| Input {
				prevout: inp.prevout,
				script_sig: if i == input_index { stripped_code.clone() } else { Script::from_bytes(Vec::new()) },
				sequence: if sighash_type.base() != SighashType::ALL.bits() && i != input_index { 0 } else { inp.sequence },
			})
			.collect()
	};

	let outputs: Vec<Output> = match sighash_type.base() {
		b if b == SighashType::NONE.bits() => Vec::new(),
		b if b == SighashType::SINGLE.bits() => {
			let mut outs: Vec<Output> = (0..=input_index)
				.map(|i| if i == input_index { tx.outputs[i].clone() } else { Output::new(-1, Script::from_bytes(Vec::new())) })
				.collect();
			// placeholders for skipped outputs use value -1 and an empty
			// script, matching the historical encoding exactly.
			outs.truncate(input_index + 1);
			outs
		}
		_ => tx.outputs.clone(),
	};

	let stripped = Transaction { version: tx.version, inputs, outputs, locktime: tx.locktime };

	let mut bytes = ser::ser_vec(&stripped).expect("in-memory serialization cannot fail");
	bytes.extend_from_slice(&(sighash_type.bits() as u32).to_le_bytes());
	Hash256::from_sha256d(&bytes)
}

/// `OP_CODESEPARATOR` removes everything up to and including itself from
/// the subscript used for sighash computation (spec §4.1).
fn strip_code_separators(script: &Script) -> Script {
	const OP_CODESEPARATOR: u8 = 0xab;
	let bytes = script.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut pc = 0usize;
	let mut last_separator = 0usize;
	while pc < bytes.len() {
		let byte = bytes[pc];
		if byte == OP_CODESEPARATOR {
			last_separator = pc + 1;
		}
		pc += 1;
		if byte >= 0x01 && byte <= 0x4b {
			pc += byte as usize;
		} else if byte == 0x4c {
			if let Some(&n) = bytes.get(pc) {
				pc += 1 + n as usize;
			}
		} else if byte == 0x4d {
			if let Some(b) = bytes.get(pc..pc + 2) {
				pc += 2 + ((b[0] as usize) | (b[1] as usize) << 8);
			}
		} else if byte == 0x4e {
			if let Some(b) = bytes.get(pc..pc + 4) {
				pc += 4 + ((b[0] as usize) | (b[1] as usize) << 8 | (b[2] as usize) << 16 | (b[3] as usize) << 24);
			}
		}
		pc = pc.min(bytes.len());
	}
	out.extend_from_slice(&bytes[last_separator.min(bytes.len())..]);
	Script::from_bytes(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::hash::Hash256;
	use crate::script::Script;
	use crate::transaction::Outpoint;

	fn sample_tx() -> Transaction {
		Transaction::new(
			1,
			vec![Input::new(Outpoint { tx_hash: Hash256::from_sha256d(b"prev"), index: 0 }, Script::from_bytes(vec![]), 0xFFFF_FFFF)],
			vec![Output::new(100, Script::from_bytes(vec![0x51]))],
			0,
		)
	}

	#[test]
	fn all_is_deterministic_and_commits_to_outputs() {
		let tx = sample_tx();
		let code = Script::from_bytes(vec![0x51]);
		let h1 = signature_hash(&tx, 0, &code, SighashType::ALL);
		let h2 = signature_hash(&tx, 0, &code, SighashType::ALL);
		assert_eq!(h1, h2);

		let mut tx2 = sample_tx();
		tx2.outputs[0].value = 200;
		let h3 = signature_hash(&tx2, 0, &code, SighashType::ALL);
		assert_ne!(h1, h3);
	}

	#[test]
	fn none_ignores_output_changes() {
		let tx = sample_tx();
		let code = Script::from_bytes(vec![0x51]);
		let h1 = signature_hash(&tx, 0, &code, SighashType::NONE);

		let mut tx2 = sample_tx();
		tx2.outputs[0].value = 999;
		let h2 = signature_hash(&tx2, 0, &code, SighashType::NONE);
		assert_eq!(h1, h2);
	}

	#[test]
	fn single_out_of_range_returns_sentinel() {
		let tx = sample_tx();
		let code = Script::from_bytes(vec![0x51]);
		let h = signature_hash(&tx, 5, &code, SighashType::SINGLE);
		let mut expected = [0u8; 32];
		expected[0] = 1;
		assert_eq!(h, Hash256::from_bytes(expected));
	}
}

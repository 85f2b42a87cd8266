//! Recognizes and builds the handful of locking-script shapes this
//! design treats specially: pay-to-pubkey, pay-to-pubkey-hash,
//! pay-to-script-hash, bare multisig, and null-data (spec §4.1's
//! "Script evaluator polymorphism" note: everything else is opaque and
//! evaluated generically, never pattern-matched).

use crate::hash::Hash160;
use crate::script::Script;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_EQUAL: u8 = 0x87;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_RETURN: u8 = 0x6a;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptClass {
	PubKey(Vec<u8>),
	PubKeyHash(Hash160),
	ScriptHash(Hash160),
	Multisig { required: u8, pubkeys: Vec<Vec<u8>> },
	NullData(Vec<u8>),
	NonStandard,
}

/// Classifies a locking script by shape, falling back to `NonStandard`
/// for anything that doesn't match a known template.
pub fn classify(script: &Script) -> ScriptClass {
	if let Some(hash) = match_p2pkh(script) {
		return ScriptClass::PubKeyHash(hash);
	}
	if let Some(hash) = match_p2sh(script) {
		return ScriptClass::ScriptHash(hash);
	}
	if let Some(pubkey) = match_p2pk(script) {
		return ScriptClass::PubKey(pubkey);
	}
	if let Some((required, pubkeys)) = match_multisig(script) {
		return ScriptClass::Multisig { required, pubkeys };
	}
	if let Some(data) = match_null_data(script) {
		return ScriptClass::NullData(data);
	}
	ScriptClass::NonStandard
}

/// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
pub fn match_p2pkh(script: &Script) -> Option<Hash160> {
	let b = script.as_bytes();
	if b.len() == 25 && b[0] == OP_DUP && b[1] == OP_HASH160 && b[2] == 0x14 && b[23] == OP_EQUALVERIFY && b[24] == OP_CHECKSIG {
		let mut arr = [0u8; 20];
		arr.copy_from_slice(&b[3..23]);
		Some(Hash160(arr))
	} else {
		None
	}
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`
pub fn match_p2sh(script: &Script) -> Option<Hash160> {
	let b = script.as_bytes();
	if b.len() == 23 && b[0] == OP_HASH160 && b[1] == 0x14 && b[22] == OP_EQUAL {
		let mut arr = [0u8; 20];
		arr.copy_from_slice(&b[2..22]);
		Some(Hash160(arr))
	} else {
		None
	}
}

/// `<33 or 65 byte pubkey> OP_CHECKSIG`
pub fn match_p2pk(script: &Script) -> Option<Vec<u8>> {
	let b = script.as_bytes();
	if b.len() == 35 && b[0] == 0x21 && b[34] == OP_CHECKSIG {
		Some(b[1..34].to_vec())
	} else if b.len() == 67 && b[0] == 0x41 && b[66] == OP_CHECKSIG {
		Some(b[1..66].to_vec())
	} else {
		None
	}
}

/// `OP_<m> <pubkey>... OP_<n> OP_CHECKMULTISIG`, bare (not wrapped in
/// P2SH, which callers handle separately by recursing into the redeem
/// script).
pub fn match_multisig(script: &Script) -> Option<(u8, Vec<Vec<u8>>)> {
	let b = script.as_bytes();
	if b.len() < 3 || *b.last().unwrap() != OP_CHECKMULTISIG {
		return None;
	}
	let required = op_n(b[0])?;
	let mut pc = 1usize;
	let mut pubkeys = Vec::new();
	loop {
		match b.get(pc) {
			Some(&len) if len == 0x21 || len == 0x41 => {
				let start = pc + 1;
				let end = start + len as usize;
				if end > b.len() {
					return None;
				}
				pubkeys.push(b[start..end].to_vec());
				pc = end;
			}
			_ => break,
		}
	}
	let total = op_n(*b.get(pc)?)?;
	if pc + 2 != b.len() || total as usize != pubkeys.len() || required > total || total > 20 {
		return None;
	}
	Some((required, pubkeys))
}

/// `OP_RETURN <data>`: provably unspendable, used to carry arbitrary
/// application data.
pub fn match_null_data(script: &Script) -> Option<Vec<u8>> {
	let b = script.as_bytes();
	if b.first() != Some(&OP_RETURN) {
		return None;
	}
	Some(b[1..].to_vec())
}

fn op_n(byte: u8) -> Option<u8> {
	match byte {
		0x51..=0x60 => Some(byte - 0x50),
		_ => None,
	}
}

/// Builds a standard `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
/// locking script for the given pubkey hash.
pub fn pay_to_pubkey_hash(hash: &Hash160) -> Script {
	let mut bytes = vec![OP_DUP, OP_HASH160, 0x14];
	bytes.extend_from_slice(hash.as_bytes());
	bytes.push(OP_EQUALVERIFY);
	bytes.push(OP_CHECKSIG);
	Script::from_bytes(bytes)
}

/// Builds a standard `OP_HASH160 <hash> OP_EQUAL` locking script for the
/// given redeem script hash.
pub fn pay_to_script_hash(hash: &Hash160) -> Script {
	let mut bytes = vec![OP_HASH160, 0x14];
	bytes.extend_from_slice(hash.as_bytes());
	bytes.push(OP_EQUAL);
	Script::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn recognizes_p2pkh() {
		let hash = Hash160([7u8; 20]);
		let script = pay_to_pubkey_hash(&hash);
		assert_eq!(match_p2pkh(&script), Some(hash));
		assert_eq!(classify(&script), ScriptClass::PubKeyHash(hash));
	}

	#[test]
	fn recognizes_p2sh() {
		let hash = Hash160([9u8; 20]);
		let script = pay_to_script_hash(&hash);
		assert_eq!(match_p2sh(&script), Some(hash));
	}

	#[test]
	fn recognizes_null_data() {
		let script = Script::from_bytes(vec![OP_RETURN, b'h', b'i']);
		assert_eq!(match_null_data(&script), Some(vec![b'h', b'i']));
	}

	#[test]
	fn rejects_mismatched_lengths() {
		assert_eq!(match_p2pkh(&Script::from_bytes(vec![OP_DUP, OP_HASH160])), None);
	}
}

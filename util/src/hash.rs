//! Raw digest functions shared by every crate that needs a hash: the
//! consensus-critical SHA-256d / RIPEMD160 combination, plus the
//! HASH160 = RIPEMD160(SHA256(x)) composite used for addresses and
//! P2PKH/P2SH scripts.
//!
//! This module deliberately knows nothing about the `Hash256`/`Hash160`
//! newtypes in `ledger_core` — it only turns bytes into bytes, so it can
//! be reused by `ledger_core`, `ledger_chain` and `ledger_p2p` alike
//! without a dependency cycle.

use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Single SHA-256 pass.
pub fn sha256(data: &[u8]) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(data);
	hasher.finalize().into()
}

/// Plain SHA-1, used only by the legacy `OP_SHA1` opcode. Plays no role
/// in any consensus hash computed elsewhere in this workspace.
pub fn sha1(data: &[u8]) -> [u8; 20] {
	let mut hasher = Sha1::new();
	hasher.update(data);
	hasher.finalize().into()
}

/// Double SHA-256, the consensus hash used for transaction ids, block
/// ids and the proof-of-work hash.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
	sha256(&sha256(data))
}

/// RIPEMD160 of a SHA-256 pass, i.e. Bitcoin's `HASH160`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
	let sha = sha256(data);
	let mut hasher = Ripemd160::new();
	hasher.update(sha);
	hasher.finalize().into()
}

/// Plain RIPEMD160, used directly by the `OP_RIPEMD160` opcode.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
	let mut hasher = Ripemd160::new();
	hasher.update(data);
	hasher.finalize().into()
}

/// Combine two 32-byte digests the way every Merkle structure in this
/// repository does: `sha256d(left ‖ right)`.
pub fn merge(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
	let mut buf = [0u8; 64];
	buf[..32].copy_from_slice(left);
	buf[32..].copy_from_slice(right);
	sha256d(&buf)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sha256d_of_empty_matches_known_vector() {
		// sha256d("") is a well known constant, reproduced here as a
		// regression check on the double-hash composition.
		let digest = sha256d(b"");
		let expected = [
			0x5d, 0xf6, 0xe0, 0xe2, 0x76, 0x13, 0x59, 0xd3, 0x0a, 0x82, 0x75, 0x05, 0x8e, 0x29,
			0x9f, 0xcc, 0x03, 0x81, 0x53, 0x45, 0x45, 0xf5, 0x5c, 0xf4, 0x3e, 0x41, 0x98, 0x3f,
			0x5d, 0x4c, 0x94, 0x56,
		];
		assert_eq!(digest, expected);
	}

	#[test]
	fn hash160_matches_sha_then_ripemd() {
		let data = b"libcoin";
		let expect = ripemd160(&sha256(data));
		assert_eq!(hash160(data), expect);
	}
}

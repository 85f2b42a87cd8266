//! The production [`SignatureChecker`] implementation: verifies
//! `OP_CHECKSIG`/`OP_CHECKMULTISIG` signatures with `secp256k1` against
//! the sighash digest in `super::sighash`, and `OP_CHECKLOCKTIMEVERIFY`
//! against the spending transaction's own locktime/sequence (spec
//! §4.1's "Signature verification" paragraph).

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, VerifyOnly};

use crate::script::interpreter::SignatureChecker;
use crate::script::sighash::{signature_hash, SighashType};
use crate::script::Script;
use crate::transaction::{Input, Transaction};

/// Checks signatures for one specific input of one specific
/// transaction, since every `OP_CHECKSIG` needs both to compute the
/// sighash it verifies against.
pub struct TxSignatureChecker<'a> {
	tx: &'a Transaction,
	input_index: usize,
	secp: Secp256k1<VerifyOnly>,
}

impl<'a> TxSignatureChecker<'a> {
	pub fn new(tx: &'a Transaction, input_index: usize) -> TxSignatureChecker<'a> {
		TxSignatureChecker { tx, input_index, secp: Secp256k1::verification_only() }
	}
}

impl<'a> SignatureChecker for TxSignatureChecker<'a> {
	fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &[u8]) -> bool {
		let (der, sighash_byte) = match sig.split_last() {
			Some((byte, der)) => (der, *byte),
			None => return false,
		};
		let Ok(signature) = Signature::from_der(der) else { return false };
		let Ok(pubkey) = PublicKey::from_slice(pubkey) else { return false };

		let sighash_type = SighashType::from_byte(sighash_byte);
		let digest = signature_hash(self.tx, self.input_index, &Script::from_bytes(script_code.to_vec()), sighash_type);
		let Ok(message) = Message::from_digest_slice(digest.as_bytes()) else { return false };

		self.secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
	}

	fn check_locktime(&self, locktime: i64) -> bool {
		let input = &self.tx.inputs[self.input_index];
		if input.sequence == Input::FINAL_SEQUENCE {
			return false;
		}
		if locktime < 0 || locktime > u32::MAX as i64 {
			return false;
		}
		let threshold = 500_000_000i64; // LOCKTIME_THRESHOLD: below this, locktime is a block height
		if (self.tx.locktime as i64 >= threshold) != (locktime >= threshold) {
			return false;
		}
		self.tx.locktime as i64 >= locktime
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::hash::Hash256;
	use crate::transaction::{Input, Outpoint, Output};
	use secp256k1::{rand, Secp256k1, SecretKey};

	#[test]
	fn valid_signature_verifies_and_tampered_one_does_not() {
		let secp = Secp256k1::new();
		let (sk, pk) = secp.generate_keypair(&mut rand::thread_rng());

		let tx = Transaction::new(
			1,
			vec![Input::new(Outpoint { tx_hash: Hash256::from_sha256d(b"prev"), index: 0 }, Script::from_bytes(vec![]), 0xFFFF_FFFF)],
			vec![Output::new(1000, Script::from_bytes(vec![0x51]))],
			0,
		);
		let script_code = Script::from_bytes(vec![0x76, 0xa9]);
		let sighash_type = SighashType::ALL;
		let digest = signature_hash(&tx, 0, &script_code, sighash_type);
		let message = Message::from_digest_slice(digest.as_bytes()).unwrap();
		let sig = secp.sign_ecdsa(&message, &SecretKey::from(sk));

		let mut sig_bytes = sig.serialize_der().to_vec();
		sig_bytes.push(sighash_type.bits());

		let checker = TxSignatureChecker::new(&tx, 0);
		assert!(checker.check_sig(&sig_bytes, &pk.serialize(), script_code.as_bytes()));

		let mut tampered = sig_bytes.clone();
		let last = tampered.len() - 2;
		tampered[last] ^= 0xff;
		assert!(!checker.check_sig(&tampered, &pk.serialize(), script_code.as_bytes()));
	}
}

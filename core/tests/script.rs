//! End-to-end Script tests: a real secp256k1 keypair signs a P2PKH
//! spend and the evaluator verifies it, exercising `sighash`,
//! `interpreter`, and `templates` together rather than each in
//! isolation.

use ledger_core::script::interpreter::SignatureChecker;
use ledger_core::script::sighash::{self, SighashType};
use ledger_core::script::{templates, NoopHook, Script};
use ledger_core::transaction::{Input, Outpoint, Output, Transaction};
use ledger_core::Hash256;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};

struct Secp256k1Checker<'a> {
	secp: &'a Secp256k1<secp256k1::VerifyOnly>,
	tx: &'a Transaction,
	input_index: usize,
}

impl<'a> SignatureChecker for Secp256k1Checker<'a> {
	fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &[u8]) -> bool {
		if sig.is_empty() {
			return false;
		}
		let (sig_der, sighash_byte) = sig.split_at(sig.len() - 1);
		let sighash_type = SighashType::from_byte(sighash_byte[0]);
		let digest = sighash::signature_hash(self.tx, self.input_index, &Script::from_bytes(script_code.to_vec()), sighash_type);

		let Ok(signature) = Signature::from_der(sig_der) else { return false };
		let Ok(public_key) = PublicKey::from_slice(pubkey) else { return false };
		let Ok(message) = Message::from_digest_slice(digest.as_bytes()) else { return false };
		self.secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
	}

	fn check_locktime(&self, _locktime: i64) -> bool {
		true
	}
}

#[test]
fn p2pkh_spend_verifies_with_a_real_signature() {
	let secp_sign = Secp256k1::signing_only();
	let secp_verify = Secp256k1::verification_only();
	let secret_key = SecretKey::from_slice(&[0x11u8; 32]).unwrap();
	let public_key = PublicKey::from_secret_key(&secp_sign, &secret_key);
	let pubkey_bytes = public_key.serialize().to_vec();
	let pubkey_hash = ledger_core::hash::Hash160::from_hash160(&pubkey_bytes);

	let prev_script = templates::pay_to_pubkey_hash(&pubkey_hash);
	let spending_tx = Transaction::new(
		1,
		vec![Input::new(Outpoint { tx_hash: Hash256::from_sha256d(b"prevtx"), index: 0 }, Script::from_bytes(vec![]), 0xFFFF_FFFF)],
		vec![Output::new(4_900_000_000, Script::from_bytes(vec![0x51]))],
		0,
	);

	let sighash_type = SighashType::ALL;
	let digest = sighash::signature_hash(&spending_tx, 0, &prev_script, sighash_type);
	let message = Message::from_digest_slice(digest.as_bytes()).unwrap();
	let signature = secp_sign.sign_ecdsa(&message, &secret_key);
	let mut sig_bytes = signature.serialize_der().to_vec();
	sig_bytes.push(sighash_type.bits());

	let script_sig = Script::from_pushes(&[&sig_bytes, &pubkey_bytes]);

	let checker = Secp256k1Checker { secp: &secp_verify, tx: &spending_tx, input_index: 0 };
	let ok = prev_script.verify(&script_sig, &checker, &NoopHook).unwrap();
	assert!(ok);
}

#[test]
fn p2pkh_spend_fails_with_wrong_key() {
	let secp_sign = Secp256k1::signing_only();
	let secp_verify = Secp256k1::verification_only();
	let secret_key = SecretKey::from_slice(&[0x11u8; 32]).unwrap();
	let wrong_key = SecretKey::from_slice(&[0x22u8; 32]).unwrap();
	let public_key = PublicKey::from_secret_key(&secp_sign, &secret_key);
	let wrong_public_key = PublicKey::from_secret_key(&secp_sign, &wrong_key);
	let pubkey_hash = ledger_core::hash::Hash160::from_hash160(&public_key.serialize());

	let prev_script = templates::pay_to_pubkey_hash(&pubkey_hash);
	let spending_tx = Transaction::new(
		1,
		vec![Input::new(Outpoint { tx_hash: Hash256::from_sha256d(b"prevtx"), index: 0 }, Script::from_bytes(vec![]), 0xFFFF_FFFF)],
		vec![Output::new(1, Script::from_bytes(vec![0x51]))],
		0,
	);

	let digest = sighash::signature_hash(&spending_tx, 0, &prev_script, SighashType::ALL);
	let message = Message::from_digest_slice(digest.as_bytes()).unwrap();
	let signature = secp_sign.sign_ecdsa(&message, &wrong_key);
	let mut sig_bytes = signature.serialize_der().to_vec();
	sig_bytes.push(SighashType::ALL.bits());

	let script_sig = Script::from_pushes(&[&sig_bytes, &wrong_public_key.serialize()]);
	let checker = Secp256k1Checker { secp: &secp_verify, tx: &spending_tx, input_index: 0 };
	let ok = prev_script.verify(&script_sig, &checker, &NoopHook).unwrap();
	assert!(!ok);
}

//! Chain parameters (spec §4, C4): the per-network constants and rules
//! that the rest of the workspace treats as an opaque environment
//! boundary — genesis, proof-of-work limits and retargeting, address
//! versioning, checkpoints, and standardness.

use std::collections::HashMap;

use crate::block::{Block, BlockHeader};
use crate::consensus;
use crate::hash::{Hash160, Hash256, Hashed};
use crate::script::{self, Script};
use crate::target::{self, compact_to_target};
use crate::transaction::{Input, Outpoint, Output, Transaction};

/// Which of the three conventional networks a node has been configured
/// to join; selects the `ChainParams` implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
	Mainnet,
	Testnet,
	Regtest,
}

/// Everything the consensus/networking core needs from "which currency
/// is this" without depending on any concrete chain's details (spec §6
/// environment boundary).
pub trait ChainParams: Send + Sync {
	/// Four-byte magic prefixing every wire message (spec §6).
	fn magic(&self) -> [u8; 4];

	/// Default P2P listening port for this network.
	fn default_port(&self) -> u16;

	/// The single block every valid chain on this network descends from.
	fn genesis(&self) -> Block;

	/// `bits` encoding of the easiest target ever permitted.
	fn proof_of_work_limit_bits(&self) -> u32;

	/// Block subsidy at `height`, in the smallest currency unit.
	fn subsidy(&self, height: u64) -> i64 {
		consensus::subsidy(height)
	}

	/// Recomputes `bits` for the block following `last`, given the
	/// header at the start of the current retarget window (spec §4.5
	/// step 3: "Consult Chain for next_work_required at parent").
	/// `height` is the height of the block being produced.
	fn next_work_required(&self, last: &BlockHeader, first_in_window: &BlockHeader, height: u64) -> u32 {
		if height % consensus::DIFFICULTY_ADJUSTMENT_INTERVAL != 0 {
			return last.bits;
		}
		let actual_timespan = last.time.saturating_sub(first_in_window.time) as u64;
		let min = consensus::TARGET_TIMESPAN_SECS / consensus::MAX_RETARGET_FACTOR;
		let max = consensus::TARGET_TIMESPAN_SECS * consensus::MAX_RETARGET_FACTOR;
		let clamped = actual_timespan.clamp(min, max);

		let old_target = compact_to_target(last.bits);
		let mut new_target = old_target * clamped / consensus::TARGET_TIMESPAN_SECS;
		let limit = compact_to_target(self.proof_of_work_limit_bits());
		if new_target > limit {
			new_target = limit;
		}
		target::target_to_compact(&new_target)
	}

	/// Re-derives the header's PoW hash and compares it to `target(bits)`.
	fn check_proof_of_work(&self, header: &BlockHeader) -> bool {
		header.meets_target()
	}

	/// Version byte prefixed to a base58check-encoded P2PKH address.
	fn pubkey_hash_version(&self) -> u8;

	/// Version byte prefixed to a base58check-encoded P2SH address.
	fn script_hash_version(&self) -> u8;

	/// Block hashes pinned at known heights; a chain diverging from one
	/// of these at or before that height is rejected outright regardless
	/// of cumulative work.
	fn checkpoints(&self) -> &HashMap<u64, Hash256>;

	/// Whether `tx` satisfies this network's relay/mempool standardness
	/// policy (spec §4.4 step 1), a stricter superset of
	/// `check_context_free` that real chains use to bound what they
	/// relay without changing what they'll ultimately accept in a block.
	fn is_standard(&self, tx: &Transaction) -> bool {
		for input in &tx.inputs {
			if !input.script_sig.is_push_only() {
				return false;
			}
		}
		for output in &tx.outputs {
			match script::templates::classify(&output.script_pubkey) {
				script::templates::ScriptClass::NonStandard => return false,
				script::templates::ScriptClass::Multisig { pubkeys, .. } if pubkeys.len() > 3 => return false,
				_ => {}
			}
		}
		true
	}
}

/// The historical Bitcoin genesis block, reused verbatim as this
/// design's mainnet genesis (spec §8 S1: block-count=0, best-hash
/// `000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f`).
/// The genesis coinbase is, by convention, excluded from Spendables even
/// though it is structurally a normal coinbase output (spec §8 S1 note).
fn bitcoin_genesis(time: u32, bits: u32, nonce: u32, pubkey: &[u8]) -> Block {
	let script_sig = Script::from_bytes({
		let mut b = vec![0x04, 0xff, 0xff, 0x00, 0x1d, 0x01, 0x04];
		b.push(69);
		b.extend_from_slice(b"The Times 03/Jan/2009 Chancellor on brink of second bailout for banks");
		b
	});
	let script_pubkey = {
		let mut b = vec![pubkey.len() as u8];
		b.extend_from_slice(pubkey);
		b.push(0xac);
		Script::from_bytes(b)
	};
	let coinbase = Transaction::new(
		1,
		vec![Input::new(Outpoint::null(), script_sig, 0xFFFF_FFFF)],
		vec![Output::new(50 * 100_000_000, script_pubkey)],
		0,
	);
	let merkle_root = coinbase.hash();
	Block::new(BlockHeader { version: 1, prev: Hash256::ZERO, merkle_root, time, bits, nonce }, vec![coinbase])
}

pub struct Mainnet;

impl ChainParams for Mainnet {
	fn magic(&self) -> [u8; 4] {
		[0xf9, 0xbe, 0xb4, 0xd9]
	}
	fn default_port(&self) -> u16 {
		8333
	}
	fn genesis(&self) -> Block {
		bitcoin_genesis(
			1_231_006_505,
			0x1d00ffff,
			2_083_236_893,
			&hex_pubkey("04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5"),
		)
	}
	fn proof_of_work_limit_bits(&self) -> u32 {
		0x1d00ffff
	}
	fn pubkey_hash_version(&self) -> u8 {
		0x00
	}
	fn script_hash_version(&self) -> u8 {
		0x05
	}
	fn checkpoints(&self) -> &HashMap<u64, Hash256> {
		static EMPTY: std::sync::OnceLock<HashMap<u64, Hash256>> = std::sync::OnceLock::new();
		EMPTY.get_or_init(HashMap::new)
	}
}

pub struct Testnet;

impl ChainParams for Testnet {
	fn magic(&self) -> [u8; 4] {
		[0x0b, 0x11, 0x09, 0x07]
	}
	fn default_port(&self) -> u16 {
		18333
	}
	fn genesis(&self) -> Block {
		bitcoin_genesis(
			1_296_688_602,
			0x1d00ffff,
			414_098_458,
			&hex_pubkey("04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5"),
		)
	}
	fn proof_of_work_limit_bits(&self) -> u32 {
		0x1d00ffff
	}
	fn pubkey_hash_version(&self) -> u8 {
		0x6f
	}
	fn script_hash_version(&self) -> u8 {
		0xc4
	}
	fn checkpoints(&self) -> &HashMap<u64, Hash256> {
		static EMPTY: std::sync::OnceLock<HashMap<u64, Hash256>> = std::sync::OnceLock::new();
		EMPTY.get_or_init(HashMap::new)
	}
}

pub struct Regtest;

impl ChainParams for Regtest {
	fn magic(&self) -> [u8; 4] {
		[0xfa, 0xbf, 0xb5, 0xda]
	}
	fn default_port(&self) -> u16 {
		18444
	}
	fn genesis(&self) -> Block {
		bitcoin_genesis(
			1_296_688_602,
			0x207fffff,
			2,
			&hex_pubkey("04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5"),
		)
	}
	fn proof_of_work_limit_bits(&self) -> u32 {
		0x207fffff
	}
	fn pubkey_hash_version(&self) -> u8 {
		0x6f
	}
	fn script_hash_version(&self) -> u8 {
		0xc4
	}
	fn checkpoints(&self) -> &HashMap<u64, Hash256> {
		static EMPTY: std::sync::OnceLock<HashMap<u64, Hash256>> = std::sync::OnceLock::new();
		EMPTY.get_or_init(HashMap::new)
	}
	fn next_work_required(&self, last: &BlockHeader, _first_in_window: &BlockHeader, _height: u64) -> u32 {
		// regtest never retargets; every block is mined at the PoW floor.
		last.bits
	}
}

/// Returns the parameter set for `network`.
pub fn params_for(network: Network) -> Box<dyn ChainParams> {
	match network {
		Network::Mainnet => Box::new(Mainnet),
		Network::Testnet => Box::new(Testnet),
		Network::Regtest => Box::new(Regtest),
	}
}

fn hex_pubkey(hex: &str) -> Vec<u8> {
	(0..hex.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("static hex literal"))
		.collect()
}

/// Hashes a pubkey the way a P2PKH address does, convenience for chain
/// parameter construction and tests.
pub fn pubkey_to_hash160(pubkey: &[u8]) -> Hash160 {
	Hash160::from_hash160(pubkey)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mainnet_genesis_hash_matches_known_value() {
		let params = Mainnet;
		let genesis = params.genesis();
		let hash = genesis.hash().to_string();
		assert_eq!(hash, "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f");
	}

	#[test]
	fn regtest_never_retargets() {
		let params = Regtest;
		let header = BlockHeader { version: 1, prev: Hash256::ZERO, merkle_root: Hash256::ZERO, time: 0, bits: 0x207fffff, nonce: 0 };
		assert_eq!(params.next_work_required(&header, &header, 5_000), 0x207fffff);
	}
}

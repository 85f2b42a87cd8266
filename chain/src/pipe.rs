//! The block-acceptance pipeline (spec §4.5): small, independently
//! testable steps ordered cheapest-first, the same staging
//! `chain/src_teacher/pipe.rs`'s `validate_header`/`validate_block`/
//! `add_block` sequence uses, rebuilt around this design's Spendables
//! trie instead of the teacher's sumtree/UTXO view (DESIGN.md).

use ledger_core::block::Block;
use ledger_core::consensus::COINBASE_MATURITY;
use ledger_core::hash::Hashed;
use ledger_core::script::{NoopHook, TxSignatureChecker};
use ledger_core::ser::{self, Readable, Reader, Writeable, Writer};
use ledger_core::transaction::Outpoint;

use crate::error::{ConsensusRejection, Error};
use crate::spendables::{Coin, Spendables};

/// Spec §4.5 step 1: every check that only needs the block itself, not
/// the tree or the UTXO set. Run first because it is the cheapest and
/// gives the smallest possible DoS surface to a peer sending garbage.
pub fn check_context_free(block: &Block, now: u32) -> Result<(), Error> {
	block.check_context_free(now).map_err(Error::from)
}

/// Spec §4.5 step 3: `block.bits` must equal what the chain parameters
/// require of the block that follows its parent.
pub fn check_difficulty(required_bits: u32, block: &Block) -> Result<(), Error> {
	if block.header.bits != required_bits {
		return Err(Error::consensus(ConsensusRejection::BadDifficulty(block.header.bits, required_bits)));
	}
	Ok(())
}

/// Connects `block`, already known to sit at `height` on what is (or is
/// about to become) the trunk, into `spendables` (spec §4.5 step 6):
/// resolves every non-coinbase input against an existing Coin, checks
/// coinbase maturity, optionally verifies scripts, enforces
/// `coinbase_value <= subsidy + fees`, and applies the resulting delta.
/// Returns the Coins removed from `spendables`, the undo journal a later
/// `disconnect` needs to reverse this exact call.
pub fn connect(spendables: &mut Spendables, block: &Block, height: u64, verify_scripts: bool, subsidy: i64) -> Result<Vec<Coin>, Error> {
	let mut spent = Vec::new();
	let mut fee_total: i64 = 0;

	for tx in block.transactions.iter().skip(1) {
		let mut input_value: i64 = 0;
		for (input_index, input) in tx.inputs.iter().enumerate() {
			let coin = spendables.get(&input.prevout).ok_or_else(|| Error::consensus(ConsensusRejection::DoubleSpend(input.prevout)))?;
			if coin.is_coinbase && height < coin.height + COINBASE_MATURITY {
				return Err(Error::consensus(ConsensusRejection::ImmatureCoinbase(input_index)));
			}
			if verify_scripts {
				let checker = TxSignatureChecker::new(tx, input_index);
				let ok = coin.output.script_pubkey.verify(&input.script_sig, &checker, &NoopHook)?;
				if !ok {
					return Err(Error::consensus(ConsensusRejection::BadSignature(input_index)));
				}
			}
			input_value += coin.output.value;
			spendables.remove(&input.prevout)?;
			spent.push(coin);
		}
		fee_total += input_value - tx.total_output_value();
	}

	let coinbase_value = block.transactions[0].total_output_value();
	if coinbase_value > subsidy + fee_total {
		return Err(Error::consensus(ConsensusRejection::BadCoinbase(coinbase_value, subsidy + fee_total)));
	}

	let confirmation_id = block.hash();
	for tx in &block.transactions {
		let tx_hash = tx.hash();
		for (index, output) in tx.outputs.iter().enumerate() {
			spendables.insert(Coin { outpoint: Outpoint { tx_hash, index: index as u32 }, output: output.clone(), height, is_coinbase: tx.is_coinbase(), confirmation_id })?;
		}
	}

	Ok(spent)
}

/// Reverses exactly one prior `connect` call (spec §4.5 step 5):
/// removes every Coin `block` created and restores every Coin it
/// consumed from `spent`, the undo journal `connect` returned.
pub fn disconnect(spendables: &mut Spendables, block: &Block, spent: &[Coin]) -> Result<(), Error> {
	for tx in &block.transactions {
		let tx_hash = tx.hash();
		for index in 0..tx.outputs.len() {
			spendables.remove(&Outpoint { tx_hash, index: index as u32 })?;
		}
	}
	for coin in spent {
		spendables.insert(coin.clone())?;
	}
	Ok(())
}

/// The persisted form of a `connect` call's undo data (spec §4.5 step
/// 8's "optionally the delta journal"): just the Coins it removed, in
/// removal order.
#[derive(Debug, Clone, Default)]
pub struct UndoJournal {
	pub spent: Vec<Coin>,
}

impl Writeable for UndoJournal {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_varint(self.spent.len() as u64)?;
		for coin in &self.spent {
			coin.write(writer)?;
		}
		Ok(())
	}
}

impl Readable for UndoJournal {
	fn read(reader: &mut dyn Reader) -> Result<UndoJournal, ser::Error> {
		let count = reader.read_varint()?;
		let mut spent = Vec::with_capacity(count.min(ledger_core::consensus::MAX_IN_OUT_LEN) as usize);
		for _ in 0..count {
			spent.push(Coin::read(reader)?);
		}
		Ok(UndoJournal { spent })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ledger_core::block::BlockHeader;
	use ledger_core::hash::Hash256;
	use ledger_core::script::Script;
	use ledger_core::transaction::{Input, Output, Transaction};

	fn coinbase(value: i64, seed: &[u8]) -> Transaction {
		Transaction::new(1, vec![Input::new(Outpoint::null(), Script::from_bytes(seed.to_vec()), 0xFFFF_FFFF)], vec![Output::new(value, Script::from_bytes(vec![0x51]))], 0)
	}

	fn block_of(transactions: Vec<Transaction>) -> Block {
		let root = ledger_core::block::merkle_root(&transactions.iter().map(Hashed::hash).collect::<Vec<_>>());
		Block::new(BlockHeader { version: 1, prev: Hash256::ZERO, merkle_root: root, time: 0, bits: 0x207fffff, nonce: 0 }, transactions)
	}

	#[test]
	fn connect_then_disconnect_restores_the_root_hash() {
		let mut spendables = Spendables::new();
		let empty_root = spendables.root_hash();

		let cb = coinbase(5_000_000_000, b"h1");
		let block = block_of(vec![cb]);
		let spent = connect(&mut spendables, &block, 1, false, 5_000_000_000).unwrap();
		assert!(spent.is_empty());
		assert_ne!(spendables.root_hash(), empty_root);

		disconnect(&mut spendables, &block, &spent).unwrap();
		assert_eq!(spendables.root_hash(), empty_root);
	}

	#[test]
	fn coinbase_exceeding_subsidy_plus_fees_is_rejected() {
		let mut spendables = Spendables::new();
		let cb = coinbase(5_000_000_001, b"h1");
		let block = block_of(vec![cb]);
		let result = connect(&mut spendables, &block, 1, false, 5_000_000_000);
		assert!(matches!(result, Err(Error::ConsensusRejection(ConsensusRejection::BadCoinbase(_, _)))));
	}

	#[test]
	fn spending_the_same_coin_twice_in_one_block_is_a_double_spend() {
		let mut spendables = Spendables::new();
		let funding = coinbase(5_000_000_000, b"h1");
		let funding_block = block_of(vec![funding.clone()]);
		connect(&mut spendables, &funding_block, 1, false, 5_000_000_000).unwrap();

		let outpoint = Outpoint { tx_hash: funding.hash(), index: 0 };
		let spend_a = Transaction::new(1, vec![Input::new(outpoint, Script::from_bytes(vec![]), 0xFFFF_FFFF)], vec![Output::new(1, Script::from_bytes(vec![0x51]))], 0);
		let spend_b = Transaction::new(1, vec![Input::new(outpoint, Script::from_bytes(vec![]), 0xFFFF_FFFF)], vec![Output::new(1, Script::from_bytes(vec![0x51]))], 0);
		let cb2 = coinbase(5_000_000_000, b"h101");
		let block = block_of(vec![cb2, spend_a, spend_b]);

		let result = connect(&mut spendables, &block, 101, false, 5_000_000_000);
		assert!(matches!(result, Err(Error::ConsensusRejection(ConsensusRejection::DoubleSpend(_)))));
	}

	#[test]
	fn immature_coinbase_input_is_rejected() {
		let mut spendables = Spendables::new();
		let funding = coinbase(5_000_000_000, b"h1");
		let funding_block = block_of(vec![funding.clone()]);
		connect(&mut spendables, &funding_block, 1, false, 5_000_000_000).unwrap();

		let outpoint = Outpoint { tx_hash: funding.hash(), index: 0 };
		let spend = Transaction::new(1, vec![Input::new(outpoint, Script::from_bytes(vec![]), 0xFFFF_FFFF)], vec![Output::new(1, Script::from_bytes(vec![0x51]))], 0);
		let cb2 = coinbase(5_000_000_000, b"h50");
		let block = block_of(vec![cb2, spend]);

		// only 49 confirmations deep, short of COINBASE_MATURITY.
		let result = connect(&mut spendables, &block, 50, false, 5_000_000_000);
		assert!(matches!(result, Err(Error::ConsensusRejection(ConsensusRejection::ImmatureCoinbase(_)))));
	}
}

//! Whole-block context-free validation: a coinbase plus a couple of
//! ordinary transactions, checked the way `ledger_chain`'s pipeline will
//! before ever touching Spendables or the tree.

use ledger_core::block::{Block, BlockError, BlockHeader};
use ledger_core::hash::{Hash256, Hashed};
use ledger_core::script::Script;
use ledger_core::transaction::{Input, Outpoint, Output, Transaction};

fn mine(mut block: Block) -> Block {
	loop {
		if block.header.meets_target() {
			return block;
		}
		block.header.nonce += 1;
	}
}

fn coinbase() -> Transaction {
	Transaction::new(
		1,
		vec![Input::new(Outpoint::null(), Script::from_bytes(vec![4, 1, 2, 3, 4]), 0xFFFF_FFFF)],
		vec![Output::new(5_000_000_000, Script::from_bytes(vec![0x51]))],
		0,
	)
}

fn ordinary_tx(seed: &[u8]) -> Transaction {
	Transaction::new(
		1,
		vec![Input::new(Outpoint { tx_hash: Hash256::from_sha256d(seed), index: 0 }, Script::from_bytes(vec![0x51]), 0xFFFF_FFFF)],
		vec![Output::new(100, Script::from_bytes(vec![0x51]))],
		0,
	)
}

#[test]
fn multi_transaction_block_passes_context_free_checks() {
	let cb = coinbase();
	let tx_a = ordinary_tx(b"a");
	let tx_b = ordinary_tx(b"b");
	let root = ledger_core::block::merkle_root(&[cb.hash(), tx_a.hash(), tx_b.hash()]);

	let block = mine(Block::new(
		BlockHeader { version: 1, prev: Hash256::ZERO, merkle_root: root, time: 0, bits: 0x207fffff, nonce: 0 },
		vec![cb, tx_a, tx_b],
	));

	assert!(block.check_context_free(u32::MAX).is_ok());
}

#[test]
fn block_is_rejected_if_merkle_root_does_not_match() {
	let cb = coinbase();
	let wrong_root = Hash256::from_sha256d(b"not the real root");
	let block = mine(Block::new(
		BlockHeader { version: 1, prev: Hash256::ZERO, merkle_root: wrong_root, time: 0, bits: 0x207fffff, nonce: 0 },
		vec![cb],
	));

	assert!(matches!(block.check_context_free(u32::MAX), Err(BlockError::MerkleRootMismatch(_, _))));
}

#[test]
fn block_is_rejected_if_timestamp_is_too_far_in_future() {
	let cb = coinbase();
	let root = ledger_core::block::merkle_root(&[cb.hash()]);
	let block = mine(Block::new(
		BlockHeader { version: 1, prev: Hash256::ZERO, merkle_root: root, time: u32::MAX, bits: 0x207fffff, nonce: 0 },
		vec![cb],
	));

	assert!(matches!(block.check_context_free(1), Err(BlockError::TimestampTooFarInFuture(_))));
}

//! Integration tests for `Node`: opening the databases, accepting a
//! mined block and a pooled transaction through the RPC-boundary trait
//! methods, without ever starting the background tasks `Node::start`
//! spawns (no socket is bound by `Node::open` itself).

use ledger_core::block::{merkle_root, Block, BlockHeader};
use ledger_core::hash::Hashed;
use ledger_core::params::{Network, Regtest, ChainParams};
use ledger_core::script::Script;
use ledger_core::transaction::{Input, Output, Outpoint, Transaction};
use ledger_node::config::NodeConfig;
use ledger_node::node::Node;
use ledger_node::rpc_boundary::{NodeMutations, NodeQueries};
use tempfile::tempdir;

fn regtest_config(data_dir: &std::path::Path) -> NodeConfig {
	let mut config = NodeConfig::default();
	config.data_dir = data_dir.to_path_buf();
	config.network = Network::Regtest;
	config.listen_port = 0;
	config
}

fn coinbase(value: i64, seed: &[u8]) -> Transaction {
	Transaction::new(
		1,
		vec![Input::new(Outpoint::null(), Script::from_bytes(seed.to_vec()), 0xFFFF_FFFF)],
		vec![Output::new(value, Script::from_bytes(vec![0x51]))],
		0,
	)
}

fn mine(prev: ledger_core::hash::Hash256, time: u32, transactions: Vec<Transaction>) -> Block {
	let root = merkle_root(&transactions.iter().map(Hashed::hash).collect::<Vec<_>>());
	let mut block = Block::new(BlockHeader { version: 1, prev, merkle_root: root, time, bits: 0x207fffff, nonce: 0 }, transactions);
	while !block.header.meets_target() {
		block.header.nonce += 1;
	}
	block
}

#[test]
fn open_starts_at_the_network_genesis() {
	let dir = tempdir().unwrap();
	let node = Node::open(regtest_config(dir.path())).unwrap();
	assert_eq!(node.get_block_count(), 0);
	assert_eq!(node.get_best_hash(), Regtest.genesis().hash());
}

#[test]
fn submit_block_advances_the_tip_and_fires_events() {
	let dir = tempdir().unwrap();
	let node = Node::open(regtest_config(dir.path())).unwrap();

	let genesis_hash = Regtest.genesis().hash();
	let block = mine(genesis_hash, 1_296_688_700, vec![coinbase(50 * 100_000_000, b"height 1")]);

	node.submit_block(block.clone()).unwrap();

	assert_eq!(node.get_block_count(), 1);
	assert_eq!(node.get_best_hash(), block.header.hash());
	assert_eq!(node.get_block_hash(1), Some(block.header.hash()));
	assert_eq!(node.get_block(&block.header.hash()).unwrap().header.nonce, block.header.nonce);
}

#[test]
fn submit_transaction_is_reflected_in_the_mempool_queries() {
	let dir = tempdir().unwrap();
	let node = Node::open(regtest_config(dir.path())).unwrap();

	let genesis_hash = Regtest.genesis().hash();
	let funding = coinbase(50 * 100_000_000, b"height 1 funding");
	let funding_hash = funding.hash();
	let block = mine(genesis_hash, 1_296_688_700, vec![funding]);
	node.submit_block(block).unwrap();

	// Regtest has no coinbase-maturity enforcement at the mempool layer
	// (spec §4.4 only checks script + fee, not maturity); a spend of the
	// just-confirmed coinbase is admissible immediately.
	let spend = Transaction::new(
		1,
		vec![Input::new(Outpoint { tx_hash: funding_hash, index: 0 }, Script::from_bytes(vec![]), 0xFFFF_FFFF)],
		vec![Output::new(49 * 100_000_000, Script::from_bytes(vec![0x51]))],
		0,
	);
	let spend_hash = spend.hash();

	let returned_hash = node.submit_transaction(spend).unwrap();
	assert_eq!(returned_hash, spend_hash);

	assert_eq!(node.get_mempool(), vec![spend_hash]);
	assert!(node.get_transaction(&spend_hash).is_some());
}

#[test]
fn search_finds_blocks_then_falls_back_to_mempool() {
	let dir = tempdir().unwrap();
	let node = Node::open(regtest_config(dir.path())).unwrap();

	use ledger_node::rpc_boundary::SearchResult;
	let unknown = ledger_core::hash::Hash256::ZERO;
	assert!(matches!(node.search(&unknown), SearchResult::NotFound));

	let genesis_hash = Regtest.genesis().hash();
	assert!(matches!(node.search(&genesis_hash), SearchResult::Block(_)));
}

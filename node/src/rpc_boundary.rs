//! The RPC boundary (spec §6): the query/mutation/subscription method
//! set the out-of-scope JSON-RPC HTTP layer would dispatch into,
//! expressed as plain Rust traits with no HTTP framing of their own.
//! Grounded on `original_source/src/coinChain/NodeRPC.cpp`'s method
//! enumeration, mapped 1:1 onto spec.md §6's bullet list; `Node`
//! (`node.rs`) is the only implementation in this workspace.

use ledger_core::block::Block;
use ledger_core::hash::Hash256;
use ledger_core::transaction::Transaction;
use ledger_p2p::endpoint::Endpoint;
use ledger_p2p::peer::PeerInfo;

use crate::error::Error;

/// Answer to `get_info` (spec §6): a snapshot of node-wide state, the
/// same handful of figures `bitcoind`-style `getinfo` calls return.
#[derive(Debug, Clone)]
pub struct NodeInfo {
	pub version: u32,
	pub block_count: u64,
	pub best_hash: Hash256,
	pub difficulty: f64,
	pub connections: usize,
	pub mempool_size: usize,
}

/// Result of `search(address|hash)` (spec §6): whichever of a block or
/// a transaction the hash named, or neither.
#[derive(Debug, Clone)]
pub enum SearchResult {
	Block(Block),
	Transaction(Transaction),
	NotFound,
}

/// Read-only queries the RPC boundary exposes (spec §6's "Queries"
/// bullet list).
pub trait NodeQueries {
	fn get_block_count(&self) -> u64;
	fn get_best_hash(&self) -> Hash256;
	fn get_block_hash(&self, height: u64) -> Option<Hash256>;
	fn get_block(&self, hash: &Hash256) -> Option<Block>;
	fn get_transaction(&self, hash: &Hash256) -> Option<Transaction>;
	fn get_difficulty(&self) -> f64;
	fn get_connection_count(&self) -> usize;
	fn get_info(&self) -> NodeInfo;
	fn get_peer_info(&self) -> Vec<PeerInfo>;
	fn get_mempool(&self) -> Vec<Hash256>;
	/// Looks a hash up as a block first, then a mempool/confirmed
	/// transaction (spec §6: "search(address|hash)" — the address half
	/// requires the `searchable` tx-index this design does not populate
	/// yet; see DESIGN.md's Open Question for this method).
	fn search(&self, hash: &Hash256) -> SearchResult;
}

/// State-changing operations the RPC boundary exposes (spec §6's
/// "Mutations" bullet list).
pub trait NodeMutations {
	fn submit_transaction(&self, tx: Transaction) -> Result<Hash256, Error>;
	fn submit_block(&self, block: Block) -> Result<(), Error>;
	fn add_peer(&self, endpoint: Endpoint) -> Result<(), Error>;
	fn connect_peer(&self, endpoint: Endpoint) -> Result<(), Error>;
}

/// What a subscriber is notified of (spec §6's subscription interface):
/// the union of `ledger_chain::ChainEvent` and a pool-originated
/// transaction-accepted event, since `ledger_chain` itself never raises
/// the latter (DESIGN.md: Claims admission lives in `ledger_pool`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
	BlockAccepted { hash: Hash256, height: u64 },
	TransactionAccepted { hash: Hash256 },
}

/// Registration surface for (tx-accepted, block-accepted) listeners
/// (spec §6's "Subscription" bullet).
pub trait NodeSubscriptions {
	fn subscribe<F: Fn(&NodeEvent) + Send + Sync + 'static>(&self, f: F);
}

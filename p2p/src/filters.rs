//! Per-command message handling (spec §4.6 post-handshake duties).
//! Grounded on `original_source/include/coinChain/TransactionFilter.h`'s
//! `Filter` shape: a small set of commands it claims, an orphan map
//! keyed by the missing input it's waiting on, and a `process` entry
//! point invoked once a transaction clears. Reimplemented as a set of
//! stateless dispatch functions plus the two caches
//! (`TransactionFilter::_orphans`, relay memory) the teacher's filter
//! keeps, since nothing else here needs per-connection state.
//!
//! This crate never depends on `ledger_chain`/`ledger_pool` directly
//! (DESIGN.md: pool has no dependency on chain, and p2p sits above
//! both) — `ChainQuery`/`PoolQuery` are the narrow seams `ledger_node`'s
//! adapter implements.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use ledger_core::block::{Block, BlockHeader};
use ledger_core::hash::{Hash256, Hashed};
use ledger_core::transaction::Transaction;

use crate::bloom::BloomFilter;
use crate::message::{AddrList, BlockLocator, HeaderList, InventoryItem, InventoryKind, InventoryList, Message};
use crate::peer::PeerHandle;

/// Relay memory keeps recently broadcast bytes around long enough to
/// serve `getdata` without re-asking the chain/pool (spec §5: "Relay
/// memory ... bounded, with 15-minute TTL").
pub const RELAY_TTL: Duration = Duration::from_secs(15 * 60);

/// Read-only chain access a filter handler needs; implemented by
/// `ledger_node`'s adapter over the concrete `ledger_chain::Chain`.
pub trait ChainQuery: Send + Sync {
	fn get_block(&self, hash: &Hash256) -> Option<Block>;
	fn get_header(&self, hash: &Hash256) -> Option<BlockHeader>;
	fn best_hash(&self) -> Hash256;
	/// Walks forward from the best common ancestor in `locator`, up to
	/// `limit` hashes (spec §4.6's `getblocks`/`getheaders` service).
	fn locate(&self, locator: &[Hash256], stop: &Hash256, limit: usize) -> Vec<Hash256>;
	fn submit_block(&self, block: Block) -> Result<(), String>;
}

/// Read-only mempool access a filter handler needs; implemented by
/// `ledger_node`'s adapter over `ledger_pool::TransactionPool`.
pub trait PoolQuery: Send + Sync {
	fn get_transaction(&self, hash: &Hash256) -> Option<Transaction>;
	fn submit_transaction(&self, tx: Transaction) -> Result<(), String>;
	fn known_hashes(&self) -> Vec<Hash256>;
}

struct RelayEntry<T> {
	value: T,
	at: Instant,
}

/// A bounded, TTL'd cache of recently relayed objects, shared by every
/// session so a `getdata` for something we just broadcast doesn't need
/// a chain/pool round-trip.
pub struct RelayMemory {
	transactions: Mutex<HashMap<Hash256, RelayEntry<Transaction>>>,
	blocks: Mutex<HashMap<Hash256, RelayEntry<Block>>>,
}

impl RelayMemory {
	pub fn new() -> RelayMemory {
		RelayMemory { transactions: Mutex::new(HashMap::new()), blocks: Mutex::new(HashMap::new()) }
	}

	pub fn remember_transaction(&self, hash: Hash256, tx: Transaction) {
		self.transactions.lock().insert(hash, RelayEntry { value: tx, at: Instant::now() });
	}

	pub fn remember_block(&self, hash: Hash256, block: Block) {
		self.blocks.lock().insert(hash, RelayEntry { value: block, at: Instant::now() });
	}

	pub fn get_transaction(&self, hash: &Hash256) -> Option<Transaction> {
		self.transactions.lock().get(hash).map(|e| e.value.clone())
	}

	pub fn get_block(&self, hash: &Hash256) -> Option<Block> {
		self.blocks.lock().get(hash).map(|e| e.value.clone())
	}

	/// Drops everything older than `RELAY_TTL`; called periodically by
	/// the orchestrator.
	pub fn expire(&self) {
		let now = Instant::now();
		self.transactions.lock().retain(|_, e| now.duration_since(e.at) < RELAY_TTL);
		self.blocks.lock().retain(|_, e| now.duration_since(e.at) < RELAY_TTL);
	}
}

impl Default for RelayMemory {
	fn default() -> RelayMemory {
		RelayMemory::new()
	}
}

/// A transaction held back because one of its inputs isn't visible yet
/// (teacher's `TransactionFilter::_orphans`/`_orphansByPrev`).
#[derive(Default)]
pub struct OrphanTransactions {
	by_hash: Mutex<HashMap<Hash256, Transaction>>,
}

impl OrphanTransactions {
	pub fn insert(&self, tx: Transaction) {
		let hash = tx.hash();
		self.by_hash.lock().insert(hash, tx);
	}

	pub fn remove(&self, hash: &Hash256) -> Option<Transaction> {
		self.by_hash.lock().remove(hash)
	}

	pub fn len(&self) -> usize {
		self.by_hash.lock().len()
	}
}

/// What a handler asks the session loop to do after processing one
/// message.
pub enum Action {
	Reply(Message),
	Broadcast(Message),
	SendTo(SocketAddr, Message),
	Disconnect,
}

/// Ties a peer's installed bloom filter (`filterload`/`filteradd`/
/// `filterclear`) to the rest of the message handling; one instance per
/// connected peer.
pub struct FilterState {
	bloom: RwLock<Option<BloomFilter>>,
}

impl FilterState {
	pub fn new() -> FilterState {
		FilterState { bloom: RwLock::new(None) }
	}

	pub fn load(&self, filter: BloomFilter) {
		*self.bloom.write() = Some(filter);
	}

	pub fn clear(&self) {
		*self.bloom.write() = None;
	}

	pub fn add(&self, data: &[u8]) {
		if let Some(filter) = self.bloom.write().as_mut() {
			filter.insert(data);
		}
	}

	/// Whether `tx` should be relayed to this peer under its installed
	/// filter; peers with no filter installed see everything.
	pub fn matches(&self, tx: &Transaction) -> bool {
		match self.bloom.write().as_mut() {
			Some(filter) => filter.is_relevant_and_update(tx),
			None => true,
		}
	}
}

impl Default for FilterState {
	fn default() -> FilterState {
		FilterState::new()
	}
}

/// The shared handler state every connected session's message loop
/// dispatches through (spec §4.6 post-handshake duties).
pub struct Handlers {
	pub chain: Arc<dyn ChainQuery>,
	pub pool: Arc<dyn PoolQuery>,
	pub relay: Arc<RelayMemory>,
	pub orphans: Arc<OrphanTransactions>,
}

const MAX_GETBLOCKS_RESPONSE: usize = 500;
const MAX_GETHEADERS_RESPONSE: usize = 2_000;

impl Handlers {
	/// Processes one inbound message from `peer`, returning the actions
	/// the session loop / peer set should carry out in response.
	pub fn handle(&self, peer: &PeerHandle, filter: &FilterState, message: Message) -> Vec<Action> {
		match message {
			Message::Inv(InventoryList(items)) => self.handle_inv(peer, items),
			Message::GetData(InventoryList(items)) => self.handle_getdata(peer, items),
			Message::GetBlocks(BlockLocator { hashes, stop }) => self.handle_getblocks(&hashes, &stop),
			Message::GetHeaders(BlockLocator { hashes, stop }) => self.handle_getheaders(&hashes, &stop),
			Message::Tx(tx) => self.handle_tx(peer, filter, tx),
			Message::Block(block) => self.handle_block(block),
			Message::GetAddr => Vec::new(),
			Message::Addr(AddrList(_entries)) => Vec::new(),
			Message::FilterLoad(load) => {
				match crate::bloom::BloomFilter::from_parts(load.data, load.hash_funcs, load.tweak, load.flags) {
					Some(bloom) => filter.load(bloom),
					None => return vec![Action::Disconnect],
				}
				Vec::new()
			}
			Message::FilterAdd(add) => {
				filter.add(&add.0);
				Vec::new()
			}
			Message::FilterClear => {
				filter.clear();
				Vec::new()
			}
			Message::Mempool => {
				let items = self.pool.known_hashes().into_iter().map(|hash| InventoryItem { kind: InventoryKind::Transaction, hash }).collect();
				vec![Action::Reply(Message::Inv(InventoryList(items)))]
			}
			_ => Vec::new(),
		}
	}

	fn handle_inv(&self, peer: &PeerHandle, items: Vec<InventoryItem>) -> Vec<Action> {
		let mut unknown = Vec::new();
		for item in items {
			if peer.mark_known(item.hash) {
				unknown.push(item);
			}
		}
		if unknown.is_empty() {
			return Vec::new();
		}
		vec![Action::Reply(Message::GetData(InventoryList(unknown)))]
	}

	fn handle_getdata(&self, _peer: &PeerHandle, items: Vec<InventoryItem>) -> Vec<Action> {
		let mut actions = Vec::new();
		for item in items {
			match item.kind {
				InventoryKind::Transaction => {
					if let Some(tx) = self.relay.get_transaction(&item.hash).or_else(|| self.pool.get_transaction(&item.hash)) {
						actions.push(Action::Reply(Message::Tx(tx)));
					}
				}
				InventoryKind::Block | InventoryKind::FilteredBlock => {
					if let Some(block) = self.relay.get_block(&item.hash).or_else(|| self.chain.get_block(&item.hash)) {
						actions.push(Action::Reply(Message::Block(block)));
					}
				}
			}
		}
		actions
	}

	fn handle_getblocks(&self, locator: &[Hash256], stop: &Hash256) -> Vec<Action> {
		let hashes = self.chain.locate(locator, stop, MAX_GETBLOCKS_RESPONSE);
		let items = hashes.into_iter().map(|hash| InventoryItem { kind: InventoryKind::Block, hash }).collect();
		vec![Action::Reply(Message::Inv(InventoryList(items)))]
	}

	fn handle_getheaders(&self, locator: &[Hash256], stop: &Hash256) -> Vec<Action> {
		let hashes = self.chain.locate(locator, stop, MAX_GETHEADERS_RESPONSE);
		let headers = hashes.iter().filter_map(|hash| self.chain.get_header(hash)).collect();
		vec![Action::Reply(Message::Headers(HeaderList(headers)))]
	}

	fn handle_tx(&self, peer: &PeerHandle, filter: &FilterState, tx: Transaction) -> Vec<Action> {
		let hash = tx.hash();
		peer.mark_known(hash);
		match self.pool.submit_transaction(tx.clone()) {
			Ok(()) => {
				self.relay.remember_transaction(hash, tx.clone());
				if filter.matches(&tx) {
					vec![Action::Broadcast(Message::Inv(InventoryList(vec![InventoryItem { kind: InventoryKind::Transaction, hash }])))]
				} else {
					Vec::new()
				}
			}
			Err(_) => {
				self.orphans.insert(tx);
				Vec::new()
			}
		}
	}

	fn handle_block(&self, block: Block) -> Vec<Action> {
		let hash = block.header.hash();
		match self.chain.submit_block(block.clone()) {
			Ok(()) => {
				self.relay.remember_block(hash, block);
				vec![Action::Broadcast(Message::Inv(InventoryList(vec![InventoryItem { kind: InventoryKind::Block, hash }])))]
			}
			Err(_) => Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct StubChain;
	impl ChainQuery for StubChain {
		fn get_block(&self, _hash: &Hash256) -> Option<Block> {
			None
		}
		fn get_header(&self, _hash: &Hash256) -> Option<BlockHeader> {
			None
		}
		fn best_hash(&self) -> Hash256 {
			Hash256::ZERO
		}
		fn locate(&self, _locator: &[Hash256], _stop: &Hash256, _limit: usize) -> Vec<Hash256> {
			Vec::new()
		}
		fn submit_block(&self, _block: Block) -> Result<(), String> {
			Err("stub".into())
		}
	}

	struct StubPool {
		accepted: AtomicUsize,
	}
	impl PoolQuery for StubPool {
		fn get_transaction(&self, _hash: &Hash256) -> Option<Transaction> {
			None
		}
		fn submit_transaction(&self, _tx: Transaction) -> Result<(), String> {
			self.accepted.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
		fn known_hashes(&self) -> Vec<Hash256> {
			Vec::new()
		}
	}

	fn sample_tx() -> Transaction {
		use ledger_core::script::Script;
		use ledger_core::transaction::{Input, Output, Outpoint};
		Transaction::new(
			1,
			vec![Input::new(Outpoint { tx_hash: Hash256::from_sha256d(b"prev"), index: 0 }, Script::from_bytes(vec![]), 0xFFFF_FFFF)],
			vec![Output::new(1000, Script::from_bytes(vec![0x51]))],
			0,
		)
	}

	fn stub_handlers() -> Handlers {
		Handlers {
			chain: Arc::new(StubChain),
			pool: Arc::new(StubPool { accepted: AtomicUsize::new(0) }),
			relay: Arc::new(RelayMemory::new()),
			orphans: Arc::new(OrphanTransactions::default()),
		}
	}

	#[test]
	fn accepted_tx_with_no_filter_broadcasts() {
		let handlers = stub_handlers();
		let filter = FilterState::new();
		let peer = PeerHandle::new_for_test("127.0.0.1:8333".parse().unwrap());
		let actions = handlers.handle(&peer, &filter, Message::Tx(sample_tx()));
		assert!(matches!(actions.as_slice(), [Action::Broadcast(Message::Inv(_))]));
	}
}

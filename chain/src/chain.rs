//! The `Chain` engine (spec §4.5, C8): the single structure holding
//! `BlockTree`, `Spendables`, the persistent store, and the block file,
//! behind the narrow set of operations the rest of the workspace needs
//! — `accept_block` plus read-only accessors. Claims (the mempool) and
//! `accept_transaction` live one layer up, in `ledger_node`'s adapter:
//! this crate never depends on `ledger_pool`, the same way the
//! teacher's `grin_pool` has no dependency on `grin_chain` (DESIGN.md).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use ledger_core::block::{Block, BlockHeader};
use ledger_core::consensus;
use ledger_core::hash::{Hash256, Hashed};
use ledger_core::params::{params_for, ChainParams, Network};
use ledger_core::transaction::{Outpoint, Transaction};
use ledger_store::chain_store::BlockIndexEntry;
use ledger_store::{BlockFile, BlockFilePosition, ChainStore};

use crate::blocktree::{BlockRef, BlockTree, Changes};
use crate::error::Error;
use crate::pipe::{self, UndoJournal};
use crate::spendables::{Coin, Spendables};

/// How much script/signature verification `accept_block` performs,
/// trading CPU for trust in already-buried history (spec §4.5's
/// "Verification strictness" knob).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerificationStrictness {
	/// Accept headers and structure only; never run the script
	/// evaluator. Useful only for a pruned/SPV-style deployment.
	None,
	/// Context-free and difficulty checks only, no script evaluation.
	Minimal,
	/// Verify scripts for every block after the network's last
	/// checkpoint; blocks at or before it are trusted outright.
	LastCheckpoint,
	/// Verify scripts only within one coinbase-maturity window of the
	/// current tip; older connects (e.g. during a rebuild replay) are
	/// trusted.
	Lazy,
	/// Verify every script on every block, unconditionally.
	Full,
}

/// How much of a connected block's data this `Chain` keeps on disk
/// (spec §4.5's "Persistence strictness" knob).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PersistenceStrictness {
	/// Keep only `BlockIndexEntry` rows; no bodies, no undo journals.
	/// A chain opened this way cannot rebuild `Spendables` after a
	/// restart.
	HeadersOnly,
	/// Keep bodies but not per-block undo journals; a reorg disconnect
	/// falls back to replaying from genesis.
	Minimal,
	/// Keep bodies and undo journals, enabling cheap reorg disconnects.
	Full,
}

/// What a subscriber (spec §6's subscription interface) is notified of.
/// `TransactionAccepted` is never emitted by this crate — Claims
/// admission happens in `ledger_pool` — but shares this type so
/// `ledger_node`'s adapter can multiplex both event sources onto one
/// subscriber list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
	BlockAccepted { hash: Hash256, height: u64 },
	TransactionAccepted { hash: Hash256 },
}

/// Bounds how many not-yet-connectable blocks `accept_block` will hold
/// onto waiting for a missing parent (spec §9 "bounded budget").
const MAX_ORPHAN_BLOCKS: usize = 750;

#[derive(Default)]
struct OrphanPool {
	by_parent: HashMap<Hash256, Vec<Block>>,
	count: usize,
}

impl OrphanPool {
	fn add(&mut self, missing_parent: Hash256, block: Block) -> bool {
		if self.count >= MAX_ORPHAN_BLOCKS {
			return false;
		}
		self.by_parent.entry(missing_parent).or_default().push(block);
		self.count += 1;
		true
	}

	fn take_children(&mut self, parent: &Hash256) -> Vec<Block> {
		let blocks = self.by_parent.remove(parent).unwrap_or_default();
		self.count -= blocks.len();
		blocks
	}
}

struct Inner {
	tree: BlockTree,
	spendables: Spendables,
}

/// The consensus engine: owns `BlockTree` and `Spendables` behind one
/// lock (so a reader never observes a tip whose Spendables hasn't
/// caught up yet), plus the append-only block file and LMDB-backed
/// index (spec §4.5, §5 "BlockChain holds a single logical transaction
/// per connect/disconnect").
pub struct Chain {
	params: Box<dyn ChainParams>,
	inner: RwLock<Inner>,
	store: ChainStore,
	block_file: Mutex<BlockFile>,
	orphans: Mutex<OrphanPool>,
	subscribers: Mutex<Vec<Box<dyn Fn(&ChainEvent) + Send + Sync>>>,
	/// Serializes `accept_block` end to end: tree splice, body/index
	/// persistence, and the commit batch must happen as one step, not
	/// interleaved with a concurrent acceptance.
	write_lock: Mutex<()>,
	verification: VerificationStrictness,
	persistence: PersistenceStrictness,
}

impl Chain {
	/// Opens (or creates) a chain rooted at `data_dir`. A fresh directory
	/// is seeded with `network`'s genesis block; an existing one is
	/// rebuilt from its persisted block index and trunk bodies.
	pub fn open(data_dir: &str, network: Network, verification: VerificationStrictness, persistence: PersistenceStrictness) -> Result<Chain, Error> {
		let params = params_for(network);
		let env = Arc::new(ledger_store::lmdb::new_env(data_dir));
		let store = ChainStore::open(env)?;
		let mut block_file = BlockFile::open(data_dir, params.magic())?;

		let (tree, spendables) = match store.best_tip()? {
			None => seed_genesis(&params, &store, &mut block_file, persistence)?,
			Some(tip_hash) => rebuild(&store, &block_file, params.as_ref(), tip_hash, verification)?,
		};

		Ok(Chain {
			params,
			inner: RwLock::new(Inner { tree, spendables }),
			store,
			block_file: Mutex::new(block_file),
			orphans: Mutex::new(OrphanPool::default()),
			subscribers: Mutex::new(Vec::new()),
			write_lock: Mutex::new(()),
			verification,
			persistence,
		})
	}

	/// Submits `block` for acceptance (spec §4.5): context-free checks,
	/// then either connection (possibly triggering a reorg) or holding
	/// it in the orphan pool if its parent is not yet known.
	pub fn accept_block(&self, block: Block, now: u32) -> Result<(), Error> {
		pipe::check_context_free(&block, now)?;
		let hash = block.hash();
		let prev = block.header.prev;

		let _guard = self.write_lock.lock();

		if self.inner.read().tree.contains(&hash) {
			return Err(Error::MalformedData(format!("block {} already known", hash)));
		}
		if !self.inner.read().tree.contains(&prev) {
			let mut orphans = self.orphans.lock();
			if !orphans.add(prev, block) {
				return Err(Error::Overloaded("orphan pool is at capacity".into()));
			}
			return Err(Error::OrphanMissingParent(prev));
		}

		self.accept_connected_block(block)?;
		self.resolve_orphans(hash);
		Ok(())
	}

	pub fn tip_hash(&self) -> Hash256 {
		self.inner.read().tree.best().hash
	}

	pub fn tip_height(&self) -> u64 {
		self.inner.read().tree.height().max(0) as u64
	}

	pub fn get_coin(&self, outpoint: &Outpoint) -> Option<Coin> {
		self.inner.read().spendables.get(outpoint)
	}

	pub fn contains_coin(&self, outpoint: &Outpoint) -> bool {
		self.inner.read().spendables.contains(outpoint)
	}

	pub fn spendables_root(&self) -> Hash256 {
		self.inner.read().spendables.root_hash()
	}

	pub fn subsidy(&self, height: u64) -> i64 {
		self.params.subsidy(height)
	}

	pub fn is_standard(&self, tx: &Transaction) -> bool {
		self.params.is_standard(tx)
	}

	/// The magic bytes, checkpoints, and PoW limit this chain was opened
	/// with (spec §6 environment boundary); exposed read-only so
	/// `ledger_node`'s adapters can answer RPC queries (`get_difficulty`,
	/// `get_info`) without duplicating the parameter set.
	pub fn params(&self) -> &dyn ChainParams {
		self.params.as_ref()
	}

	pub fn bits_at_tip(&self) -> u32 {
		self.inner.read().tree.best().bits
	}

	pub fn difficulty(&self) -> f64 {
		ledger_core::target::Difficulty::from_bits(self.bits_at_tip(), self.params.proof_of_work_limit_bits()).as_f64()
	}

	/// The trunk hash at `height`, if the chain is at least that tall
	/// (spec §6's `get_block_hash(height)`).
	pub fn block_hash_at_height(&self, height: u64) -> Option<Hash256> {
		self.inner.read().tree.trunk_at(height as i64).map(|r| r.hash)
	}

	/// Whether `hash` names a header this chain has accepted, trunk or
	/// branch (used by `ledger_p2p::ChainQuery::locate` and by
	/// `already_have` idempotency checks).
	pub fn contains_header(&self, hash: &Hash256) -> bool {
		self.inner.read().tree.contains(hash)
	}

	/// The full block body for `hash`, if this chain's persistence
	/// strictness retained it (spec §6's `get_block(hash)`).
	pub fn get_block(&self, hash: &Hash256) -> Option<Block> {
		self.load_block(hash).ok()
	}

	/// The block header for `hash` (spec §6's `headers` service). Only
	/// available where the body was persisted; a `HeadersOnly` chain
	/// cannot serve this for anything but the accepted tip's own
	/// just-submitted block.
	pub fn get_header(&self, hash: &Hash256) -> Option<BlockHeader> {
		self.get_block(hash).map(|b| b.header)
	}

	/// Walks the trunk forward from the best hash in `locator` that this
	/// chain recognises, up to `limit` hashes or until `stop` is reached
	/// (spec §4.6's `getblocks`/`getheaders` service, §6's 500-entry cap).
	pub fn locate(&self, locator: &[Hash256], stop: &Hash256, limit: usize) -> Vec<Hash256> {
		let inner = self.inner.read();
		let start_height = locator
			.iter()
			.filter_map(|h| inner.tree.get(h))
			.filter(|r| r.is_on_trunk())
			.map(|r| r.absolute_height())
			.max()
			.map(|h| h + 1)
			.unwrap_or(0);

		let mut hashes = Vec::new();
		let mut height = start_height as i64;
		while hashes.len() < limit {
			let Some(r) = inner.tree.trunk_at(height) else { break };
			hashes.push(r.hash);
			if r.hash == *stop {
				break;
			}
			height += 1;
		}
		hashes
	}

	/// Registers a callback invoked, in subscription order, for every
	/// event this chain raises (spec §6's subscription interface).
	pub fn subscribe<F: Fn(&ChainEvent) + Send + Sync + 'static>(&self, f: F) {
		self.subscribers.lock().push(Box::new(f));
	}

	fn notify(&self, events: &[ChainEvent]) {
		let subs = self.subscribers.lock();
		for event in events {
			for sub in subs.iter() {
				sub(event);
			}
		}
	}

	/// Resolves orphans transitively: each newly connected block may
	/// itself be the missing parent of further held blocks.
	fn resolve_orphans(&self, mut parent: Hash256) {
		let mut queue = vec![parent];
		while let Some(next) = queue.pop() {
			parent = next;
			for child in self.orphans.lock().take_children(&parent) {
				let child_hash = child.hash();
				if self.accept_connected_block(child).is_ok() {
					queue.push(child_hash);
				}
			}
		}
	}

	/// Connects a block whose parent is already known to the tree (spec
	/// §4.5 steps 3-8): checks difficulty, splices it into `BlockTree`,
	/// persists its body and index row unconditionally, and — if the
	/// splice changed the trunk — applies the resulting Spendables delta,
	/// rolling the splice back on failure.
	fn accept_connected_block(&self, block: Block) -> Result<(), Error> {
		let hash = block.hash();
		let prev_hash = block.header.prev;

		let required_bits = {
			let inner = self.inner.read();
			let prev = inner.tree.get(&prev_hash).expect("caller verified the parent is known");
			let height = prev.absolute_height() + 1;
			self.required_bits(&inner.tree, prev, height)
		};
		pipe::check_difficulty(required_bits, &block)?;

		let block_ref = BlockRef::new(hash, prev_hash, block.header.time, block.header.bits);
		let changes = {
			let mut inner = self.inner.write();
			inner.tree.insert(block_ref)?
		};

		let position = self.persist_block_body(&block)?;
		let batch = self.store.batch()?;
		batch.put_block_index(&BlockIndexEntry { hash, prev: prev_hash, time: block.header.time, bits: block.header.bits })?;
		if let Some(pos) = &position {
			batch.put_block_file_position(&hash, pos)?;
		}
		batch.commit()?;

		let Some(changes) = changes else {
			return Ok(());
		};

		match self.apply_changes(&changes, &block) {
			Ok(events) => {
				self.notify(&events);
				Ok(())
			}
			Err(e) => {
				// Popping exactly as many times as we spliced in makes
				// BlockTree's own dominance check re-promote the old
				// trunk on the last pop (see blocktree.rs's
				// `pop_back_promotes_a_branch_that_now_dominates`).
				let mut inner = self.inner.write();
				for _ in 0..changes.inserted.len() {
					inner.tree.pop_back();
				}
				Err(e)
			}
		}
	}

	/// Applies a trunk-changing splice to Spendables: disconnects the old
	/// trunk tail (newest first) using persisted undo journals, connects
	/// the new trunk tail (oldest first), and commits the new tip,
	/// Spendables root, and undo journals in one batch (spec §4.5 steps
	/// 5-8). On any failure nothing here has been written or swapped in;
	/// the caller rolls back the tree splice itself.
	fn apply_changes(&self, changes: &Changes, just_submitted: &Block) -> Result<Vec<ChainEvent>, Error> {
		let submitted_hash = just_submitted.hash();
		let mut spendables = self.inner.read().spendables.snapshot();
		let mut events = Vec::with_capacity(changes.inserted.len());
		let mut undo_writes = Vec::with_capacity(changes.inserted.len());

		for hash in &changes.deleted {
			let block = self.load_block(hash)?;
			let undo = self.load_undo(hash)?;
			pipe::disconnect(&mut spendables, &block, &undo.spent)?;
		}

		let tip_height = self.inner.read().tree.height().max(0) as u64;
		for hash in &changes.inserted {
			let height = self.inner.read().tree.get(hash).expect("just spliced onto the trunk").absolute_height();
			let block = if *hash == submitted_hash { just_submitted.clone() } else { self.load_block(hash)? };
			let verify_scripts = should_verify_scripts(self.verification, self.params.checkpoints(), height, tip_height);
			let subsidy = self.params.subsidy(height);
			let spent = pipe::connect(&mut spendables, &block, height, verify_scripts, subsidy)?;
			events.push(ChainEvent::BlockAccepted { hash: *hash, height });
			undo_writes.push((*hash, UndoJournal { spent }));
		}

		let new_root = spendables.root_hash();
		{
			let mut inner = self.inner.write();
			inner.spendables = spendables;
		}

		let batch = self.store.batch()?;
		batch.set_best_tip(&submitted_hash)?;
		batch.set_spendables_root(&new_root)?;
		for hash in &changes.deleted {
			batch.delete_undo_data(hash)?;
		}
		for (hash, undo) in &undo_writes {
			let bytes = ledger_core::ser::ser_vec(undo).map_err(|e| Error::Fatal(e.to_string()))?;
			batch.put_undo_data(hash, &bytes)?;
		}
		batch.commit()?;

		Ok(events)
	}

	/// Recomputes the `bits` the chain parameters require of the block
	/// that follows `prev` at `height` (spec §4.5 step 3).
	fn required_bits(&self, tree: &BlockTree, prev: &BlockRef, height: u64) -> u32 {
		if height % consensus::DIFFICULTY_ADJUSTMENT_INTERVAL != 0 {
			return prev.bits;
		}
		let window_start = tree.ancestors(prev.hash).nth((consensus::DIFFICULTY_ADJUSTMENT_INTERVAL - 1) as usize);
		let first_in_window = window_start.map(header_view).unwrap_or_else(|| header_view(tree.genesis()));
		self.params.next_work_required(&header_view(prev), &first_in_window, height)
	}

	fn persist_block_body(&self, block: &Block) -> Result<Option<BlockFilePosition>, Error> {
		if self.persistence == PersistenceStrictness::HeadersOnly {
			return Ok(None);
		}
		let pos = self.block_file.lock().append(block)?;
		Ok(Some(BlockFilePosition { file_id: pos.file_id, offset: pos.offset, size: pos.size }))
	}

	fn load_block(&self, hash: &Hash256) -> Result<Block, Error> {
		let pos = self.store.block_file_position(hash)?.ok_or_else(|| Error::Fatal(format!("missing block file position for {}", hash)))?;
		Ok(self.block_file.lock().read_at(pos.file_id, pos.offset)?)
	}

	fn load_undo(&self, hash: &Hash256) -> Result<UndoJournal, Error> {
		let bytes = self.store.undo_data(hash)?.ok_or_else(|| Error::Fatal(format!("missing undo journal for {}", hash)))?;
		ledger_core::ser::deserialize(&mut &bytes[..]).map_err(|e| Error::Fatal(e.to_string()))
	}
}

/// A partial header reconstructed from a `BlockRef`, valid only insofar
/// as callers only ever read `.time`/`.bits`/`.prev` from it:
/// `ChainParams::next_work_required`'s default implementation never
/// touches `version`/`merkle_root`/`nonce` of either header it is given.
fn header_view(r: &BlockRef) -> BlockHeader {
	BlockHeader { version: 0, prev: r.prev, merkle_root: Hash256::ZERO, time: r.time, bits: r.bits, nonce: 0 }
}

fn should_verify_scripts(verification: VerificationStrictness, checkpoints: &HashMap<u64, Hash256>, height: u64, tip_height: u64) -> bool {
	match verification {
		VerificationStrictness::None | VerificationStrictness::Minimal => false,
		VerificationStrictness::LastCheckpoint => checkpoints.keys().all(|&cp| height > cp),
		VerificationStrictness::Lazy => tip_height.saturating_sub(height) <= consensus::COINBASE_MATURITY,
		VerificationStrictness::Full => true,
	}
}

fn seed_genesis(
	params: &Box<dyn ChainParams>,
	store: &ChainStore,
	block_file: &mut BlockFile,
	persistence: PersistenceStrictness,
) -> Result<(BlockTree, Spendables), Error> {
	let genesis_block = params.genesis();
	let genesis_hash = genesis_block.hash();
	let header = genesis_block.header;
	let tree = BlockTree::new(BlockRef::new(genesis_hash, header.prev, header.time, header.bits));
	let spendables = Spendables::new();

	let position = if persistence == PersistenceStrictness::HeadersOnly { None } else { Some(block_file.append(&genesis_block)?) };

	let batch = store.batch()?;
	batch.put_block_index(&BlockIndexEntry { hash: genesis_hash, prev: header.prev, time: header.time, bits: header.bits })?;
	if let Some(pos) = &position {
		batch.put_block_file_position(&genesis_hash, &BlockFilePosition { file_id: pos.file_id, offset: pos.offset, size: pos.size })?;
	}
	batch.set_best_tip(&genesis_hash)?;
	batch.set_spendables_root(&spendables.root_hash())?;
	batch.commit()?;

	Ok((tree, spendables))
}

/// Reconstructs `BlockTree` and `Spendables` from what is on disk after
/// a restart (spec §9): every persisted `BlockIndexEntry` is reinserted
/// via a worklist that retries entries whose parent hasn't been placed
/// yet, and the trunk is replayed body by body through [`pipe::connect`]
/// to rebuild Spendables. Off-trunk branches need no separate replay:
/// Spendables only ever reflects the trunk, live or on restart, so a
/// branch's would-be effects were never computed in the first place.
fn rebuild(
	store: &ChainStore,
	block_file: &BlockFile,
	params: &dyn ChainParams,
	tip_hash: Hash256,
	verification: VerificationStrictness,
) -> Result<(BlockTree, Spendables), Error> {
	let mut entries: HashMap<Hash256, BlockIndexEntry> = store.iter_block_indices()?.map(|e| (e.hash, e)).collect();

	let genesis_block = params.genesis();
	let genesis_hash = genesis_block.hash();
	let genesis_entry = entries.remove(&genesis_hash).ok_or_else(|| Error::Fatal("genesis missing from persisted block index".into()))?;
	let mut tree = BlockTree::new(BlockRef::new(genesis_entry.hash, genesis_entry.prev, genesis_entry.time, genesis_entry.bits));

	let mut remaining: Vec<BlockIndexEntry> = entries.into_values().collect();
	while !remaining.is_empty() {
		let mut progressed = false;
		let mut still_remaining = Vec::new();
		for entry in remaining {
			if tree.contains(&entry.prev) {
				tree.insert(BlockRef::new(entry.hash, entry.prev, entry.time, entry.bits)).map_err(Error::from)?;
				progressed = true;
			} else {
				still_remaining.push(entry);
			}
		}
		remaining = still_remaining;
		if !progressed && !remaining.is_empty() {
			return Err(Error::Fatal("block index contains entries with a dangling parent reference".into()));
		}
	}

	if tree.best().hash != tip_hash {
		return Err(Error::Fatal("rebuilt trunk tip does not match the persisted best-tip pointer".into()));
	}

	let tip_height = tree.height().max(0) as u64;
	let mut spendables = Spendables::new();
	for height in 1..=tree.height() {
		let height = height as u64;
		let hash = tree.trunk_at(height as i64).expect("within trunk range").hash;
		let pos = store.block_file_position(&hash)?.ok_or_else(|| Error::Fatal(format!("missing block file position for {}", hash)))?;
		let block = block_file.read_at(pos.file_id, pos.offset)?;
		let verify_scripts = should_verify_scripts(verification, params.checkpoints(), height, tip_height);
		let subsidy = params.subsidy(height);
		pipe::connect(&mut spendables, &block, height, verify_scripts, subsidy)?;
	}

	Ok((tree, spendables))
}

#[cfg(test)]
mod tests {
	use super::*;
	use ledger_core::block::merkle_root;
	use ledger_core::params::Regtest;
	use ledger_core::script::Script;
	use ledger_core::transaction::{Input, Output};
	use tempfile::tempdir;

	fn open_chain() -> (tempfile::TempDir, Chain) {
		let dir = tempdir().unwrap();
		let chain = Chain::open(dir.path().to_str().unwrap(), Network::Regtest, VerificationStrictness::Full, PersistenceStrictness::Full).unwrap();
		(dir, chain)
	}

	fn mine(prev: Hash256, time: u32, transactions: Vec<Transaction>) -> Block {
		let root = merkle_root(&transactions.iter().map(Hashed::hash).collect::<Vec<_>>());
		let mut block = Block::new(BlockHeader { version: 1, prev, merkle_root: root, time, bits: 0x207fffff, nonce: 0 }, transactions);
		while !block.header.meets_target() {
			block.header.nonce += 1;
		}
		block
	}

	fn coinbase(value: i64, seed: &[u8]) -> Transaction {
		Transaction::new(1, vec![Input::new(Outpoint::null(), Script::from_bytes(seed.to_vec()), 0xFFFF_FFFF)], vec![Output::new(value, Script::from_bytes(vec![0x51]))], 0)
	}

	#[test]
	fn genesis_only_chain_matches_scenario_s1() {
		let (_dir, chain) = open_chain();
		assert_eq!(chain.tip_height(), 0);
		assert_eq!(chain.tip_hash(), Regtest.genesis().hash());
		assert!(chain.spendables_root() == Spendables::new().root_hash());
	}

	#[test]
	fn valid_linear_extension_advances_the_tip() {
		let (_dir, chain) = open_chain();
		let genesis_hash = chain.tip_hash();
		let cb = coinbase(5_000_000_000, b"h1");
		let cb_hash = cb.hash();
		let block = mine(genesis_hash, 1, vec![cb]);

		chain.accept_block(block.clone(), u32::MAX).unwrap();

		assert_eq!(chain.tip_height(), 1);
		assert_eq!(chain.tip_hash(), block.hash());
		assert!(chain.contains_coin(&Outpoint { tx_hash: cb_hash, index: 0 }));
	}

	#[test]
	fn heavier_branch_triggers_a_reorg() {
		// a1 alone (one block of work) vs. b1+b2 (two blocks of work, same
		// per-block difficulty): unambiguously more cumulative work, unlike
		// a same-length branch which would only tie a1's work and so,
		// correctly, never displace the first-seen trunk.
		let (_dir, chain) = open_chain();
		let genesis_hash = chain.tip_hash();

		let a1 = mine(genesis_hash, 1, vec![coinbase(5_000_000_000, b"a1")]);
		let a1_hash = a1.hash();
		chain.accept_block(a1.clone(), u32::MAX).unwrap();
		assert_eq!(chain.tip_hash(), a1_hash);

		let b1 = mine(genesis_hash, 1, vec![coinbase(5_000_000_000, b"b1")]);
		let b1_hash = b1.hash();
		chain.accept_block(b1.clone(), u32::MAX).unwrap();
		assert_eq!(chain.tip_hash(), a1_hash, "equal work must not displace the first-seen trunk");

		let b2 = mine(b1_hash, 2, vec![coinbase(5_000_000_000, b"b2")]);
		let b2_hash = b2.hash();
		chain.accept_block(b2.clone(), u32::MAX).unwrap();

		assert_eq!(chain.tip_hash(), b2_hash);
		assert_eq!(chain.tip_height(), 2);
		assert!(!chain.contains_coin(&Outpoint { tx_hash: a1.transactions[0].hash(), index: 0 }));
		assert!(chain.contains_coin(&Outpoint { tx_hash: b1.transactions[0].hash(), index: 0 }));
		assert!(chain.contains_coin(&Outpoint { tx_hash: b2.transactions[0].hash(), index: 0 }));
	}

	#[test]
	fn bad_coinbase_value_is_rejected_and_leaves_the_tip_unchanged() {
		let (_dir, chain) = open_chain();
		let genesis_hash = chain.tip_hash();
		let cb = coinbase(5_000_000_001, b"h1"); // 1 unit over the subsidy
		let block = mine(genesis_hash, 1, vec![cb]);

		let result = chain.accept_block(block, u32::MAX);
		assert!(result.is_err());
		assert_eq!(chain.tip_height(), 0);
		assert_eq!(chain.tip_hash(), genesis_hash);
	}

	#[test]
	fn orphan_block_is_held_until_its_parent_arrives() {
		let (_dir, chain) = open_chain();
		let genesis_hash = chain.tip_hash();

		let h1 = mine(genesis_hash, 1, vec![coinbase(5_000_000_000, b"h1")]);
		let h1_hash = h1.hash();
		let h2 = mine(h1_hash, 2, vec![coinbase(5_000_000_000, b"h2")]);
		let h2_hash = h2.hash();

		let result = chain.accept_block(h2.clone(), u32::MAX);
		assert!(matches!(result, Err(Error::OrphanMissingParent(parent)) if parent == h1_hash));
		assert_eq!(chain.tip_height(), 0);

		chain.accept_block(h1, u32::MAX).unwrap();
		assert_eq!(chain.tip_height(), 2);
		assert_eq!(chain.tip_hash(), h2_hash);
	}
}

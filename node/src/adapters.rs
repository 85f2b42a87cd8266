//! Adapters wiring the consensus core (`ledger_chain`, `ledger_pool`)
//! into the wire-protocol seams `ledger_p2p` exposes
//! (`filters::ChainQuery`/`filters::PoolQuery`) and the confirmed-UTXO
//! seam `ledger_pool` exposes (`types::UtxoView`), without either of
//! those crates depending on the other (DESIGN.md). Grounded on the
//! teacher's `servers::common::adapters::NetToChainAdapter`/
//! `PoolToChainAdapter` split: thin structs holding `Arc`s to the real
//! engines, implementing exactly the trait methods the lower layer
//! asked for.

use std::sync::Arc;

use parking_lot::Mutex;

use ledger_chain::Chain;
use ledger_core::block::{Block, BlockHeader};
use ledger_core::hash::Hash256;
use ledger_core::transaction::{Outpoint, Transaction};
use ledger_p2p::filters::{ChainQuery, PoolQuery};
use ledger_pool::types::{ConfirmedOutput, UtxoView};
use ledger_pool::{TransactionPool, TxSource};

/// Read-only view of the confirmed UTXO set admission needs (spec §4.4
/// step 3), backed directly by `Chain::get_coin`.
pub struct ChainUtxoView {
	pub chain: Arc<Chain>,
}

impl UtxoView for ChainUtxoView {
	fn get_output(&self, outpoint: &Outpoint) -> Option<ConfirmedOutput> {
		let coin = self.chain.get_coin(outpoint)?;
		Some(ConfirmedOutput { output: coin.output, is_coinbase: coin.is_coinbase, height: coin.height })
	}
}

/// `ledger_p2p::filters::ChainQuery` over the concrete `Chain`: serves
/// headers-first/blocks-first peer requests straight from the engine's
/// own accessors (spec §4.6 post-handshake duties).
pub struct ChainAdapter {
	pub chain: Arc<Chain>,
}

impl ChainQuery for ChainAdapter {
	fn get_block(&self, hash: &Hash256) -> Option<Block> {
		self.chain.get_block(hash)
	}

	fn get_header(&self, hash: &Hash256) -> Option<BlockHeader> {
		self.chain.get_header(hash)
	}

	fn best_hash(&self) -> Hash256 {
		self.chain.tip_hash()
	}

	fn locate(&self, locator: &[Hash256], stop: &Hash256, limit: usize) -> Vec<Hash256> {
		self.chain.locate(locator, stop, limit)
	}

	fn submit_block(&self, block: Block) -> Result<(), String> {
		let now = crate::now_unix() as u32;
		self.chain.accept_block(block, now).map_err(|e| e.to_string())
	}
}

/// `ledger_p2p::filters::PoolQuery` over a mutex-guarded
/// `TransactionPool` (the pool itself, unlike `Chain`, has no internal
/// locking — its `&mut self` API assumes a single owner the way the
/// teacher's `pool::TransactionPool` does, wrapped in `RwLock` by
/// `servers::common::adapters`).
pub struct PoolAdapter {
	pub pool: Arc<Mutex<TransactionPool>>,
	pub chain: Arc<Chain>,
}

impl PoolQuery for PoolAdapter {
	fn get_transaction(&self, hash: &Hash256) -> Option<Transaction> {
		self.pool.lock().get(hash).map(|c| c.transaction.clone())
	}

	fn submit_transaction(&self, tx: Transaction) -> Result<(), String> {
		let utxo = ChainUtxoView { chain: self.chain.clone() };
		let now = crate::now_unix();
		self.pool.lock().admit(&TxSource::peer("p2p".into()), tx, &utxo, now).map(|_| ()).map_err(|e| e.to_string())
	}

	fn known_hashes(&self) -> Vec<Hash256> {
		self.pool.lock().hashes()
	}
}

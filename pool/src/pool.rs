//! The pool itself (spec §4.4, C7): admission protocol, the spent-
//! outpoint conflict index, fee/size priority ordering, and block-
//! template selection. Grounded on `original_source/include/coinChain/
//! Claims.h`'s `Claims` container (the `spents`/`confirmations` split
//! and the `OptimizeForFeeThenDeltaSpendables` comparator, kept
//! verbatim as this module's [`PriorityKey`] ordering) and restructured
//! the way `pool/src_teacher/pool.rs`'s `TransactionPool` wraps a
//! dependency graph plus index maps rather than exposing the graph
//! directly.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use ledger_core::consensus::MAX_BLOCK_SIZE;
use ledger_core::hash::{Hash256, Hashed};
use ledger_core::script::{NoopHook, TxSignatureChecker};
use ledger_core::transaction::{Outpoint, Transaction};

use crate::claims::Claim;
use crate::error::Error;
use crate::graph::DependencyGraph;
use crate::types::{TxSource, UtxoView};

/// Default minimum relay fee, in satoshis per 1000 bytes of serialized
/// size (spec §4.4 step 5's "fee >= per-chain minimum"; Bitcoin's own
/// historical default of 1000 sat/kB, kept as this design's default
/// since spec.md names no other chain-specific figure).
pub const DEFAULT_MIN_RELAY_FEE_PER_KB: i64 = 1_000;

/// Bytes reserved for the block header and coinbase when computing how
/// much of `MAX_BLOCK_SIZE` a template may spend on pooled claims (spec
/// §4.4: "MAX_BLOCK_SIZE - reserved header/coinbase").
const RESERVED_HEADER_AND_COINBASE_BYTES: usize = 2_000;

/// Orders claims for block-template selection (spec §4.4 step 6):
/// fee-per-byte descending, then `delta_spendables` ascending, with the
/// claim hash as a final tie-break so two claims are never considered
/// equal. The fee-per-byte comparison cross-multiplies (`l.fee*r.size`
/// vs `r.fee*l.size`) to avoid floating point, exactly
/// `Claims.h`'s `OptimizeForFeeThenDeltaSpendables`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PriorityKey {
	fee: i64,
	size: i64,
	delta_spendables: i64,
	hash: Hash256,
}

impl PartialOrd for PriorityKey {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for PriorityKey {
	fn cmp(&self, other: &Self) -> Ordering {
		let lhs = self.fee as i128 * other.size as i128;
		let rhs = other.fee as i128 * self.size as i128;
		// Higher fee-per-byte sorts first: reverse the natural ordering.
		rhs.cmp(&lhs)
			.then_with(|| self.delta_spendables.cmp(&other.delta_spendables))
			.then_with(|| self.hash.cmp(&other.hash))
	}
}

impl PriorityKey {
	fn of(claim: &Claim) -> PriorityKey {
		PriorityKey { fee: claim.fee, size: claim.serialized_size as i64, delta_spendables: claim.delta_spendables, hash: claim.hash }
	}
}

/// The mempool: every currently-admitted [`Claim`], keyed by hash, plus
/// the indices admission and selection need (spec §3 Claims
/// invariants).
pub struct TransactionPool {
	claims: HashMap<Hash256, Claim>,
	/// Every outpoint spent by some claim, mapping to the claim that
	/// spends it (spec §3: "No two Claims share an input outpoint").
	spents: HashMap<Outpoint, Hash256>,
	priority: BTreeSet<PriorityKey>,
	graph: DependencyGraph,
	min_relay_fee_per_kb: i64,
}

impl TransactionPool {
	pub fn new(min_relay_fee_per_kb: i64) -> TransactionPool {
		TransactionPool { claims: HashMap::new(), spents: HashMap::new(), priority: BTreeSet::new(), graph: DependencyGraph::new(), min_relay_fee_per_kb }
	}

	pub fn len(&self) -> usize {
		self.claims.len()
	}

	pub fn is_empty(&self) -> bool {
		self.claims.is_empty()
	}

	pub fn contains(&self, hash: &Hash256) -> bool {
		self.claims.contains_key(hash)
	}

	pub fn get(&self, hash: &Hash256) -> Option<&Claim> {
		self.claims.get(hash)
	}

	/// Every currently-pooled claim's hash, in no particular order
	/// (spec §6's `mempool` command: "respond with the pool's known
	/// hashes").
	pub fn hashes(&self) -> Vec<Hash256> {
		self.claims.keys().copied().collect()
	}

	/// Runs the full admission protocol (spec §4.4 steps 1-6) for `tx`
	/// against `utxo`, the confirmed UTXO set. On success the claim is
	/// recorded and its hash returned; on failure nothing is mutated.
	pub fn admit(&mut self, source: &TxSource, tx: Transaction, utxo: &dyn UtxoView, now: i64) -> Result<Hash256, Error> {
		// Step 1: context-free checks.
		tx.check_context_free()?;
		if tx.is_coinbase() {
			return Err(Error::Coinbase);
		}
		let size = tx.serialized_size();
		if size > MAX_BLOCK_SIZE {
			return Err(Error::TooLarge);
		}

		// Step 2: conflict check.
		for input in &tx.inputs {
			if self.spents.contains_key(&input.prevout) {
				return Err(Error::DoubleSpend(input.prevout));
			}
		}

		// Step 3: input resolution.
		let mut depends_on = Vec::new();
		let mut input_value: i64 = 0;
		let mut resolved = Vec::with_capacity(tx.inputs.len());
		for input in &tx.inputs {
			if let Some(confirmed) = utxo.get_output(&input.prevout) {
				input_value += confirmed.output.value;
				resolved.push(confirmed.output.script_pubkey.clone());
			} else if let Some(parent) = self.claims.get(&input.prevout.tx_hash) {
				let output = parent
					.transaction
					.outputs
					.get(input.prevout.index as usize)
					.ok_or(Error::MissingInput(input.prevout))?;
				input_value += output.value;
				resolved.push(output.script_pubkey.clone());
				depends_on.push(parent.hash);
			} else {
				return Err(Error::MissingInput(input.prevout));
			}
		}

		// Step 4: script verification.
		for (index, script_pubkey) in resolved.iter().enumerate() {
			let checker = TxSignatureChecker::new(&tx, index);
			let ok = script_pubkey.verify(&tx.inputs[index].script_sig, &checker, &NoopHook).map_err(|_| Error::BadSignature(index))?;
			if !ok {
				return Err(Error::BadSignature(index));
			}
		}

		// Step 5: fee check.
		let fee = input_value - tx.total_output_value();
		let required = (self.min_relay_fee_per_kb * size as i64 + 999) / 1000;
		if fee < required {
			return Err(Error::FeeTooLow(fee, required));
		}

		// Step 6: record.
		depends_on.sort();
		depends_on.dedup();
		let claim = Claim::new(tx, now, fee, depends_on.clone());
		let hash = claim.hash;
		for input in &claim.transaction.inputs {
			self.spents.insert(input.prevout, hash);
		}
		self.graph.add(hash, &depends_on);
		self.priority.insert(PriorityKey::of(&claim));
		self.claims.insert(hash, claim);

		log::debug!("pool: admitted claim {} from {} (fee {})", hash, source.debug_name, fee);
		Ok(hash)
	}

	/// Drops a claim and unregisters its indices, without touching its
	/// descendants — callers that need descendant eviction use
	/// [`TransactionPool::evict_with_descendants`].
	fn drop_one(&mut self, hash: Hash256) -> Option<Claim> {
		let claim = self.claims.remove(&hash)?;
		for input in &claim.transaction.inputs {
			self.spents.remove(&input.prevout);
		}
		self.graph.remove(hash, &claim.depends_on);
		self.priority.remove(&PriorityKey::of(&claim));
		Some(claim)
	}

	/// Drops `hash` and everything that (transitively) depends on it
	/// (spec §3 Claim lifecycle: "destroyed on ... eviction, or
	/// conflict").
	pub fn evict_with_descendants(&mut self, hash: Hash256) -> Vec<Claim> {
		let mut victims = self.graph.descendants(hash);
		victims.push(hash);
		let mut evicted = Vec::with_capacity(victims.len());
		for victim in victims {
			if let Some(claim) = self.drop_one(victim) {
				evicted.push(claim);
			}
		}
		evicted
	}

	/// Removes claims with `timestamp < before_ts` and their
	/// descendants (spec §4.4: "`purge(before_ts)`").
	pub fn purge(&mut self, before_ts: i64) -> Vec<Claim> {
		let stale: Vec<Hash256> = self.claims.values().filter(|c| c.timestamp < before_ts).map(|c| c.hash).collect();
		let mut evicted = Vec::new();
		for hash in stale {
			if self.contains(&hash) {
				evicted.extend(self.evict_with_descendants(hash));
			}
		}
		evicted
	}

	/// Reconciles the pool against a just-connected block (spec §4.5
	/// step 6: "remove any matching Claims and their now-conflicting
	/// descendants"): drops every claim the block itself included, then
	/// evicts (with descendants) any remaining claim that spends an
	/// outpoint the block just consumed.
	pub fn remove_confirmed(&mut self, block_transactions: &[Transaction]) {
		for tx in block_transactions {
			let hash = tx.hash();
			if self.contains(&hash) {
				self.drop_one(hash);
			}
			for input in &tx.inputs {
				if let Some(&conflicting) = self.spents.get(&input.prevout) {
					self.evict_with_descendants(conflicting);
				}
			}
		}
	}

	/// Re-admits a disconnected block's non-coinbase transactions on a
	/// best-effort basis (spec §4.5 step 5): failures (e.g. an input
	/// that the now-reorganized chain no longer provides) are logged
	/// and otherwise ignored, never propagated.
	pub fn readmit_disconnected(&mut self, source: &TxSource, block_transactions: &[Transaction], utxo: &dyn UtxoView, now: i64) {
		for tx in block_transactions.iter().skip(1) {
			if let Err(e) = self.admit(source, tx.clone(), utxo, now) {
				log::debug!("pool: disconnected transaction not re-admitted: {}", e);
			}
		}
	}

	/// Selects transactions for a new block template (spec §4.4):
	/// walks the priority index highest-fee-per-byte first, pulling in
	/// any not-yet-selected dependency ahead of its dependent, and
	/// stopping once the remaining size budget can't fit the next
	/// candidate. Returns the dependency-ordered transaction list and
	/// the accumulated fee.
	pub fn select_for_block(&self) -> (Vec<Transaction>, i64) {
		let budget = MAX_BLOCK_SIZE.saturating_sub(RESERVED_HEADER_AND_COINBASE_BYTES);
		let mut used = 0usize;
		let mut fee_total = 0i64;
		let mut selected = Vec::new();
		let mut in_block = HashSet::new();

		for key in self.priority.iter() {
			self.select_one(key.hash, budget, &mut used, &mut fee_total, &mut selected, &mut in_block);
		}

		(selected, fee_total)
	}

	fn select_one(&self, hash: Hash256, budget: usize, used: &mut usize, fee_total: &mut i64, selected: &mut Vec<Transaction>, in_block: &mut HashSet<Hash256>) {
		if in_block.contains(&hash) {
			return;
		}
		let Some(claim) = self.claims.get(&hash) else {
			return;
		};
		for &dep in &claim.depends_on {
			self.select_one(dep, budget, used, fee_total, selected, in_block);
		}
		if in_block.contains(&hash) {
			return;
		}
		if *used + claim.serialized_size > budget {
			return;
		}
		*used += claim.serialized_size;
		*fee_total += claim.fee;
		selected.push(claim.transaction.clone());
		in_block.insert(hash);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ledger_core::script::Script;
	use ledger_core::transaction::{Input, Output};
	use ledger_core::hash::Hash256;
	use crate::types::{ConfirmedOutput, EmptyUtxoView};

	struct OneOutputView(Outpoint, Output);

	impl UtxoView for OneOutputView {
		fn get_output(&self, outpoint: &Outpoint) -> Option<ConfirmedOutput> {
			if *outpoint == self.0 {
				Some(ConfirmedOutput { output: self.1.clone(), is_coinbase: false, height: 1 })
			} else {
				None
			}
		}
	}

	fn funding_outpoint() -> Outpoint {
		Outpoint { tx_hash: Hash256::from_sha256d(b"funding"), index: 0 }
	}

	fn spend(value_in: i64, value_out: i64, outpoint: Outpoint) -> Transaction {
		Transaction::new(1, vec![Input::new(outpoint, Script::from_bytes(vec![]), 0xFFFF_FFFF)], vec![Output::new(value_out, Script::from_bytes(vec![0x51]))], 0)
	}

	#[test]
	fn admits_a_transaction_with_sufficient_fee() {
		let mut pool = TransactionPool::new(0);
		let outpoint = funding_outpoint();
		let view = OneOutputView(outpoint, Output::new(1000, Script::from_bytes(vec![0x51])));
		let tx = spend(1000, 900, outpoint);
		let hash = pool.admit(&TxSource::local(), tx, &view, 0).unwrap();
		assert_eq!(pool.len(), 1);
		assert!(pool.contains(&hash));
	}

	#[test]
	fn double_spend_of_a_pooled_outpoint_is_rejected() {
		let mut pool = TransactionPool::new(0);
		let outpoint = funding_outpoint();
		let view = OneOutputView(outpoint, Output::new(1000, Script::from_bytes(vec![0x51])));
		let t1 = spend(1000, 900, outpoint);
		pool.admit(&TxSource::local(), t1, &view, 0).unwrap();

		let t2 = spend(1000, 800, outpoint);
		let result = pool.admit(&TxSource::local(), t2, &view, 0);
		assert!(matches!(result, Err(Error::DoubleSpend(_))));
		assert_eq!(pool.len(), 1);
	}

	#[test]
	fn missing_input_is_reported_rather_than_silently_dropped() {
		let mut pool = TransactionPool::new(0);
		let outpoint = funding_outpoint();
		let tx = spend(1000, 900, outpoint);
		let result = pool.admit(&TxSource::local(), tx, &EmptyUtxoView, 0);
		assert!(matches!(result, Err(Error::MissingInput(_))));
	}

	#[test]
	fn purge_evicts_stale_claims_and_their_descendants() {
		let mut pool = TransactionPool::new(0);
		let outpoint = funding_outpoint();
		let view = OneOutputView(outpoint, Output::new(1000, Script::from_bytes(vec![0x51])));
		let parent = spend(1000, 900, outpoint);
		let parent_hash = pool.admit(&TxSource::local(), parent.clone(), &view, 100).unwrap();

		let child_outpoint = Outpoint { tx_hash: parent_hash, index: 0 };
		let child = spend(900, 800, child_outpoint);
		pool.admit(&TxSource::local(), child, &view, 100).unwrap();
		assert_eq!(pool.len(), 2);

		let evicted = pool.purge(150);
		assert_eq!(evicted.len(), 2);
		assert!(pool.is_empty());
	}

	#[test]
	fn select_for_block_orders_a_dependency_before_its_dependent() {
		let mut pool = TransactionPool::new(0);
		let outpoint = funding_outpoint();
		let view = OneOutputView(outpoint, Output::new(1000, Script::from_bytes(vec![0x51])));
		let parent = spend(1000, 900, outpoint);
		let parent_hash = pool.admit(&TxSource::local(), parent.clone(), &view, 0).unwrap();

		let child_outpoint = Outpoint { tx_hash: parent_hash, index: 0 };
		let child = spend(900, 800, child_outpoint);
		let child_hash = pool.admit(&TxSource::local(), child.clone(), &view, 0).unwrap();

		let (selected, _fee) = pool.select_for_block();
		let positions: HashMap<Hash256, usize> = selected.iter().enumerate().map(|(i, tx)| (tx.hash(), i)).collect();
		assert!(positions[&parent_hash] < positions[&child_hash]);
	}
}

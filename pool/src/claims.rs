//! A single mempool entry (spec §3 `Claim`): a candidate transaction
//! plus the bookkeeping admission computed for it once, so block
//! template selection and eviction never recompute it.

use ledger_core::hash::{Hash256, Hashed};
use ledger_core::transaction::Transaction;

/// Unconfirmed transaction admitted into the pool (spec §3). `fee` and
/// `delta_spendables` are computed once at admission time and never
/// revisited — nothing in this design re-prices a claim after
/// admission, matching `original_source/include/coinChain/Claims.h`'s
/// `Claim` (computed once, ordered by a fixed comparator thereafter).
#[derive(Debug, Clone)]
pub struct Claim {
	pub transaction: Transaction,
	pub hash: Hash256,
	/// Unix seconds this claim was admitted, used by [`crate::pool::TransactionPool::purge`].
	pub timestamp: i64,
	pub serialized_size: usize,
	pub fee: i64,
	/// `#outputs - #inputs`, the tie-break spec §4.4 step 6 specifies
	/// after fee-per-byte (smaller is preferred: a claim that frees up
	/// more outpoints than it consumes is cheaper to keep around).
	pub delta_spendables: i64,
	/// Other claims this one spends an output of (spec §3: "some input
	/// of A references an output of B and B is also a Claim").
	pub depends_on: Vec<Hash256>,
}

impl Claim {
	pub fn new(transaction: Transaction, timestamp: i64, fee: i64, depends_on: Vec<Hash256>) -> Claim {
		let hash = transaction.hash();
		let serialized_size = transaction.serialized_size();
		let delta_spendables = transaction.outputs.len() as i64 - transaction.inputs.len() as i64;
		Claim { transaction, hash, timestamp, serialized_size, fee, delta_spendables, depends_on }
	}

	/// Fee rate in satoshis per byte, used only for logging/diagnostics
	/// — the priority ordering itself cross-multiplies to avoid this
	/// division (spec §4.4 step 6, `pool::PriorityKey`).
	pub fn fee_rate(&self) -> f64 {
		self.fee as f64 / self.serialized_size.max(1) as f64
	}
}

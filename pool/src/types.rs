//! Small shared types (spec §4.4): where a candidate transaction came
//! from, and the narrow read-only view of the confirmed UTXO set this
//! crate needs. Grounded on `pool/src_teacher/types.rs`'s `TxSource`
//! struct; the `BlockChain` trait there is replaced by the smaller
//! [`UtxoView`], scoped to exactly the one lookup admission needs.

use ledger_core::transaction::{Outpoint, Output};

/// Where a candidate transaction was heard from — used for logging and,
/// eventually, misbehaviour scoring of the originating peer. Grounded
/// on `pool/src_teacher/types.rs::TxSource`.
#[derive(Debug, Clone)]
pub struct TxSource {
	pub debug_name: String,
	pub identifier: String,
}

impl TxSource {
	pub fn local() -> TxSource {
		TxSource { debug_name: "local".into(), identifier: "local".into() }
	}

	pub fn peer(identifier: String) -> TxSource {
		TxSource { debug_name: format!("peer:{}", identifier), identifier }
	}
}

/// The confirmed-UTXO-set lookup admission needs (spec §4.4 step 3):
/// whatever backs `Spendables` in `ledger_chain`, without this crate
/// depending on it. `ledger_node`'s adapter implements this over a
/// `ledger_chain::Chain` by returning `Output` + `is_coinbase`/`height`
/// encoded as a [`ConfirmedOutput`].
pub trait UtxoView {
	fn get_output(&self, outpoint: &Outpoint) -> Option<ConfirmedOutput>;
}

/// Everything about a confirmed output that admission needs: its
/// spendable contents plus its coinbase-maturity bookkeeping (spec §8
/// property 6), even though this crate does not itself enforce
/// maturity (that happens at block-connect time in `ledger_chain`;
/// spec §4.4 deliberately only lists script + fee checks for mempool
/// admission, not maturity).
#[derive(Debug, Clone)]
pub struct ConfirmedOutput {
	pub output: Output,
	pub is_coinbase: bool,
	pub height: u64,
}

/// A `UtxoView` with nothing confirmed — useful for crate-local tests
/// that only exercise pool-internal (chained) spends.
pub struct EmptyUtxoView;

impl UtxoView for EmptyUtxoView {
	fn get_output(&self, _outpoint: &Outpoint) -> Option<ConfirmedOutput> {
		None
	}
}

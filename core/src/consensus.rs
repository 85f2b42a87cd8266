//! Consensus-relevant constants and short, pure functions (spec §3/§4.5).
//! Anything that must evaluate identically on every node belongs here
//! rather than scattered across the crates that consume it.

/// Maximum serialized size of a block, in bytes.
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// Maximum total signature operations a block may contain.
pub const MAX_BLOCK_SIGOPS: usize = MAX_BLOCK_SIZE / 50;

/// Maximum number of inputs or outputs a transaction may have and still
/// be deserializable; purely a DoS bound, not itself consensus-critical.
pub const MAX_IN_OUT_LEN: u64 = 50_000;

/// Initial block subsidy, in the smallest currency unit.
pub const INITIAL_SUBSIDY: i64 = 50 * 100_000_000;

/// Number of blocks between subsidy halvings.
pub const SUBSIDY_HALVING_INTERVAL: u64 = 210_000;

/// Number of blocks a coinbase output must mature before it is
/// spendable.
pub const COINBASE_MATURITY: u64 = 100;

/// Number of blocks between proof-of-work difficulty retargets.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 2016;

/// Target spacing between blocks, in seconds.
pub const TARGET_SPACING_SECS: u64 = 10 * 60;

/// Target timespan of a full retarget window, in seconds.
pub const TARGET_TIMESPAN_SECS: u64 = DIFFICULTY_ADJUSTMENT_INTERVAL * TARGET_SPACING_SECS;

/// A retarget may not move the difficulty by more than this factor in
/// either direction in a single adjustment.
pub const MAX_RETARGET_FACTOR: u64 = 4;

/// Block timestamps may not be more than this far in the future,
/// relative to node-local clock time (spec §4.5 step 1).
pub const MAX_FUTURE_BLOCK_TIME_SECS: i64 = 2 * 60 * 60;

/// The block subsidy at `height`, halving every
/// `SUBSIDY_HALVING_INTERVAL` blocks down to zero.
pub fn subsidy(height: u64) -> i64 {
	let halvings = height / SUBSIDY_HALVING_INTERVAL;
	if halvings >= 64 {
		0
	} else {
		INITIAL_SUBSIDY >> halvings
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn subsidy_halves_on_schedule() {
		assert_eq!(subsidy(0), INITIAL_SUBSIDY);
		assert_eq!(subsidy(SUBSIDY_HALVING_INTERVAL - 1), INITIAL_SUBSIDY);
		assert_eq!(subsidy(SUBSIDY_HALVING_INTERVAL), INITIAL_SUBSIDY / 2);
		assert_eq!(subsidy(SUBSIDY_HALVING_INTERVAL * 2), INITIAL_SUBSIDY / 4);
	}

	#[test]
	fn subsidy_eventually_reaches_zero() {
		assert_eq!(subsidy(SUBSIDY_HALVING_INTERVAL * 64), 0);
	}
}

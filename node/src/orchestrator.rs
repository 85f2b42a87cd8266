//! The periodic maintenance loop (spec §4.7, C12): tops up outbound
//! peers, purges stale endpoints and expired relay entries, and evicts
//! old mempool claims, all on one `tokio::time::interval` tick.
//! Grounded on the teacher's `servers::grin::seed::monitor_peers` loop,
//! generalized to also drive `ledger_pool`'s `purge` (a core with no
//! timer of its own, per DESIGN.md).

use std::sync::Arc;
use std::time::Duration;

use crate::node::Node;

/// How often the orchestrator wakes up to run `Server::maintain`,
/// `RelayMemory::expire` and `TransactionPool::purge` (spec §4.7 names
/// no single figure for this; the teacher's own peer-monitor loop uses
/// the same order of magnitude).
const TICK: Duration = Duration::from_secs(30);

/// How long an admitted-but-unconfirmed claim may sit in the pool
/// before `purge` evicts it and its descendants (Bitcoin Core's own
/// long-standing default mempool expiry, reused since spec.md names no
/// other figure for this knob).
const POOL_EXPIRY_SECS: i64 = 72 * 3600;

/// Runs forever, driving every periodic task a live node needs beyond
/// its request/response session loops. Spawned once by
/// [`crate::node::Node::start`].
pub async fn run(node: Arc<Node>) {
	let mut interval = tokio::time::interval(TICK);
	loop {
		interval.tick().await;

		node.server().maintain().await;
		node.server().handlers().relay.expire();

		let before = crate::now_unix() - POOL_EXPIRY_SECS;
		let evicted = node.purge_expired_claims(before);
		if !evicted.is_empty() {
			log::debug!("purged {} expired mempool claim(s)", evicted.len());
		}
	}
}

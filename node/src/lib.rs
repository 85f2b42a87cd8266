//! `ledger_node`: top-level wiring (spec §2, C12) — the `NodeConfig`
//! environment boundary, the adapters tying `ledger_chain`/
//! `ledger_pool` into `ledger_p2p`'s trait seams, and the RPC-boundary
//! traits the out-of-scope JSON-RPC layer would dispatch into. Grounded
//! on the teacher's `servers::grin` crate, which plays the same role
//! over `grin_chain`/`grin_pool`/`grin_p2p`.

pub mod adapters;
pub mod config;
pub mod error;
pub mod node;
pub mod orchestrator;
pub mod rpc_boundary;

pub use config::NodeConfig;
pub use error::Error;
pub use node::Node;

/// Seconds since the Unix epoch, the same clock `ledger_chain`'s
/// `accept_block` timestamps and `ledger_p2p::server`'s maintenance
/// loop use.
pub(crate) fn now_unix() -> i64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

//! Peer-to-peer networking: wire framing, the handshake, bloom-filter
//! bandwidth reduction, a persistent address book and the orchestrator
//! that keeps the peer set within its outbound/inbound caps (spec §4.6,
//! §4.7). This crate never depends on `ledger_chain`/`ledger_pool`
//! directly; `filters::ChainQuery`/`filters::PoolQuery` are the seams
//! `ledger_node`'s adapter layer implements (DESIGN.md).
//!
//! Modernized off the teacher's `mioco`/`futures 0.1` stack onto
//! `tokio` throughout, since the former is not obtainable against a
//! current toolchain (DESIGN.md).

pub mod bloom;
pub mod endpoint;
pub mod endpoint_pool;
pub mod error;
pub mod filters;
pub mod handshake;
pub mod message;
pub mod peer;
pub mod peers;
pub mod server;

pub use error::Error;

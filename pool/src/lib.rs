//! Claims / mempool (spec §4.4, C7): unconfirmed transactions with a
//! dependency graph, spent-outpoint index, fee/size priority, and
//! block-template selection. Deliberately independent of `ledger_chain`
//! (DESIGN.md): this crate only ever talks to the confirmed UTXO set
//! through the narrow [`types::UtxoView`] trait, the same way the
//! teacher's `grin_pool` has no dependency on `grin_chain`
//! (`pool/src_teacher/blockchain.rs`'s `BlockChain` trait plays the same
//! role there).

pub mod claims;
pub mod error;
pub mod graph;
pub mod pool;
pub mod types;

pub use claims::Claim;
pub use error::Error;
pub use pool::TransactionPool;
pub use types::{TxSource, UtxoView};

//! `ledger_chain`: the consensus core (spec §2 component C5/C6/C8) —
//! `BlockTree` (trunk + branches), `Spendables` (the authenticated UTXO
//! set), the block-acceptance pipeline, and the `Chain` engine facade
//! that ties them to persistent storage. Deliberately independent of
//! mempool admission (`ledger_pool`) and of the wire protocol
//! (`ledger_p2p`); `ledger_node` wires all three together.

pub mod blocktree;
pub mod chain;
pub mod error;
pub mod pipe;
pub mod spendables;

pub use blocktree::{Ancestors, BlockRef, BlockTree, Changes, TreeError};
pub use chain::{Chain, ChainEvent, PersistenceStrictness, VerificationStrictness};
pub use error::{ConsensusRejection, Error};
pub use pipe::UndoJournal;
pub use spendables::{Coin, Proof, Spendables, SpendablesError};

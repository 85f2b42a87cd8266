//! Persistent chain state store (spec §6, C8's storage dependency): a
//! transactional key-value store wrapping `lmdb_zero` in the same
//! `Store`/`Batch` shape the teacher's own store crate uses, plus the
//! append-only block file described in spec §6.
//!
//! Nothing in this crate knows about `BlockTree`/`Spendables`/`Claims`;
//! it only persists the handful of record shapes `ledger_chain` asks it
//! to (spec §6's abstract "key->value records" list), so the dependency
//! runs store -> core, never the other way.

pub mod block_file;
pub mod chain_store;
pub mod lmdb;

pub use block_file::BlockFile;
pub use chain_store::{BlockFilePosition, BlockIndexEntry, ChainStore};
pub use lmdb::{Batch, Error, SerIterator, Store};

//! The concrete row shapes `ledger_chain` persists through [`Store`]
//! (spec §6's abstract "block-index rows by hash, best-chain pointer,
//! spendables-root, block-file positions, tx-index entries when
//! searchable"). Every row lives in a single LMDB database,
//! distinguished by a one-byte key prefix, the same single-database
//! convention the teacher's `store/src/lib.rs` uses for its handful of
//! index tables.

use std::sync::Arc;

use ledger_core::hash::Hash256;
use ledger_core::ser::{self, Readable, Reader, Writeable, Writer};

use crate::lmdb::{Batch, Error, Store};

const PREFIX_BLOCK_INDEX: u8 = b'h';
const PREFIX_BEST_TIP: u8 = b't';
const PREFIX_SPENDABLES_ROOT: u8 = b's';
const PREFIX_BLOCK_FILE_POS: u8 = b'f';
const PREFIX_TX_INDEX: u8 = b'x';
const PREFIX_UNDO: u8 = b'u';

const KEY_BEST_TIP: [u8; 1] = [PREFIX_BEST_TIP];
const KEY_SPENDABLES_ROOT: [u8; 1] = [PREFIX_SPENDABLES_ROOT];

/// A persisted `BlockTree` node: enough to rebuild a `BlockRef` on
/// restart without re-deriving `work` from `bits` every load (spec §3
/// `BlockRef`, minus the `height` field, which `ledger_chain` recomputes
/// from trunk position rather than trusting a persisted value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndexEntry {
	pub hash: Hash256,
	pub prev: Hash256,
	pub time: u32,
	pub bits: u32,
}

impl Writeable for BlockIndexEntry {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		self.hash.write(writer)?;
		self.prev.write(writer)?;
		writer.write_u32(self.time)?;
		writer.write_u32(self.bits)
	}
}

impl Readable for BlockIndexEntry {
	fn read(reader: &mut dyn Reader) -> Result<BlockIndexEntry, ser::Error> {
		Ok(BlockIndexEntry {
			hash: Hash256::read(reader)?,
			prev: Hash256::read(reader)?,
			time: reader.read_u32()?,
			bits: reader.read_u32()?,
		})
	}
}

/// Where a block's serialized body lives in the append-only block file
/// set (spec §6's block file, rotated below 2 GiB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFilePosition {
	pub file_id: u32,
	pub offset: u64,
	pub size: u32,
}

impl Writeable for BlockFilePosition {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_u32(self.file_id)?;
		writer.write_u64(self.offset)?;
		writer.write_u32(self.size)
	}
}

impl Readable for BlockFilePosition {
	fn read(reader: &mut dyn Reader) -> Result<BlockFilePosition, ser::Error> {
		Ok(BlockFilePosition { file_id: reader.read_u32()?, offset: reader.read_u64()?, size: reader.read_u32()? })
	}
}

/// Where a transaction id was last seen confirmed: which block, and at
/// what index within it (spec §6's `search(address|hash)`, enabled only
/// when the node is configured `searchable: true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxIndexEntry {
	pub block_hash: Hash256,
	pub index_in_block: u32,
}

impl Writeable for TxIndexEntry {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		self.block_hash.write(writer)?;
		writer.write_u32(self.index_in_block)
	}
}

impl Readable for TxIndexEntry {
	fn read(reader: &mut dyn Reader) -> Result<TxIndexEntry, ser::Error> {
		Ok(TxIndexEntry { block_hash: Hash256::read(reader)?, index_in_block: reader.read_u32()? })
	}
}

/// The persistent half of `ledger_chain`'s state: everything
/// `BlockChain::accept_block`'s commit step (spec §4.5 step 8) writes
/// so a restarted node can rebuild `BlockTree` and `Spendables` without
/// replaying the whole chain from genesis.
pub struct ChainStore {
	store: Store,
}

impl ChainStore {
	pub fn open(env: Arc<lmdb_zero::Environment>) -> Result<ChainStore, Error> {
		Ok(ChainStore { store: Store::open(env, "chain")? })
	}

	pub fn get_block_index(&self, hash: &Hash256) -> Result<Option<BlockIndexEntry>, Error> {
		self.store.get_ser(&prefixed_key(PREFIX_BLOCK_INDEX, hash))
	}

	pub fn best_tip(&self) -> Result<Option<Hash256>, Error> {
		self.store.get_ser(&KEY_BEST_TIP)
	}

	pub fn spendables_root(&self) -> Result<Option<Hash256>, Error> {
		self.store.get_ser(&KEY_SPENDABLES_ROOT)
	}

	pub fn block_file_position(&self, hash: &Hash256) -> Result<Option<BlockFilePosition>, Error> {
		self.store.get_ser(&prefixed_key(PREFIX_BLOCK_FILE_POS, hash))
	}

	pub fn tx_index(&self, tx_hash: &Hash256) -> Result<Option<TxIndexEntry>, Error> {
		self.store.get_ser(&prefixed_key(PREFIX_TX_INDEX, tx_hash))
	}

	/// The raw undo journal recorded when `hash` was connected (spec
	/// §4.5 step 8's "optionally the delta journal"), opaque bytes here
	/// since the Coin type it encodes belongs to `ledger_chain`, not this
	/// crate.
	pub fn undo_data(&self, hash: &Hash256) -> Result<Option<Vec<u8>>, Error> {
		self.store.get(&prefixed_key(PREFIX_UNDO, hash))
	}

	/// All persisted block-index rows, in no particular order; used to
	/// rebuild `BlockTree` branches on restart.
	pub fn iter_block_indices(&self) -> Result<crate::lmdb::SerIterator<BlockIndexEntry>, Error> {
		self.store.iter(&[PREFIX_BLOCK_INDEX])
	}

	pub fn batch(&self) -> Result<ChainBatch<'_>, Error> {
		Ok(ChainBatch { inner: self.store.batch()? })
	}
}

/// A single LMDB write transaction spanning every row one `accept_block`
/// commit touches (spec §4.5 step 8, §5 "BlockChain holds a single
/// logical transaction per connect/disconnect").
pub struct ChainBatch<'a> {
	inner: Batch<'a>,
}

impl<'a> ChainBatch<'a> {
	pub fn put_block_index(&self, entry: &BlockIndexEntry) -> Result<(), Error> {
		self.inner.put_ser(&prefixed_key(PREFIX_BLOCK_INDEX, &entry.hash), entry)
	}

	pub fn delete_block_index(&self, hash: &Hash256) -> Result<(), Error> {
		self.inner.delete(&prefixed_key(PREFIX_BLOCK_INDEX, hash))
	}

	pub fn set_best_tip(&self, hash: &Hash256) -> Result<(), Error> {
		self.inner.put_ser(&KEY_BEST_TIP, hash)
	}

	pub fn set_spendables_root(&self, root: &Hash256) -> Result<(), Error> {
		self.inner.put_ser(&KEY_SPENDABLES_ROOT, root)
	}

	pub fn put_block_file_position(&self, hash: &Hash256, pos: &BlockFilePosition) -> Result<(), Error> {
		self.inner.put_ser(&prefixed_key(PREFIX_BLOCK_FILE_POS, hash), pos)
	}

	pub fn put_tx_index(&self, tx_hash: &Hash256, entry: &TxIndexEntry) -> Result<(), Error> {
		self.inner.put_ser(&prefixed_key(PREFIX_TX_INDEX, tx_hash), entry)
	}

	pub fn delete_tx_index(&self, tx_hash: &Hash256) -> Result<(), Error> {
		self.inner.delete(&prefixed_key(PREFIX_TX_INDEX, tx_hash))
	}

	pub fn put_undo_data(&self, hash: &Hash256, bytes: &[u8]) -> Result<(), Error> {
		self.inner.put(&prefixed_key(PREFIX_UNDO, hash), bytes)
	}

	pub fn delete_undo_data(&self, hash: &Hash256) -> Result<(), Error> {
		self.inner.delete(&prefixed_key(PREFIX_UNDO, hash))
	}

	pub fn commit(self) -> Result<(), Error> {
		self.inner.commit()
	}
}

fn prefixed_key(prefix: u8, hash: &Hash256) -> [u8; 33] {
	let mut key = [0u8; 33];
	key[0] = prefix;
	key[1..].copy_from_slice(hash.as_bytes());
	key
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn open_store() -> (tempfile::TempDir, ChainStore) {
		let dir = tempdir().unwrap();
		let env = Arc::new(crate::lmdb::new_env(dir.path().to_str().unwrap()));
		let store = ChainStore::open(env).unwrap();
		(dir, store)
	}

	#[test]
	fn best_tip_round_trips_through_a_batch() {
		let (_dir, store) = open_store();
		assert!(store.best_tip().unwrap().is_none());

		let tip = Hash256::from_sha256d(b"tip");
		let batch = store.batch().unwrap();
		batch.set_best_tip(&tip).unwrap();
		batch.commit().unwrap();

		assert_eq!(store.best_tip().unwrap(), Some(tip));
	}

	#[test]
	fn block_index_entry_round_trips() {
		let (_dir, store) = open_store();
		let entry = BlockIndexEntry { hash: Hash256::from_sha256d(b"h"), prev: Hash256::ZERO, time: 1, bits: 0x207fffff };
		let batch = store.batch().unwrap();
		batch.put_block_index(&entry).unwrap();
		batch.commit().unwrap();

		assert_eq!(store.get_block_index(&entry.hash).unwrap(), Some(entry));
	}

	#[test]
	fn uncommitted_batch_is_not_observable() {
		let (_dir, store) = open_store();
		let tip = Hash256::from_sha256d(b"tip");
		{
			let batch = store.batch().unwrap();
			batch.set_best_tip(&tip).unwrap();
			// dropped without commit
		}
		assert!(store.best_tip().unwrap().is_none());
	}
}

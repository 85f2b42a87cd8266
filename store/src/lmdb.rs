//! LMDB-backed key-value store. Grounded on `store/src/lmdb.rs` in the
//! teacher almost line for line: a `Store` opening a named database
//! inside a shared `Environment`, and a `Batch` bundling multiple writes
//! into one LMDB write transaction so a caller can commit or drop them
//! atomically (spec §5's "chain state database: transactional;
//! BlockChain holds a single logical transaction per connect/disconnect").

use std::fs;
use std::marker;
use std::sync::Arc;

use failure_derive::Fail;
use lmdb_zero as lmdb;
use lmdb_zero::traits::CreateCursor;
use lmdb_zero::LmdbResultExt;

use ledger_core::ser;

#[derive(Debug, Fail)]
pub enum Error {
	#[fail(display = "key not found: {}", _0)]
	NotFound(String),
	#[fail(display = "lmdb error: {}", _0)]
	Lmdb(lmdb::error::Error),
	#[fail(display = "serialization error: {}", _0)]
	Ser(String),
}

impl From<lmdb::error::Error> for Error {
	fn from(e: lmdb::error::Error) -> Error {
		Error::Lmdb(e)
	}
}

/// Turns a `Ok(None)` into a `NotFound` error, for callers that treat
/// absence of a required row as a hard failure.
pub fn option_to_not_found<T>(res: Result<Option<T>, Error>, field_name: &str) -> Result<T, Error> {
	match res {
		Ok(None) => Err(Error::NotFound(field_name.to_owned())),
		Ok(Some(v)) => Ok(v),
		Err(e) => Err(e),
	}
}

/// Opens (creating if absent) the LMDB environment rooted at
/// `<data_dir>/lmdb`.
pub fn new_env(data_dir: &str) -> lmdb::Environment {
	let full_path = format!("{}/lmdb", data_dir);
	fs::create_dir_all(&full_path).expect("failed to create lmdb data directory");
	unsafe {
		let mut builder = lmdb::EnvBuilder::new().expect("failed to create lmdb env builder");
		builder.set_maxdbs(8).expect("failed to configure lmdb max dbs");
		// A generous map size; lmdb only reserves virtual address space
		// here, it does not pre-allocate the file.
		builder
			.set_mapsize(1 << 40)
			.unwrap_or_else(|e| panic!("unable to reserve lmdb address space: {:?}", e));
		builder
			.open(&full_path, lmdb::open::Flags::empty(), 0o600)
			.expect("failed to open lmdb environment")
	}
}

/// A single named database within a shared environment. All mutation
/// goes through [`Store::batch`].
pub struct Store {
	env: Arc<lmdb::Environment>,
	db: Arc<lmdb::Database<'static>>,
}

impl Store {
	pub fn open(env: Arc<lmdb::Environment>, name: &str) -> Result<Store, Error> {
		let db = Arc::new(lmdb::Database::open(env.clone(), Some(name), &lmdb::DatabaseOptions::new(lmdb::db::CREATE))?);
		Ok(Store { env, db })
	}

	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res: lmdb::error::Result<&[u8]> = access.get(&self.db, key);
		res.map(|v| v.to_vec()).to_opt().map_err(From::from)
	}

	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		Self::get_ser_access(&self.db, key, &access)
	}

	fn get_ser_access<T: ser::Readable>(
		db: &lmdb::Database<'static>,
		key: &[u8],
		access: &lmdb::ConstAccessor,
	) -> Result<Option<T>, Error> {
		let res: lmdb::error::Result<&[u8]> = access.get(db, key);
		match res.to_opt()? {
			Some(mut bytes) => ser::deserialize(&mut bytes).map(Some).map_err(|e| Error::Ser(e.to_string())),
			None => Ok(None),
		}
	}

	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res: lmdb::error::Result<lmdb::Ignore> = access.get(&self.db, key);
		res.to_opt().map(|r| r.is_some()).map_err(From::from)
	}

	/// Iterates `Readable` values with keys `>= from`, stopping once the
	/// key no longer shares `from` as a prefix.
	pub fn iter<T: ser::Readable>(&self, from: &[u8]) -> Result<SerIterator<T>, Error> {
		let txn = Arc::new(lmdb::ReadTransaction::new(self.env.clone())?);
		let cursor = Arc::new(txn.cursor(self.db.clone())?);
		Ok(SerIterator { tx: txn, cursor, seeked: false, prefix: from.to_vec(), _marker: marker::PhantomData })
	}

	pub fn batch(&self) -> Result<Batch<'_>, Error> {
		let tx = lmdb::WriteTransaction::new(self.env.clone())?;
		Ok(Batch { store: self, tx })
	}
}

/// Bundles writes into one LMDB write transaction; nothing is visible
/// to readers until [`Batch::commit`].
pub struct Batch<'a> {
	store: &'a Store,
	tx: lmdb::WriteTransaction<'a>,
}

impl<'a> Batch<'a> {
	pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
		self.tx.access().put(&self.store.db, key, value, lmdb::put::Flags::empty())?;
		Ok(())
	}

	pub fn put_ser<W: ser::Writeable>(&self, key: &[u8], value: &W) -> Result<(), Error> {
		let bytes = ser::ser_vec(value).map_err(|e| Error::Ser(e.to_string()))?;
		self.put(key, &bytes)
	}

	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		self.store.get(key)
	}

	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		let access = self.tx.access();
		Store::get_ser_access(&self.store.db, key, &access)
	}

	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		self.store.exists(key)
	}

	pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
		self.tx.access().del_key(&self.store.db, key)?;
		Ok(())
	}

	/// Commits every write made through this batch, making them visible
	/// to future readers in one atomic step (spec §4.5 step 8).
	pub fn commit(self) -> Result<(), Error> {
		self.tx.commit()?;
		Ok(())
	}
}

pub struct SerIterator<T: ser::Readable> {
	tx: Arc<lmdb::ReadTransaction<'static>>,
	cursor: Arc<lmdb::Cursor<'static, 'static>>,
	seeked: bool,
	prefix: Vec<u8>,
	_marker: marker::PhantomData<T>,
}

impl<T: ser::Readable> Iterator for SerIterator<T> {
	type Item = T;

	fn next(&mut self) -> Option<T> {
		let access = self.tx.access();
		let kv = if self.seeked {
			Arc::get_mut(&mut self.cursor).expect("iterator not shared").next(&access)
		} else {
			self.seeked = true;
			Arc::get_mut(&mut self.cursor).expect("iterator not shared").seek_range_k(&access, &self.prefix[..])
		};
		self.deser_if_prefix_match(kv)
	}
}

impl<T: ser::Readable> SerIterator<T> {
	fn deser_if_prefix_match(&self, kv: Result<(&[u8], &[u8]), lmdb::Error>) -> Option<T> {
		let (k, v) = kv.ok()?;
		let plen = self.prefix.len();
		if plen != 0 && (k.len() < plen || k[..plen] != self.prefix[..]) {
			return None;
		}
		ser::deserialize(&mut &v[..]).ok()
	}
}

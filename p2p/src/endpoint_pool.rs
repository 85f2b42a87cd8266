//! Persistent address book (spec §4.7 / §5 "Endpoint pool DB:
//! independently locked"). Grounded on `original_source/src/coinChain/
//! EndpointPool.cpp`: a time/last-try scored table of endpoints, purged
//! periodically and sampled for outbound connection candidates and
//! `getaddr` responses — reimplemented over `ledger_store::lmdb::Store`
//! in place of the original's embedded sqlite3 table, following the
//! teacher's own `ChainStore`'s pattern of an in-memory index backed by
//! a committed LMDB batch (`chain/src/chain.rs`'s `Chain::open`).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;

use ledger_core::ser::{self, Readable, Reader, Writeable, Writer};
use ledger_store::lmdb::Store;

use crate::endpoint::Endpoint;
use crate::error::Error;

/// Endpoints older than this are dropped on purge (original: 14 days).
pub const PURGE_AGE_SECS: i64 = 14 * 24 * 60 * 60;
/// How often `purge()` actually does anything when called repeatedly.
pub const PURGE_INTERVAL_SECS: i64 = 10 * 60;
/// `getaddr` never returns more than this many entries (spec §4.6).
pub const MAX_GETADDR_RESPONSE: usize = 2_500;
/// An endpoint isn't retried more often than this after a failed dial.
pub const MIN_RETRY_INTERVAL_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, Copy)]
struct Record {
	endpoint: Endpoint,
	last_seen: i64,
	last_try: i64,
}

impl Writeable for Record {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		self.endpoint.write(writer)?;
		writer.write_i64(self.last_seen)?;
		writer.write_i64(self.last_try)
	}
}

impl Readable for Record {
	fn read(reader: &mut dyn Reader) -> Result<Record, ser::Error> {
		let endpoint = Endpoint::read(reader)?;
		let last_seen = reader.read_i64()?;
		let last_try = reader.read_i64()?;
		Ok(Record { endpoint, last_seen, last_try })
	}
}

fn record_key(addr: &SocketAddr) -> Vec<u8> {
	addr.to_string().into_bytes()
}

/// The address book a node's orchestrator draws outbound candidates
/// from and reports new addresses into (spec §4.7).
pub struct EndpointPool {
	store: Store,
	records: RwLock<HashMap<SocketAddr, Record>>,
	last_purge: RwLock<i64>,
}

impl EndpointPool {
	/// Opens (or creates) the address book rooted at `data_dir`, in its
	/// own LMDB environment independent of chain state (spec §5:
	/// "Endpoint pool DB: independently locked").
	pub fn open(data_dir: &str) -> Result<EndpointPool, Error> {
		let env = Arc::new(ledger_store::lmdb::new_env(data_dir));
		let store = Store::open(env, "endpoints")?;
		let mut records = HashMap::new();
		for record in store.iter::<Record>(&[])? {
			records.insert(record.endpoint.addr, record);
		}
		Ok(EndpointPool { store, records: RwLock::new(records), last_purge: RwLock::new(0) })
	}

	/// Records a freshly-learned or reconfirmed endpoint (`addr`/
	/// `version` handling, spec §4.6).
	pub fn insert(&self, endpoint: Endpoint, seen_at: i64) -> Result<(), Error> {
		let record = {
			let mut records = self.records.write();
			let entry = records.entry(endpoint.addr).or_insert(Record { endpoint, last_seen: seen_at, last_try: 0 });
			entry.endpoint = endpoint;
			entry.last_seen = entry.last_seen.max(seen_at);
			*entry
		};
		let batch = self.store.batch()?;
		batch.put_ser(&record_key(&endpoint.addr), &record)?;
		batch.commit()?;
		Ok(())
	}

	/// Marks `addr` as just having been dialed, whether or not the dial
	/// succeeded (drives the outbound-selection retry backoff).
	pub fn mark_tried(&self, addr: &SocketAddr, at: i64) -> Result<(), Error> {
		let record = {
			let mut records = self.records.write();
			match records.get_mut(addr) {
				Some(entry) => {
					entry.last_try = at;
					Some(*entry)
				}
				None => None,
			}
		};
		if let Some(record) = record {
			let batch = self.store.batch()?;
			batch.put_ser(&record_key(addr), &record)?;
			batch.commit()?;
		}
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.records.read().len()
	}

	/// Up to `limit` endpoints seen within the last `within_secs`,
	/// sampled uniformly at random (`getaddr`'s response and the
	/// original's `getRecent`).
	pub fn recent(&self, now: i64, within_secs: i64, limit: usize) -> Vec<(i64, Endpoint)> {
		let since = now - within_secs;
		let mut candidates: Vec<(i64, Endpoint)> =
			self.records.read().values().filter(|r| r.last_seen >= since).map(|r| (r.last_seen, r.endpoint)).collect();
		let mut rng = rand::thread_rng();
		candidates.shuffle(&mut rng);
		candidates.truncate(limit.min(MAX_GETADDR_RESPONSE));
		candidates
	}

	/// Candidates eligible for a fresh outbound dial: not tried within
	/// `MIN_RETRY_INTERVAL_SECS`, ordered by most-recently-seen first
	/// (the original's `candidates` query, `ORDER BY time DESC`).
	pub fn dial_candidates(&self, now: i64) -> Vec<Endpoint> {
		let mut candidates: Vec<Record> =
			self.records.read().values().filter(|r| now - r.last_try >= MIN_RETRY_INTERVAL_SECS).copied().collect();
		candidates.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
		candidates.into_iter().map(|r| r.endpoint).collect()
	}

	/// Drops endpoints not seen in `PURGE_AGE_SECS`, at most once per
	/// `PURGE_INTERVAL_SECS` (original: `EndpointPool::purge`).
	pub fn purge(&self, now: i64) -> Result<usize, Error> {
		{
			let mut last_purge = self.last_purge.write();
			if *last_purge != 0 && now - *last_purge < PURGE_INTERVAL_SECS {
				return Ok(0);
			}
			*last_purge = now;
		}
		let since = now - PURGE_AGE_SECS;
		let stale: Vec<SocketAddr> = {
			let records = self.records.read();
			records.values().filter(|r| r.last_seen < since).map(|r| r.endpoint.addr).collect()
		};
		if stale.is_empty() {
			return Ok(0);
		}
		{
			let mut records = self.records.write();
			for addr in &stale {
				records.remove(addr);
			}
		}
		let batch = self.store.batch()?;
		for addr in &stale {
			batch.delete(&record_key(addr))?;
		}
		batch.commit()?;
		Ok(stale.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn open_pool() -> (tempfile::TempDir, EndpointPool) {
		let dir = tempdir().unwrap();
		let pool = EndpointPool::open(dir.path().to_str().unwrap()).unwrap();
		(dir, pool)
	}

	#[test]
	fn inserted_endpoint_is_recent() {
		let (_dir, pool) = open_pool();
		let addr: SocketAddr = "203.0.113.9:8333".parse().unwrap();
		pool.insert(Endpoint::new(1, addr), 1_000).unwrap();
		let recent = pool.recent(1_000, 3 * 60 * 60, 10);
		assert_eq!(recent.len(), 1);
		assert_eq!(recent[0].1.addr, addr);
	}

	#[test]
	fn recently_tried_endpoint_is_not_a_dial_candidate() {
		let (_dir, pool) = open_pool();
		let addr: SocketAddr = "203.0.113.9:8333".parse().unwrap();
		pool.insert(Endpoint::new(1, addr), 1_000).unwrap();
		pool.mark_tried(&addr, 1_000).unwrap();
		assert!(pool.dial_candidates(1_010).is_empty());
		assert_eq!(pool.dial_candidates(1_000 + MIN_RETRY_INTERVAL_SECS).len(), 1);
	}

	#[test]
	fn purge_drops_only_stale_entries() {
		let (_dir, pool) = open_pool();
		let fresh: SocketAddr = "203.0.113.9:8333".parse().unwrap();
		let stale: SocketAddr = "203.0.113.10:8333".parse().unwrap();
		pool.insert(Endpoint::new(1, fresh), 1_000_000).unwrap();
		pool.insert(Endpoint::new(1, stale), 1).unwrap();
		let now = 1_000_000 + PURGE_AGE_SECS + 1;
		let removed = pool.purge(now).unwrap();
		assert_eq!(removed, 1);
		assert_eq!(pool.len(), 1);
	}
}

//! The live peer set (spec §4.7): outbound/inbound caps, `/16`-diverse
//! candidate selection, broadcast and the median-starting-height
//! heuristic. Grounded on `p2p/src_teacher/peers.rs`'s `Peers{adapter,
//! store, peers: HashMap<SocketAddr, Arc<RwLock<Peer>>>}` shape, with
//! the single coarse `RwLock<HashMap<..>>` kept (the teacher's own
//! comment on `clean_peers` already notes "fighting with the double
//! layer of rwlocks" from anything finer).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;

use crate::endpoint::{same_slash16, Endpoint};
use crate::message::Message;
use crate::peer::PeerHandle;

/// Outbound connections this node tries to maintain (spec §4.7).
pub const MAX_OUTBOUND: usize = 8;
/// Inbound connections this node accepts (spec §4.7).
pub const MAX_INBOUND: usize = 117;
/// How many of the most recently handshaked peers feed the median
/// starting-height heuristic (spec §4.7).
pub const MEDIAN_HEIGHT_SAMPLE: usize = 5;
/// Own address is re-announced to every peer at this interval (spec §4.7).
pub const ADDR_REBROADCAST_SECS: i64 = 24 * 60 * 60;

/// The set of currently connected sessions, plus enough bookkeeping to
/// pick new outbound candidates and answer "what's our view of the
/// network" queries (spec §4.7, §5's "peer census").
#[derive(Clone)]
pub struct Peers {
	peers: Arc<RwLock<HashMap<SocketAddr, PeerHandle>>>,
}

impl Peers {
	pub fn new() -> Peers {
		Peers { peers: Arc::new(RwLock::new(HashMap::new())) }
	}

	pub fn insert(&self, handle: PeerHandle) {
		self.peers.write().insert(handle.addr, handle);
	}

	pub fn remove(&self, addr: &SocketAddr) {
		self.peers.write().remove(addr);
	}

	pub fn get(&self, addr: &SocketAddr) -> Option<PeerHandle> {
		self.peers.read().get(addr).cloned()
	}

	pub fn is_connected(&self, addr: &SocketAddr) -> bool {
		self.peers.read().contains_key(addr)
	}

	pub fn all(&self) -> Vec<PeerHandle> {
		self.peers.read().values().cloned().collect()
	}

	pub fn outbound_count(&self) -> usize {
		self.peers.read().values().filter(|p| !p.inbound).count()
	}

	pub fn inbound_count(&self) -> usize {
		self.peers.read().values().filter(|p| p.inbound).count()
	}

	pub fn outbound_deficit(&self) -> usize {
		MAX_OUTBOUND.saturating_sub(self.outbound_count())
	}

	pub fn has_inbound_room(&self) -> bool {
		self.inbound_count() < MAX_INBOUND
	}

	/// Picks up to `count` dial candidates from `pool` that don't share a
	/// `/16` with any currently connected peer and aren't already
	/// connected (spec §4.7: "not sharing a /16 with current peers").
	pub fn select_outbound_candidates(&self, candidates: Vec<Endpoint>, count: usize) -> Vec<Endpoint> {
		let current: Vec<SocketAddr> = self.peers.read().keys().copied().collect();
		let mut picked = Vec::new();
		for candidate in candidates {
			if picked.len() >= count {
				break;
			}
			if self.is_connected(&candidate.addr) {
				continue;
			}
			if current.iter().any(|addr| same_slash16(addr, &candidate.addr)) {
				continue;
			}
			if picked.iter().any(|e: &Endpoint| same_slash16(&e.addr, &candidate.addr)) {
				continue;
			}
			picked.push(candidate);
		}
		picked
	}

	/// Sends `message` to every connected, handshaked peer (spec §4.6's
	/// `Broadcast` action, driven by relay of locally-originated and
	/// newly-accepted objects alike).
	pub fn broadcast(&self, message: Message) {
		for peer in self.peers.read().values() {
			if peer.is_ready() {
				let _ = peer.send(message.clone());
			}
		}
	}

	pub fn send_to(&self, addr: &SocketAddr, message: Message) {
		if let Some(peer) = self.get(addr) {
			let _ = peer.send(message);
		}
	}

	/// The median `start_height` across the last `MEDIAN_HEIGHT_SAMPLE`
	/// peers to complete a handshake, used as the network's "best height"
	/// by the initial-block-download heuristic (spec §4.7).
	pub fn median_starting_height(&self) -> Option<u32> {
		let mut heights: Vec<u32> = self.peers.read().values().filter_map(|p| p.info().map(|i| i.start_height)).collect();
		if heights.is_empty() {
			return None;
		}
		heights.sort_unstable();
		let sample_start = heights.len().saturating_sub(MEDIAN_HEIGHT_SAMPLE);
		let sample = &heights[sample_start..];
		Some(sample[sample.len() / 2])
	}

	/// Drops sessions whose socket loop has already ended (spec §4.7's
	/// periodic census, teacher's `clean_peers`).
	pub fn prune_closed(&self) {
		let closed: Vec<SocketAddr> = self
			.peers
			.read()
			.iter()
			.filter(|(_, p)| p.state() == crate::peer::State::Closed)
			.map(|(addr, _)| *addr)
			.collect();
		let mut peers = self.peers.write();
		for addr in closed {
			peers.remove(&addr);
		}
	}

	pub fn random_ready_peer(&self) -> Option<PeerHandle> {
		let ready: Vec<PeerHandle> = self.peers.read().values().filter(|p| p.is_ready()).cloned().collect();
		ready.choose(&mut rand::thread_rng()).cloned()
	}
}

impl Default for Peers {
	fn default() -> Peers {
		Peers::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn endpoint(addr: &str) -> Endpoint {
		Endpoint::new(1, addr.parse().unwrap())
	}

	#[test]
	fn outbound_candidates_skip_same_slash16() {
		let peers = Peers::new();
		peers.insert(PeerHandle::new_for_test("198.51.100.1:8333".parse().unwrap()));
		let candidates = vec![endpoint("198.51.100.9:8333"), endpoint("203.0.113.5:8333")];
		let picked = peers.select_outbound_candidates(candidates, 8);
		assert_eq!(picked.len(), 1);
		assert_eq!(picked[0].addr, "203.0.113.5:8333".parse::<SocketAddr>().unwrap());
	}

	#[test]
	fn outbound_candidates_cap_at_one_per_slash16_within_the_batch() {
		let peers = Peers::new();
		let candidates = vec![endpoint("203.0.113.5:8333"), endpoint("203.0.113.9:8333"), endpoint("198.51.100.2:8333")];
		let picked = peers.select_outbound_candidates(candidates, 8);
		assert_eq!(picked.len(), 2);
	}

	#[test]
	fn median_height_is_none_with_no_handshaked_peers() {
		let peers = Peers::new();
		peers.insert(PeerHandle::new_for_test("203.0.113.5:8333".parse().unwrap()));
		assert_eq!(peers.median_starting_height(), None);
	}
}

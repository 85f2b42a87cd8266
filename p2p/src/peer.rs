//! One TCP connection to a peer (spec §4.6, C10): framing, the
//! version/verack handshake, the inventory-known set, ask-for
//! throttling and keep-alive. Grounded on `p2p/src_teacher/peer.rs`'s
//! `Peer{info, proto}` split (state kept separate from the running
//! protocol loop) and `peers.rs`'s `PeerInfo`/`Peers` shapes, modernized
//! from the teacher's `mioco` coroutine stream onto `tokio` (DESIGN.md):
//! `mioco`/`futures 0.1` is not obtainable against a current toolchain,
//! so every socket loop in this crate runs on `tokio::net::TcpStream`
//! and `tokio::select!` instead of a coroutine scheduler.

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ledger_core::hash::Hash256;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::{self, Instant};

use crate::error::Error;
use crate::message::{Frame, Framer, Message, HEADER_LEN};

/// Keep-alive: send a `ping` after this much read/write idleness.
pub const PING_INTERVAL: Duration = Duration::from_secs(30 * 60);
/// Close the connection after this long without a single byte read.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90 * 60);
/// A peer may have at most this many outstanding un-served `ask-for`s.
pub const MAX_ASK_FOR_QUEUE: usize = 5_000;
/// Protocol version `ping` gained a nonce at (spec §4.6).
pub const PING_NONCE_VERSION: u32 = 60_000;

/// Where a connection currently sits in the handshake (spec §4.6's state
/// diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
	Connected,
	VersionSent,
	VersionReceived,
	VeracksPending,
	Ready,
	Closed,
}

/// What a session learns about the other side during the handshake;
/// read by the orchestrator for peer selection and `getaddr`/median
/// height bookkeeping (teacher's `PeerInfo`).
#[derive(Debug, Clone)]
pub struct PeerInfo {
	pub addr: SocketAddr,
	pub services: u64,
	pub protocol_version: u32,
	pub user_agent: String,
	pub start_height: u32,
	pub inbound: bool,
}

/// A handle to a running peer session: cheap to clone, used by the rest
/// of the node to queue outbound messages and inspect session state
/// without touching the socket directly.
#[derive(Clone)]
pub struct PeerHandle {
	pub addr: SocketAddr,
	pub inbound: bool,
	outbox: mpsc::UnboundedSender<Message>,
	close: Arc<Notify>,
	state: Arc<parking_lot::RwLock<State>>,
	info: Arc<parking_lot::RwLock<Option<PeerInfo>>>,
	known_inventory: Arc<parking_lot::Mutex<HashSet<Hash256>>>,
	ask_for_queue: Arc<parking_lot::Mutex<VecDeque<Hash256>>>,
	last_activity: Arc<AtomicI64>,
	starting_height: Arc<AtomicU32>,
	bytes_sent: Arc<AtomicU64>,
	bytes_received: Arc<AtomicU64>,
}

impl PeerHandle {
	pub fn state(&self) -> State {
		*self.state.read()
	}

	pub fn info(&self) -> Option<PeerInfo> {
		self.info.read().clone()
	}

	pub fn is_ready(&self) -> bool {
		self.state() == State::Ready
	}

	/// Queues a message for the write half; errors if the session has
	/// already closed.
	pub fn send(&self, message: Message) -> Result<(), Error> {
		self.outbox.send(message).map_err(|_| Error::Io("peer session closed".into()))
	}

	pub fn close(&self) {
		self.close.notify_one();
	}

	/// Records that this peer is now known to have `hash`, so it isn't
	/// re-announced to it later (spec §4.6 inventory-known set).
	pub fn mark_known(&self, hash: Hash256) -> bool {
		self.known_inventory.lock().insert(hash)
	}

	pub fn knows(&self, hash: &Hash256) -> bool {
		self.known_inventory.lock().contains(hash)
	}

	/// Schedules an ask-for, refusing once the per-peer queue is full
	/// (spec §4.6: "schedule an ask-for with 2-minute dedup across all
	/// peers" — the cross-peer dedup lives one layer up, in the filter
	/// handler's relay memory; this is only the per-peer budget).
	pub fn queue_ask_for(&self, hash: Hash256) -> Result<(), Error> {
		let mut queue = self.ask_for_queue.lock();
		if queue.len() >= MAX_ASK_FOR_QUEUE {
			return Err(Error::AskForFlood);
		}
		queue.push_back(hash);
		Ok(())
	}

	pub fn drain_ask_for(&self) -> Vec<Hash256> {
		self.ask_for_queue.lock().drain(..).collect()
	}

	pub fn transmitted_bytes(&self) -> (u64, u64) {
		(self.bytes_sent.load(Ordering::Relaxed), self.bytes_received.load(Ordering::Relaxed))
	}

	#[cfg(test)]
	pub fn new_for_test(addr: SocketAddr) -> PeerHandle {
		let (tx, _rx) = mpsc::unbounded_channel();
		PeerHandle {
			addr,
			inbound: false,
			outbox: tx,
			close: Arc::new(Notify::new()),
			state: Arc::new(parking_lot::RwLock::new(State::Connected)),
			info: Arc::new(parking_lot::RwLock::new(None)),
			known_inventory: Arc::new(parking_lot::Mutex::new(HashSet::new())),
			ask_for_queue: Arc::new(parking_lot::Mutex::new(VecDeque::new())),
			last_activity: Arc::new(AtomicI64::new(0)),
			starting_height: Arc::new(AtomicU32::new(0)),
			bytes_sent: Arc::new(AtomicU64::new(0)),
			bytes_received: Arc::new(AtomicU64::new(0)),
		}
	}
}

/// Everything needed to drive one session's read/write loop; handed to
/// `run` once the socket is accepted or connected. Decoded inbound
/// messages are handed to `on_message` one at a time, in arrival order
/// (spec §5: "messages from one peer are processed in arrival order").
pub struct Connection {
	pub handle: PeerHandle,
	socket: TcpStream,
	inbox: mpsc::UnboundedReceiver<Message>,
	magic: [u8; 4],
}

impl Connection {
	pub fn new(socket: TcpStream, addr: SocketAddr, inbound: bool, magic: [u8; 4]) -> Connection {
		let (tx, rx) = mpsc::unbounded_channel();
		let handle = PeerHandle {
			addr,
			inbound,
			outbox: tx,
			close: Arc::new(Notify::new()),
			state: Arc::new(parking_lot::RwLock::new(State::Connected)),
			info: Arc::new(parking_lot::RwLock::new(None)),
			known_inventory: Arc::new(parking_lot::Mutex::new(HashSet::new())),
			ask_for_queue: Arc::new(parking_lot::Mutex::new(VecDeque::new())),
			last_activity: Arc::new(AtomicI64::new(0)),
			starting_height: Arc::new(AtomicU32::new(0)),
			bytes_sent: Arc::new(AtomicU64::new(0)),
			bytes_received: Arc::new(AtomicU64::new(0)),
		};
		Connection { handle, socket, inbox: rx, magic }
	}

	pub fn set_state(&self, state: State) {
		*self.handle.state.write() = state;
	}

	pub fn set_info(&self, info: PeerInfo) {
		self.handle.starting_height.store(info.start_height, Ordering::Relaxed);
		*self.handle.info.write() = Some(info);
	}

	/// Writes one message directly, bypassing the outbox queue; used by
	/// the handshake before the session reaches `Ready`.
	pub async fn write_message(&mut self, message: &Message) -> Result<(), Error> {
		let bytes = message.encode(self.magic)?;
		self.socket.write_all(&bytes).await?;
		self.handle.bytes_sent.fetch_add(bytes.len() as u64, Ordering::Relaxed);
		Ok(())
	}

	/// Reads exactly one framed message, blocking until it arrives or
	/// the socket closes. A free function over the socket alone (rather
	/// than a `&mut self` method) so `run`'s `select!` can poll it
	/// concurrently with `self.inbox.recv()` without two overlapping
	/// mutable borrows of the whole `Connection`.
	async fn read_one_message(socket: &mut TcpStream, magic: [u8; 4], bytes_received: &AtomicU64) -> Result<Message, Error> {
		let framer = Framer::new(magic);
		let mut buf = Vec::with_capacity(HEADER_LEN);
		loop {
			if let Some((frame, consumed)) = framer.try_parse(&buf)? {
				bytes_received.fetch_add(consumed as u64, Ordering::Relaxed);
				return Message::decode(&frame.command, &frame.payload);
			}
			let mut chunk = [0u8; 4096];
			let n = socket.read(&mut chunk).await?;
			if n == 0 {
				return Err(Error::Io("connection closed by peer".into()));
			}
			buf.extend_from_slice(&chunk[..n]);
		}
	}

	pub async fn read_message(&mut self) -> Result<Message, Error> {
		Self::read_one_message(&mut self.socket, self.magic, &self.handle.bytes_received).await
	}

	fn touch(&self) {
		self.handle.last_activity.store(now_unix(), Ordering::Relaxed);
	}

	/// Drives this session's socket after the handshake has completed:
	/// multiplexes inbound frames, queued outbound messages, the
	/// keep-alive ping timer and the idle timeout, handing each decoded
	/// message to `on_message` (spec §4.6 post-handshake duties).
	pub async fn run<F>(mut self, mut on_message: F) -> Result<(), Error>
	where
		F: FnMut(&PeerHandle, Message),
	{
		self.touch();
		let mut ping_timer = time::interval(PING_INTERVAL);
		ping_timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
		let mut idle_deadline = Instant::now() + IDLE_TIMEOUT;

		loop {
			tokio::select! {
				biased;

				_ = self.handle.close.notified() => {
					self.set_state(State::Closed);
					return Ok(());
				}

				result = Self::read_one_message(&mut self.socket, self.magic, &self.handle.bytes_received) => {
					let message = result?;
					self.touch();
					idle_deadline = Instant::now() + IDLE_TIMEOUT;
					if let Message::Ping(nonce) = message {
						self.write_message(&Message::Pong(nonce)).await?;
						continue;
					}
					on_message(&self.handle, message);
				}

				outbound = self.inbox.recv() => {
					match outbound {
						Some(message) => self.write_message(&message).await?,
						None => return Ok(()),
					}
				}

				_ = ping_timer.tick() => {
					let nonce = crate::message::Nonce(rand::random());
					self.write_message(&Message::Ping(nonce)).await?;
				}

				_ = time::sleep_until(idle_deadline) => {
					self.set_state(State::Closed);
					return Err(Error::IdleTimeout);
				}
			}
		}
	}
}

fn now_unix() -> i64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ask_for_queue_rejects_past_the_budget() {
		let handle = PeerHandle::new_for_test("127.0.0.1:8333".parse().unwrap());
		for i in 0..MAX_ASK_FOR_QUEUE {
			handle.queue_ask_for(Hash256::from_sha256d(&i.to_le_bytes())).unwrap();
		}
		assert!(handle.queue_ask_for(Hash256::from_sha256d(b"one-too-many")).is_err());
	}

	#[test]
	fn mark_known_is_idempotent() {
		let handle = PeerHandle::new_for_test("127.0.0.1:8333".parse().unwrap());
		let hash = Hash256::from_sha256d(b"tx");
		assert!(handle.mark_known(hash));
		assert!(!handle.mark_known(hash));
	}
}

//! Listener/connector loops and the periodic orchestrator tasks (spec
//! §4.7, C12). Grounded on `p2p/src_teacher/peers.rs`'s broadcast/ban/
//! clean helpers generalized onto `tokio`, plus `original_source/src/
//! coinChain/Node.cpp`'s connect-with-timeout and SOCKS4 dial for
//! reaching peers behind a proxy.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::endpoint::Endpoint;
use crate::endpoint_pool::EndpointPool;
use crate::error::Error;
use crate::filters::{FilterState, Handlers};
use crate::handshake;
use crate::message::Message;
use crate::peer::{Connection, PeerHandle};
use crate::peers::Peers;

/// Default outbound connect deadline (spec §5: "Every outbound connect
/// has a deadline timer (default 5 s)").
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a node needs to identify itself during the handshake and
/// decide how to reach a candidate peer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub magic: [u8; 4],
	pub user_agent: String,
	pub services: u64,
	pub listen_addr: SocketAddr,
	pub proxy: Option<SocketAddr>,
	pub connect_timeout: Duration,
}

/// Drives the listener, connector loop and periodic maintenance tasks
/// that keep the peer set and address book healthy (spec §4.7).
pub struct Server {
	config: ServerConfig,
	peers: Peers,
	endpoints: Arc<EndpointPool>,
	handlers: Arc<Handlers>,
	start_height: Arc<AtomicI64>,
	last_addr_broadcast: AtomicI64,
	/// Held for this server's entire lifetime and sent in every
	/// `version` message, outbound or inbound (spec §4.6 self-connection
	/// detection; see `handshake::generate_nonce`'s doc).
	nonce: u64,
}

fn now_unix() -> i64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

impl Server {
	pub fn new(config: ServerConfig, endpoints: Arc<EndpointPool>, handlers: Arc<Handlers>) -> Server {
		Server {
			config,
			peers: Peers::new(),
			endpoints,
			handlers,
			start_height: Arc::new(AtomicI64::new(0)),
			last_addr_broadcast: AtomicI64::new(0),
			nonce: handshake::generate_nonce(),
		}
	}

	pub fn peers(&self) -> &Peers {
		&self.peers
	}

	pub fn endpoints(&self) -> &Arc<EndpointPool> {
		&self.endpoints
	}

	pub fn handlers(&self) -> &Arc<Handlers> {
		&self.handlers
	}

	pub fn set_start_height(&self, height: i64) {
		self.start_height.store(height, Ordering::Relaxed);
	}

	/// Accepts inbound connections up to the cap, handing each off to its
	/// own handshake-then-session task (spec §4.7: "Accept inbound up to
	/// the cap").
	pub async fn listen(self: Arc<Self>) -> Result<(), Error> {
		let listener = TcpListener::bind(self.config.listen_addr).await?;
		loop {
			let (socket, addr) = listener.accept().await?;
			if !self.peers.has_inbound_room() {
				continue;
			}
			let server = self.clone();
			tokio::spawn(async move {
				if let Err(e) = server.run_inbound(socket, addr).await {
					log::debug!("inbound session with {} ended: {}", addr, e);
				}
			});
		}
	}

	async fn run_inbound(self: Arc<Self>, socket: TcpStream, addr: SocketAddr) -> Result<(), Error> {
		let mut conn = Connection::new(socket, addr, true, self.config.magic);
		let info = handshake::accept(&mut conn, &self.config.user_agent, self.config.services, self.config.listen_addr, self.start_height() as u32, self.nonce).await?;
		self.endpoints.insert(Endpoint::new(info.services, addr), now_unix())?;
		self.run_session(conn).await
	}

	/// Dials one candidate directly or through the configured SOCKS4
	/// proxy, under the connect deadline (spec §5).
	pub async fn dial(self: &Arc<Self>, endpoint: Endpoint) -> Result<(), Error> {
		let addr = endpoint.addr;
		self.endpoints.mark_tried(&addr, now_unix())?;
		let socket = tokio::time::timeout(self.config.connect_timeout, self.open_socket(addr))
			.await
			.map_err(|_| Error::Io(format!("connect to {} timed out", addr)))??;

		let mut conn = Connection::new(socket, addr, false, self.config.magic);
		let info = handshake::connect(&mut conn, &self.config.user_agent, self.config.services, self.config.listen_addr, self.start_height() as u32, self.nonce).await?;
		self.endpoints.insert(Endpoint::new(info.services, addr), now_unix())?;

		let server = self.clone();
		tokio::spawn(async move {
			if let Err(e) = server.run_session(conn).await {
				log::debug!("outbound session with {} ended: {}", addr, e);
			}
		});
		Ok(())
	}

	async fn open_socket(&self, addr: SocketAddr) -> Result<TcpStream, Error> {
		match self.config.proxy {
			Some(proxy) => connect_via_socks4(proxy, addr).await,
			None => Ok(TcpStream::connect(addr).await?),
		}
	}

	fn start_height(&self) -> i64 {
		self.start_height.load(Ordering::Relaxed)
	}

	/// Runs one handshaked session to completion, registering it in the
	/// peer set for the duration and dispatching every decoded message
	/// through `Handlers` (spec §4.6 post-handshake duties).
	async fn run_session(self: Arc<Self>, conn: Connection) -> Result<(), Error> {
		let handle = conn.handle.clone();
		self.peers.insert(handle.clone());
		let filter = FilterState::new();
		let handlers = self.handlers.clone();
		let peers = self.peers.clone();

		let result = conn
			.run(move |peer, message| {
				for action in handlers.handle(peer, &filter, message) {
					match action {
						crate::filters::Action::Reply(m) => {
							let _ = peer.send(m);
						}
						crate::filters::Action::Broadcast(m) => peers.broadcast(m),
						crate::filters::Action::SendTo(addr, m) => peers.send_to(&addr, m),
						crate::filters::Action::Disconnect => peer.close(),
					}
				}
			})
			.await;

		self.peers.remove(&handle.addr);
		result
	}

	/// One maintenance tick: tops up the outbound count from the address
	/// book, purges stale endpoints and rebroadcasts our own address
	/// (spec §4.7: "Periodically purge old endpoints and rebroadcast own
	/// address every 24h").
	pub async fn maintain(self: &Arc<Self>) {
		self.peers.prune_closed();

		let deficit = self.peers.outbound_deficit();
		if deficit > 0 {
			let now = now_unix();
			let candidates = self.endpoints.dial_candidates(now);
			for endpoint in self.peers.select_outbound_candidates(candidates, deficit) {
				let server = self.clone();
				tokio::spawn(async move {
					if let Err(e) = server.dial(endpoint).await {
						log::debug!("dial to {} failed: {}", endpoint.addr, e);
					}
				});
			}
		}

		let now = now_unix();
		if let Err(e) = self.endpoints.purge(now) {
			log::warn!("endpoint pool purge failed: {}", e);
		}

		let last = self.last_addr_broadcast.load(Ordering::Relaxed);
		if now - last >= crate::peers::ADDR_REBROADCAST_SECS {
			self.last_addr_broadcast.store(now, Ordering::Relaxed);
			let own = crate::endpoint::TimestampedEndpoint {
				time: now as u32,
				endpoint: Endpoint::new(self.config.services, self.config.listen_addr),
			};
			self.peers.broadcast(Message::Addr(crate::message::AddrList(vec![own])));
		}
	}

	/// Routes a locally-originated transaction into the same relay path
	/// inbound ones take (spec §4.7: "Expose `post(tx)` ... routing them
	/// into the same filter pipeline").
	pub fn post_transaction(&self, tx: ledger_core::transaction::Transaction) {
		use ledger_core::hash::Hashed;
		let hash = tx.hash();
		self.handlers.relay.remember_transaction(hash, tx.clone());
		self.peers.broadcast(Message::Inv(crate::message::InventoryList(vec![crate::message::InventoryItem {
			kind: crate::message::InventoryKind::Transaction,
			hash,
		}])));
	}

	pub fn post_block(&self, block: ledger_core::block::Block) {
		use ledger_core::hash::Hashed;
		let hash = block.header.hash();
		self.handlers.relay.remember_block(hash, block.clone());
		self.peers.broadcast(Message::Inv(crate::message::InventoryList(vec![crate::message::InventoryItem {
			kind: crate::message::InventoryKind::Block,
			hash,
		}])));
	}
}

/// A minimal SOCKS4 CONNECT handshake (spec §4.7: "optional SOCKS4
/// proxy"); IPv4 targets only, no authentication.
async fn connect_via_socks4(proxy: SocketAddr, target: SocketAddr) -> Result<TcpStream, Error> {
	let ip = match target.ip() {
		std::net::IpAddr::V4(v4) => v4,
		std::net::IpAddr::V6(_) => return Err(Error::Io("SOCKS4 cannot dial an IPv6 target".into())),
	};
	let mut socket = TcpStream::connect(proxy).await?;

	let mut request = Vec::with_capacity(9);
	request.push(4); // VN
	request.push(1); // CD: CONNECT
	request.extend_from_slice(&target.port().to_be_bytes());
	request.extend_from_slice(&ip.octets());
	request.push(0); // empty USERID, NUL-terminated

	socket.write_all(&request).await?;

	let mut reply = [0u8; 8];
	socket.read_exact(&mut reply).await?;
	if reply[0] != 0 {
		return Err(Error::Io(format!("SOCKS4 proxy sent an unrecognized reply version {}", reply[0])));
	}
	if reply[1] != 90 {
		return Err(Error::Io(format!("SOCKS4 proxy refused the connection (code {})", reply[1])));
	}
	Ok(socket)
}

#[allow(dead_code)]
fn assert_server_is_send_sync() {
	fn check<T: Send + Sync>() {}
	check::<Server>();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_connect_timeout_matches_spec_default() {
		assert_eq!(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs(5));
	}
}

//! The `version`/`verack` exchange (spec §4.6) that takes a freshly
//! accepted or connected `Connection` from `Connected` to `Ready`.
//! Grounded on `p2p/src_teacher/peer.rs`'s `Peer::connect`/`Peer::accept`
//! split (outbound vs inbound take mirrored but distinct first steps).

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::message::{Message, Version};
use crate::peer::{Connection, PeerInfo, State};

pub const PROTOCOL_VERSION: u32 = 70_015;
pub const MIN_PROTOCOL_VERSION: u32 = 60_000;

/// Generates the single nonce a `Server` holds for its entire lifetime
/// and sends in every `version` message; seeing it come back from a
/// peer means the connection looped back to ourselves (spec §4.6:
/// "nonces are compared to detect self-connection"). Called once, at
/// `Server` construction — never per-handshake, or a looped-back
/// connection would be compared against an unrelated freshly generated
/// value and self-connection could never be detected.
pub fn generate_nonce() -> u64 {
	rand::thread_rng().gen()
}

fn now_secs() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

fn make_version(user_agent: &str, nonce: u64, receiver: Endpoint, sender: Endpoint, start_height: u32) -> Version {
	Version {
		protocol_version: PROTOCOL_VERSION,
		services: sender.services,
		timestamp: now_secs(),
		receiver,
		sender,
		nonce,
		user_agent: user_agent.to_string(),
		start_height,
		relay: true,
	}
}

async fn expect_version(conn: &mut Connection, our_nonce: u64) -> Result<Version, Error> {
	match conn.read_message().await? {
		Message::Version(v) => {
			if v.nonce == our_nonce {
				return Err(Error::SelfConnection);
			}
			if v.protocol_version < MIN_PROTOCOL_VERSION {
				return Err(Error::ProtocolTooOld(v.protocol_version, MIN_PROTOCOL_VERSION));
			}
			Ok(v)
		}
		Message::Verack => Err(Error::HandshakeOutOfOrder("verack")),
		_ => Err(Error::HandshakeOutOfOrder("a non-version message")),
	}
}

async fn expect_verack(conn: &mut Connection) -> Result<(), Error> {
	match conn.read_message().await? {
		Message::Verack => Ok(()),
		_ => Err(Error::HandshakeOutOfOrder("verack")),
	}
}

fn accepted_info(addr: SocketAddr, their_version: &Version, inbound: bool) -> PeerInfo {
	PeerInfo {
		addr,
		services: their_version.services,
		// Lower protocol version is adopted (spec §4.6).
		protocol_version: their_version.protocol_version.min(PROTOCOL_VERSION),
		user_agent: their_version.user_agent.clone(),
		start_height: their_version.start_height,
		inbound,
	}
}

/// Outbound side: we dialed, so we speak first (teacher's `connect`).
/// `nonce` is the one value this node holds for its entire lifetime
/// (spec §4.6): it must be the same nonce on every handshake, outbound
/// or inbound, or a loopback connection's `version` would be compared
/// against a fresh, unrelated value and self-connection could never be
/// detected.
pub async fn connect(
	conn: &mut Connection,
	user_agent: &str,
	our_services: u64,
	local_addr: SocketAddr,
	start_height: u32,
	nonce: u64,
) -> Result<PeerInfo, Error> {
	let receiver = Endpoint::new(0, conn.handle.addr);
	let sender = Endpoint::new(our_services, local_addr);
	conn.set_state(State::VersionSent);
	conn.write_message(&Message::Version(make_version(user_agent, nonce, receiver, sender, start_height))).await?;

	let their_version = expect_version(conn, nonce).await?;
	conn.set_state(State::VersionReceived);
	conn.write_message(&Message::Verack).await?;
	expect_verack(conn).await?;

	let info = accepted_info(conn.handle.addr, &their_version, false);
	conn.set_info(info.clone());
	conn.set_state(State::Ready);
	Ok(info)
}

/// Inbound side: the peer dialed us, so we wait for their `version`
/// first (teacher's `accept`). `nonce` is the same process-wide value
/// `connect` sends, so a loopback dial-out compares against the nonce
/// that originated it (spec §4.6).
pub async fn accept(
	conn: &mut Connection,
	user_agent: &str,
	our_services: u64,
	local_addr: SocketAddr,
	start_height: u32,
	nonce: u64,
) -> Result<PeerInfo, Error> {
	let their_version = expect_version(conn, nonce).await?;
	conn.set_state(State::VersionReceived);

	let receiver = Endpoint::new(0, conn.handle.addr);
	let sender = Endpoint::new(our_services, local_addr);
	conn.write_message(&Message::Version(make_version(user_agent, nonce, receiver, sender, start_height))).await?;
	conn.write_message(&Message::Verack).await?;
	expect_verack(conn).await?;

	let info = accepted_info(conn.handle.addr, &their_version, true);
	conn.set_info(info.clone());
	conn.set_state(State::Ready);
	Ok(info)
}

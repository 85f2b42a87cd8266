//! The closed error taxonomy this crate raises (spec §7), in the same
//! flat `#[derive(Fail)]` style as `ledger_chain::error` and
//! `ledger_pool::error` but independent of both — a peer session fails
//! for wire/protocol reasons that have nothing to do with consensus or
//! mempool admission.

use std::io;

use failure_derive::Fail;

use ledger_core::ser;

/// Reasons a peer connection or inbound message was rejected (spec §4.6,
/// §8 scenarios S2/S3/S7).
#[derive(Debug, Fail)]
pub enum Error {
	#[fail(display = "malformed message: {}", _0)]
	MalformedMessage(String),
	#[fail(display = "message checksum does not match payload")]
	BadChecksum,
	#[fail(display = "message exceeds the maximum payload size ({} bytes)", _0)]
	PayloadTooLarge(usize),
	#[fail(display = "unexpected network magic {:#x}", _0)]
	BadMagic(u32),
	#[fail(display = "peer presented its own nonce; self-connection")]
	SelfConnection,
	#[fail(display = "peer protocol version {} is below the minimum {}", _0, _1)]
	ProtocolTooOld(u32, u32),
	#[fail(display = "peer sent {} before completing the version handshake", _0)]
	HandshakeOutOfOrder(&'static str),
	#[fail(display = "peer sent a duplicate version message")]
	DuplicateVersion,
	#[fail(display = "peer exceeded its inventory ask-for budget")]
	AskForFlood,
	#[fail(display = "peer was idle past the keep-alive timeout")]
	IdleTimeout,
	#[fail(display = "i/o error: {}", _0)]
	Io(String),
	#[fail(display = "address book storage error: {}", _0)]
	Store(String),
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::MalformedMessage(e.to_string())
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Io(e.to_string())
	}
}

impl From<ledger_store::Error> for Error {
	fn from(e: ledger_store::Error) -> Error {
		Error::Store(e.to_string())
	}
}

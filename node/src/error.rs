//! The top-level error type: wraps every crate-local taxonomy the way
//! `servers::common::types::Error` wraps `chain::Error`/`p2p::Error`/
//! `store::Error` in the teacher, so a caller at the RPC boundary gets
//! one `Error` to match on regardless of which layer rejected the
//! request.

use failure_derive::Fail;

#[derive(Debug, Fail)]
pub enum Error {
	#[fail(display = "{}", _0)]
	Chain(#[fail(cause)] ledger_chain::Error),
	#[fail(display = "{}", _0)]
	Pool(#[fail(cause)] ledger_pool::Error),
	#[fail(display = "{}", _0)]
	P2P(#[fail(cause)] ledger_p2p::Error),
	#[fail(display = "{}", _0)]
	Store(#[fail(cause)] ledger_store::Error),
	#[fail(display = "configuration error: {}", _0)]
	Config(String),
	#[fail(display = "unknown peer {}", _0)]
	UnknownPeer(std::net::SocketAddr),
}

impl From<ledger_chain::Error> for Error {
	fn from(e: ledger_chain::Error) -> Error {
		Error::Chain(e)
	}
}

impl From<ledger_pool::Error> for Error {
	fn from(e: ledger_pool::Error) -> Error {
		Error::Pool(e)
	}
}

impl From<ledger_p2p::Error> for Error {
	fn from(e: ledger_p2p::Error) -> Error {
		Error::P2P(e)
	}
}

impl From<ledger_store::Error> for Error {
	fn from(e: ledger_store::Error) -> Error {
		Error::Store(e)
	}
}

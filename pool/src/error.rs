//! The closed error taxonomy this crate raises (spec §7), kept as its
//! own flat `#[derive(Fail)]` enum rather than depending on
//! `ledger_chain::Error` — mirrors that crate's own shape
//! (`chain/src/error.rs`) without creating the dependency the two
//! crates deliberately don't share (DESIGN.md).

use failure_derive::Fail;

use ledger_core::transaction::{Outpoint, TxError};

#[derive(Debug, Fail)]
pub enum Error {
	#[fail(display = "malformed transaction: {}", _0)]
	MalformedData(#[fail(cause)] TxError),
	#[fail(display = "transaction exceeds the maximum block size")]
	TooLarge,
	#[fail(display = "coinbase transactions are not relayable")]
	Coinbase,
	#[fail(display = "transaction does not meet standardness policy")]
	NonStandard,
	#[fail(display = "outpoint {:?} is already spent by a pooled claim", _0)]
	DoubleSpend(Outpoint),
	#[fail(display = "input {:?} is not found in the confirmed UTXO set or the pool", _0)]
	MissingInput(Outpoint),
	#[fail(display = "script verification failed for input {}", _0)]
	BadSignature(usize),
	#[fail(display = "fee {} is below the minimum relay fee {}", _0, _1)]
	FeeTooLow(i64, i64),
	#[fail(display = "mempool is at capacity")]
	Overloaded,
}

impl From<TxError> for Error {
	fn from(e: TxError) -> Error {
		Error::MalformedData(e)
	}
}

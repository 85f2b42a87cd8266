//! Transaction data model (spec §3): `Outpoint`, `Input`, `Output`,
//! `Transaction`, plus the context-free checks every transaction must
//! pass before either mempool admission or block inclusion consider it
//! further.

use failure_derive::Fail;

use crate::hash::{Hash256, Hashed};
use crate::script::Script;
use crate::ser::{self, Readable, Reader, Writeable, Writer};

/// Maximum value of a single output, and implicitly of `inputs - outputs`
/// (spec §3: `0 <= v <= 21e14`).
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// Marks a coinbase input: an all-zero hash and an all-ones index.
pub const NULL_OUTPOINT_INDEX: u32 = 0xFFFF_FFFF;

#[derive(Debug, Fail)]
pub enum TxError {
	#[fail(display = "transaction has no inputs")]
	NoInputs,
	#[fail(display = "transaction has no outputs")]
	NoOutputs,
	#[fail(display = "duplicate input outpoint within the same transaction")]
	DuplicateInput,
	#[fail(display = "output value {} out of range", _0)]
	ValueOutOfRange(i64),
	#[fail(display = "sum of output values {} exceeds MAX_MONEY", _0)]
	TotalValueOutOfRange(i64),
	#[fail(display = "coinbase script_sig length {} out of [2,100] range", _0)]
	BadCoinbaseScriptLength(usize),
	#[fail(display = "non-coinbase transaction references a null outpoint")]
	UnexpectedNullOutpoint,
}

/// A reference to a single output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Outpoint {
	pub tx_hash: Hash256,
	pub index: u32,
}

impl Outpoint {
	pub fn null() -> Outpoint {
		Outpoint { tx_hash: Hash256::ZERO, index: NULL_OUTPOINT_INDEX }
	}

	pub fn is_null(&self) -> bool {
		self.tx_hash.is_zero() && self.index == NULL_OUTPOINT_INDEX
	}
}

impl Writeable for Outpoint {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		self.tx_hash.write(writer)?;
		writer.write_u32(self.index)
	}
}

impl Readable for Outpoint {
	fn read(reader: &mut dyn Reader) -> Result<Outpoint, ser::Error> {
		let tx_hash = Hash256::read(reader)?;
		let index = reader.read_u32()?;
		Ok(Outpoint { tx_hash, index })
	}
}

/// A transaction input: the outpoint it spends, the unlocking script,
/// and the sequence number (used for relative locktime / RBF-style
/// signaling, neither of which this design implements beyond the bare
/// field).
#[derive(Debug, Clone)]
pub struct Input {
	pub prevout: Outpoint,
	pub script_sig: Script,
	pub sequence: u32,
}

impl Input {
	pub fn new(prevout: Outpoint, script_sig: Script, sequence: u32) -> Input {
		Input { prevout, script_sig, sequence }
	}

	pub const FINAL_SEQUENCE: u32 = 0xFFFF_FFFF;
}

impl Writeable for Input {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		self.prevout.write(writer)?;
		writer.write_bytes(self.script_sig.as_bytes())?;
		writer.write_u32(self.sequence)
	}
}

impl Readable for Input {
	fn read(reader: &mut dyn Reader) -> Result<Input, ser::Error> {
		let prevout = Outpoint::read(reader)?;
		let script_sig = Script::from_bytes(reader.read_bytes()?);
		let sequence = reader.read_u32()?;
		Ok(Input { prevout, script_sig, sequence })
	}
}

/// A transaction output: an amount in satoshis and a locking script.
#[derive(Debug, Clone)]
pub struct Output {
	pub value: i64,
	pub script_pubkey: Script,
}

impl Output {
	pub fn new(value: i64, script_pubkey: Script) -> Output {
		Output { value, script_pubkey }
	}
}

impl Writeable for Output {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_i64(self.value)?;
		writer.write_bytes(self.script_pubkey.as_bytes())
	}
}

impl Readable for Output {
	fn read(reader: &mut dyn Reader) -> Result<Output, ser::Error> {
		let value = reader.read_i64()?;
		let script_pubkey = Script::from_bytes(reader.read_bytes()?);
		Ok(Output { value, script_pubkey })
	}
}

/// A full transaction: version, inputs, outputs, and locktime.
#[derive(Debug, Clone)]
pub struct Transaction {
	pub version: u32,
	pub inputs: Vec<Input>,
	pub outputs: Vec<Output>,
	pub locktime: u32,
}

impl Transaction {
	pub fn new(version: u32, inputs: Vec<Input>, outputs: Vec<Output>, locktime: u32) -> Transaction {
		Transaction { version, inputs, outputs, locktime }
	}

	/// Coinbase iff exactly one input with a null outpoint and a
	/// `script_sig` between 2 and 100 bytes (spec §3).
	pub fn is_coinbase(&self) -> bool {
		self.inputs.len() == 1
			&& self.inputs[0].prevout.is_null()
			&& (2..=100).contains(&self.inputs[0].script_sig.as_bytes().len())
	}

	pub fn total_output_value(&self) -> i64 {
		self.outputs.iter().map(|o| o.value).sum()
	}

	pub fn serialized_size(&self) -> usize {
		ser::ser_vec(self).map(|v| v.len()).unwrap_or(0)
	}

	/// Context-free checks spec §4.5 step 1 / §4.4 step 1 require before
	/// anything about the UTXO set or other transactions is consulted.
	pub fn check_context_free(&self) -> Result<(), TxError> {
		if self.inputs.is_empty() {
			return Err(TxError::NoInputs);
		}
		if self.outputs.is_empty() {
			return Err(TxError::NoOutputs);
		}

		let coinbase = self.is_coinbase();
		if !coinbase {
			for input in &self.inputs {
				if input.prevout.is_null() {
					return Err(TxError::UnexpectedNullOutpoint);
				}
			}
			let mut seen = std::collections::HashSet::new();
			for input in &self.inputs {
				if !seen.insert(input.prevout) {
					return Err(TxError::DuplicateInput);
				}
			}
		} else if self.inputs.len() == 1 {
			let len = self.inputs[0].script_sig.as_bytes().len();
			if !(2..=100).contains(&len) {
				return Err(TxError::BadCoinbaseScriptLength(len));
			}
		}

		let mut total: i64 = 0;
		for output in &self.outputs {
			if output.value < 0 || output.value > MAX_MONEY {
				return Err(TxError::ValueOutOfRange(output.value));
			}
			total = total.saturating_add(output.value);
			if total > MAX_MONEY {
				return Err(TxError::TotalValueOutOfRange(total));
			}
		}

		Ok(())
	}
}

impl Writeable for Transaction {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_u32(self.version)?;
		writer.write_varint(self.inputs.len() as u64)?;
		for input in &self.inputs {
			input.write(writer)?;
		}
		writer.write_varint(self.outputs.len() as u64)?;
		for output in &self.outputs {
			output.write(writer)?;
		}
		writer.write_u32(self.locktime)
	}
}

impl Readable for Transaction {
	fn read(reader: &mut dyn Reader) -> Result<Transaction, ser::Error> {
		let version = reader.read_u32()?;
		let input_count = reader.read_varint()?;
		let mut inputs = Vec::with_capacity(input_count.min(100_000) as usize);
		for _ in 0..input_count {
			inputs.push(Input::read(reader)?);
		}
		let output_count = reader.read_varint()?;
		let mut outputs = Vec::with_capacity(output_count.min(100_000) as usize);
		for _ in 0..output_count {
			outputs.push(Output::read(reader)?);
		}
		let locktime = reader.read_u32()?;
		Ok(Transaction { version, inputs, outputs, locktime })
	}
}

impl Hashed for Transaction {
	fn hash(&self) -> Hash256 {
		let bytes = ser::ser_vec(self).expect("in-memory serialization cannot fail");
		Hash256::from_sha256d(&bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::script::Script;

	fn sample_tx() -> Transaction {
		Transaction::new(
			1,
			vec![Input::new(
				Outpoint { tx_hash: Hash256::from_sha256d(b"prev"), index: 0 },
				Script::from_bytes(vec![0x51]),
				Input::FINAL_SEQUENCE,
			)],
			vec![Output::new(5_000_000_000, Script::from_bytes(vec![0x51]))],
			0,
		)
	}

	#[test]
	fn round_trips_through_ser() {
		let tx = sample_tx();
		let bytes = ser::ser_vec(&tx).unwrap();
		let back: Transaction = ser::deserialize_exact(&bytes).unwrap();
		assert_eq!(tx.version, back.version);
		assert_eq!(tx.inputs.len(), back.inputs.len());
		assert_eq!(tx.outputs.len(), back.outputs.len());
		assert_eq!(tx.hash(), back.hash());
	}

	#[test]
	fn coinbase_detection() {
		let cb = Transaction::new(
			1,
			vec![Input::new(Outpoint::null(), Script::from_bytes(vec![0u8; 4]), 0xFFFF_FFFF)],
			vec![Output::new(5_000_000_000, Script::from_bytes(vec![0x51]))],
			0,
		);
		assert!(cb.is_coinbase());
		assert!(cb.check_context_free().is_ok());

		let not_cb = sample_tx();
		assert!(!not_cb.is_coinbase());
	}

	#[test]
	fn rejects_duplicate_inputs() {
		let outpoint = Outpoint { tx_hash: Hash256::from_sha256d(b"prev"), index: 0 };
		let tx = Transaction::new(
			1,
			vec![
				Input::new(outpoint, Script::from_bytes(vec![0x51]), 0xFFFF_FFFF),
				Input::new(outpoint, Script::from_bytes(vec![0x51]), 0xFFFF_FFFF),
			],
			vec![Output::new(1, Script::from_bytes(vec![0x51]))],
			0,
		);
		assert!(matches!(tx.check_context_free(), Err(TxError::DuplicateInput)));
	}

	#[test]
	fn rejects_value_out_of_range() {
		let tx = Transaction::new(
			1,
			vec![Input::new(
				Outpoint { tx_hash: Hash256::from_sha256d(b"prev"), index: 0 },
				Script::from_bytes(vec![0x51]),
				0xFFFF_FFFF,
			)],
			vec![Output::new(MAX_MONEY + 1, Script::from_bytes(vec![0x51]))],
			0,
		);
		assert!(matches!(tx.check_context_free(), Err(TxError::ValueOutOfRange(_))));
	}
}

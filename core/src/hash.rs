//! Fixed-width hash identifiers: `Hash256` (transaction ids, block ids,
//! Merkle roots, outpoint prevout hashes) and `Hash160` (P2PKH/P2SH
//! script hashes, address payloads). Both compare and `Display` in the
//! little-endian, human-facing byte order convention used by spec §3.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ser::{self, Readable, Reader, Writeable, Writer};
use ledger_util::hash as digest;

/// A 32-byte double-SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Hash256(pub [u8; 32]);

/// A 20-byte RIPEMD160(SHA256(x)) digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Hash160(pub [u8; 20]);

impl Hash256 {
	pub const ZERO: Hash256 = Hash256([0u8; 32]);

	pub fn from_sha256d(data: &[u8]) -> Hash256 {
		Hash256(digest::sha256d(data))
	}

	pub fn from_bytes(bytes: [u8; 32]) -> Hash256 {
		Hash256(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	pub fn is_zero(&self) -> bool {
		self.0 == [0u8; 32]
	}

	/// Combine two hashes the way every Merkle structure in this
	/// workspace does: `sha256d(left ‖ right)`.
	pub fn merge(left: &Hash256, right: &Hash256) -> Hash256 {
		Hash256(digest::merge(&left.0, &right.0))
	}

	/// Interprets the hash as a big-endian 256-bit integer for PoW target
	/// comparisons (`hash(block) <= target(bits)`, spec §3/§8 property 5).
	/// The wire/display byte order is little-endian, so this reverses it.
	pub fn to_be_bytes(&self) -> [u8; 32] {
		let mut out = self.0;
		out.reverse();
		out
	}
}

impl Hash160 {
	pub fn from_hash160(data: &[u8]) -> Hash160 {
		Hash160(digest::hash160(data))
	}

	pub fn as_bytes(&self) -> &[u8; 20] {
		&self.0
	}
}

impl Writeable for Hash256 {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for Hash256 {
	fn read(reader: &mut dyn Reader) -> Result<Hash256, ser::Error> {
		let bytes = reader.read_fixed_bytes(32)?;
		let mut arr = [0u8; 32];
		arr.copy_from_slice(&bytes);
		Ok(Hash256(arr))
	}
}

impl Writeable for Hash160 {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for Hash160 {
	fn read(reader: &mut dyn Reader) -> Result<Hash160, ser::Error> {
		let bytes = reader.read_fixed_bytes(20)?;
		let mut arr = [0u8; 20];
		arr.copy_from_slice(&bytes);
		Ok(Hash160(arr))
	}
}

// Displayed exactly as on the wire (little-endian byte order), reversed
// to big-endian hex, matching the conventional block-explorer display.
impl fmt::Display for Hash256 {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for b in self.0.iter().rev() {
			write!(f, "{:02x}", b)?;
		}
		Ok(())
	}
}

impl fmt::Debug for Hash256 {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Hash256({})", self)
	}
}

impl fmt::Display for Hash160 {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for b in &self.0 {
			write!(f, "{:02x}", b)?;
		}
		Ok(())
	}
}

impl fmt::Debug for Hash160 {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Hash160({})", self)
	}
}

/// Convenience trait implemented by anything with a well-defined
/// consensus hash (transactions, blocks, headers).
pub trait Hashed {
	fn hash(&self) -> Hash256;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_through_ser() {
		let h = Hash256::from_sha256d(b"hello");
		let bytes = ser::ser_vec(&h).unwrap();
		let back: Hash256 = ser::deserialize_exact(&bytes).unwrap();
		assert_eq!(h, back);
	}

	#[test]
	fn display_is_reverse_of_internal_bytes() {
		let mut raw = [0u8; 32];
		raw[0] = 0xAB;
		raw[31] = 0xCD;
		let h = Hash256(raw);
		let s = format!("{}", h);
		assert!(s.starts_with("cd"));
		assert!(s.ends_with("ab"));
	}
}

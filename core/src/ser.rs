//! Serialization and deserialization layer specialized for the wire and
//! on-disk binary encoding used throughout this workspace: little-endian
//! fixed-width integers plus the Bitcoin-style variable length integer
//! (var-int) described in spec §6.
//!
//! To use it, implement `Writeable`/`Readable` on a type and then call
//! `serialize`/`deserialize` (or `ser_vec`/`deserialize_exact`) on it.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use failure_derive::Fail;

/// Errors produced while serializing or deserializing a wire/disk record.
#[derive(Debug, Fail)]
pub enum Error {
	#[fail(display = "i/o error: {}", _0)]
	IOErr(#[fail(cause)] io::Error, String),
	#[fail(display = "unexpected data: expected {:?}, got {:?}", expected, received)]
	UnexpectedData { expected: Vec<u8>, received: Vec<u8> },
	#[fail(display = "corrupted data")]
	CorruptedData,
	#[fail(display = "read of {} bytes exceeds the {} byte safety cap", _0, _1)]
	TooLargeReadErr(usize, usize),
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		let msg = e.to_string();
		Error::IOErr(e, msg)
	}
}

/// Caps any single `read_vec`/`read_fixed_bytes` call: nothing in this
/// protocol legitimately needs a single field larger than this, and
/// without the cap a malicious length prefix could force an
/// unbounded allocation before the rest of the message is even read.
pub const MAX_READ_LEN: usize = 32 * 1024 * 1024;

/// Implementations define how numbers and var-length fields are written
/// to an underlying stream.
pub trait Writer {
	fn write_u8(&mut self, n: u8) -> Result<(), Error>;
	fn write_u16(&mut self, n: u16) -> Result<(), Error>;
	fn write_u32(&mut self, n: u32) -> Result<(), Error>;
	fn write_u64(&mut self, n: u64) -> Result<(), Error>;
	fn write_i64(&mut self, n: i64) -> Result<(), Error>;
	/// Writes a Bitcoin-style compact size var-int.
	fn write_varint(&mut self, n: u64) -> Result<(), Error>;
	/// Writes a var-int length prefix followed by the raw bytes.
	fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
	/// Writes exactly `bytes.len()` bytes with no length prefix; the
	/// reader is expected to already know the length.
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

/// Implementations define how numbers and var-length fields are read
/// from an underlying stream.
pub trait Reader {
	fn read_u8(&mut self) -> Result<u8, Error>;
	fn read_u16(&mut self) -> Result<u16, Error>;
	fn read_u32(&mut self) -> Result<u32, Error>;
	fn read_u64(&mut self) -> Result<u64, Error>;
	fn read_i64(&mut self) -> Result<i64, Error>;
	fn read_varint(&mut self) -> Result<u64, Error>;
	fn read_bytes(&mut self) -> Result<Vec<u8>, Error>;
	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error>;
	fn expect_u8(&mut self, val: u8) -> Result<u8, Error>;
}

/// Every type that can be serialized implements this, writing itself
/// directly to a `Writer`.
pub trait Writeable {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), Error>;
}

/// Every type that can be deserialized implements this, reading itself
/// directly from a `Reader`.
pub trait Readable: Sized {
	fn read(reader: &mut dyn Reader) -> Result<Self, Error>;
}

/// Deserializes a `Readable` from any `std::io::Read`.
pub fn deserialize<T: Readable>(source: &mut dyn Read) -> Result<T, Error> {
	let mut reader = BinReader { source };
	T::read(&mut reader)
}

/// Serializes a `Writeable` into any `std::io::Write`.
pub fn serialize(sink: &mut dyn Write, thing: &dyn Writeable) -> Result<(), Error> {
	let mut writer = BinWriter { sink };
	thing.write(&mut writer)
}

/// Serializes a `Writeable` directly into an in-memory `Vec<u8>`.
pub fn ser_vec<W: Writeable>(thing: &W) -> Result<Vec<u8>, Error> {
	let mut vec = Vec::new();
	serialize(&mut vec, thing)?;
	Ok(vec)
}

/// Deserializes a `Readable` from a byte slice, requiring the whole
/// slice to be consumed (used by testable property 4: round-tripping).
pub fn deserialize_exact<T: Readable>(bytes: &[u8]) -> Result<T, Error> {
	let mut cursor = io::Cursor::new(bytes);
	let val = deserialize(&mut cursor)?;
	if (cursor.position() as usize) != bytes.len() {
		return Err(Error::CorruptedData);
	}
	Ok(val)
}

struct BinReader<'a> {
	source: &'a mut dyn Read,
}

impl<'a> Reader for BinReader<'a> {
	fn read_u8(&mut self) -> Result<u8, Error> {
		Ok(self.source.read_u8()?)
	}
	fn read_u16(&mut self) -> Result<u16, Error> {
		Ok(self.source.read_u16::<LittleEndian>()?)
	}
	fn read_u32(&mut self) -> Result<u32, Error> {
		Ok(self.source.read_u32::<LittleEndian>()?)
	}
	fn read_u64(&mut self) -> Result<u64, Error> {
		Ok(self.source.read_u64::<LittleEndian>()?)
	}
	fn read_i64(&mut self) -> Result<i64, Error> {
		Ok(self.source.read_i64::<LittleEndian>()?)
	}
	fn read_varint(&mut self) -> Result<u64, Error> {
		let tag = self.read_u8()?;
		match tag {
			0xFF => self.read_u64(),
			0xFE => Ok(self.source.read_u32::<LittleEndian>()? as u64),
			0xFD => Ok(self.source.read_u16::<LittleEndian>()? as u64),
			n => Ok(n as u64),
		}
	}
	fn read_bytes(&mut self) -> Result<Vec<u8>, Error> {
		let len = self.read_varint()?;
		self.read_fixed_bytes(len as usize)
	}
	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error> {
		if length > MAX_READ_LEN {
			return Err(Error::TooLargeReadErr(length, MAX_READ_LEN));
		}
		let mut buf = vec![0u8; length];
		self.source.read_exact(&mut buf)?;
		Ok(buf)
	}
	fn expect_u8(&mut self, val: u8) -> Result<u8, Error> {
		let b = self.read_u8()?;
		if b == val {
			Ok(b)
		} else {
			Err(Error::UnexpectedData { expected: vec![val], received: vec![b] })
		}
	}
}

struct BinWriter<'a> {
	sink: &'a mut dyn Write,
}

impl<'a> Writer for BinWriter<'a> {
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		Ok(self.sink.write_u8(n)?)
	}
	fn write_u16(&mut self, n: u16) -> Result<(), Error> {
		Ok(self.sink.write_u16::<LittleEndian>(n)?)
	}
	fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		Ok(self.sink.write_u32::<LittleEndian>(n)?)
	}
	fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		Ok(self.sink.write_u64::<LittleEndian>(n)?)
	}
	fn write_i64(&mut self, n: i64) -> Result<(), Error> {
		Ok(self.sink.write_i64::<LittleEndian>(n)?)
	}
	fn write_varint(&mut self, n: u64) -> Result<(), Error> {
		if n < 0xFD {
			self.write_u8(n as u8)
		} else if n <= 0xFFFF {
			self.write_u8(0xFD)?;
			self.sink.write_u16::<LittleEndian>(n as u16)?;
			Ok(())
		} else if n <= 0xFFFF_FFFF {
			self.write_u8(0xFE)?;
			self.sink.write_u32::<LittleEndian>(n as u32)?;
			Ok(())
		} else {
			self.write_u8(0xFF)?;
			self.write_u64(n)
		}
	}
	fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.write_varint(bytes.len() as u64)?;
		Ok(self.sink.write_all(bytes)?)
	}
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		Ok(self.sink.write_all(bytes)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn varint_round_trips_boundaries() {
		for n in [0u64, 0xFC, 0xFD, 0xFFFF, 0x1_0000, 0xFFFF_FFFF, 0x1_0000_0000, u64::MAX] {
			let mut buf = Vec::new();
			{
				let mut w = BinWriter { sink: &mut buf };
				w.write_varint(n).unwrap();
			}
			let mut cursor = io::Cursor::new(&buf[..]);
			let mut r = BinReader { source: &mut cursor };
			assert_eq!(r.read_varint().unwrap(), n);
		}
	}

	#[test]
	fn varint_encodes_minimal_form() {
		let mut buf = Vec::new();
		{
			let mut w = BinWriter { sink: &mut buf };
			w.write_varint(0xFC).unwrap();
		}
		assert_eq!(buf, vec![0xFC]);
	}
}

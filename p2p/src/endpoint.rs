//! `Endpoint` (spec §6): services bitfield, an IPv6/v4-mapped address
//! and port, plus the timestamp `addr` prefixes it with. Grounded on
//! `p2p/src_teacher/msg.rs`'s `SockAddr` newtype-over-`SocketAddr` (the
//! only way to implement `Writeable`/`Readable` on a foreign type), and
//! on spec §9's REDESIGN FLAG: `original_source/src/coinChain/
//! EndpointPool.cpp` toggles with/without-timestamp encoding through a
//! sentinel `_lastTry == UINT_MAX`; this module instead exposes two
//! explicit codec functions, never a sentinel.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use ledger_core::ser::{self, Readable, Reader, Writeable, Writer};

/// A reachable peer address as carried in `version`/`addr` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
	pub services: u64,
	pub addr: SocketAddr,
}

impl Endpoint {
	pub fn new(services: u64, addr: SocketAddr) -> Endpoint {
		Endpoint { services, addr }
	}

	/// Encodes as `time(u32) || services(u64) || ipv6-mapped(16) ||
	/// port(u16 BE)`, the shape `addr` messages use for every entry but
	/// the first (spec §6).
	pub fn encode_with_time(&self, time: u32, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_u32(time)?;
		self.encode_without_time(writer)
	}

	pub fn decode_with_time(reader: &mut dyn Reader) -> Result<(u32, Endpoint), ser::Error> {
		let time = reader.read_u32()?;
		let endpoint = Endpoint::decode_without_time(reader)?;
		Ok((time, endpoint))
	}

	/// Encodes as `services(u64) || ipv6-mapped(16) || port(u16 BE)`,
	/// the shape `version`'s sender/receiver fields use (spec §6: no
	/// timestamp on those two).
	pub fn encode_without_time(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		writer.write_u64(self.services)?;
		writer.write_fixed_bytes(&to_v6_mapped(self.addr))?;
		writer.write_u16(self.addr.port().to_be())
	}

	pub fn decode_without_time(reader: &mut dyn Reader) -> Result<Endpoint, ser::Error> {
		let services = reader.read_u64()?;
		let ip_bytes = reader.read_fixed_bytes(16)?;
		let port = reader.read_u16()?.to_be();
		let addr = SocketAddr::new(from_v6_mapped(&ip_bytes), port);
		Ok(Endpoint { services, addr })
	}
}

fn to_v6_mapped(addr: SocketAddr) -> [u8; 16] {
	match addr.ip() {
		IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
		IpAddr::V6(v6) => v6.octets(),
	}
}

fn from_v6_mapped(bytes: &[u8]) -> IpAddr {
	let mut arr = [0u8; 16];
	arr.copy_from_slice(&bytes[..16]);
	if arr[0..10] == [0u8; 10] && arr[10] == 0xff && arr[11] == 0xff {
		IpAddr::V4(Ipv4Addr::new(arr[12], arr[13], arr[14], arr[15]))
	} else {
		IpAddr::V6(Ipv6Addr::from(arr))
	}
}

/// `addr` and `getaddr` responses alone carry the per-entry timestamp;
/// `version`'s sender/receiver pair is the without-timestamp shape.
pub struct TimestampedEndpoint {
	pub time: u32,
	pub endpoint: Endpoint,
}

impl Writeable for TimestampedEndpoint {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		self.endpoint.encode_with_time(self.time, writer)
	}
}

impl Readable for TimestampedEndpoint {
	fn read(reader: &mut dyn Reader) -> Result<TimestampedEndpoint, ser::Error> {
		let (time, endpoint) = Endpoint::decode_with_time(reader)?;
		Ok(TimestampedEndpoint { time, endpoint })
	}
}

impl Writeable for Endpoint {
	fn write(&self, writer: &mut dyn Writer) -> Result<(), ser::Error> {
		self.encode_without_time(writer)
	}
}

impl Readable for Endpoint {
	fn read(reader: &mut dyn Reader) -> Result<Endpoint, ser::Error> {
		Endpoint::decode_without_time(reader)
	}
}

/// Whether two endpoints share a `/16`: the node orchestrator's
/// anti-eclipse rule for outbound peer selection (spec §4.7).
pub fn same_slash16(a: &SocketAddr, b: &SocketAddr) -> bool {
	match (a.ip(), b.ip()) {
		(IpAddr::V4(a), IpAddr::V4(b)) => a.octets()[0..2] == b.octets()[0..2],
		(IpAddr::V6(a), IpAddr::V6(b)) => a.octets()[0..2] == b.octets()[0..2],
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn without_time_round_trips_through_ser() {
		let addr: SocketAddr = "203.0.113.7:8333".parse().unwrap();
		let endpoint = Endpoint::new(1, addr);
		let bytes = ser::ser_vec(&endpoint).unwrap();
		let decoded: Endpoint = ser::deserialize_exact(&bytes).unwrap();
		assert_eq!(decoded, endpoint);
	}

	#[test]
	fn with_time_round_trips_through_ser() {
		let addr: SocketAddr = "203.0.113.7:8333".parse().unwrap();
		let endpoint = Endpoint::new(1, addr);
		let timestamped = TimestampedEndpoint { time: 12345, endpoint };
		let bytes = ser::ser_vec(&timestamped).unwrap();
		let decoded: TimestampedEndpoint = ser::deserialize_exact(&bytes).unwrap();
		assert_eq!(decoded.time, 12345);
		assert_eq!(decoded.endpoint, endpoint);
	}

	#[test]
	fn slash16_comparison() {
		let a: SocketAddr = "198.51.100.1:8333".parse().unwrap();
		let b: SocketAddr = "198.51.200.2:8333".parse().unwrap();
		let c: SocketAddr = "203.0.113.5:8333".parse().unwrap();
		assert!(same_slash16(&a, &b));
		assert!(!same_slash16(&a, &c));
	}
}

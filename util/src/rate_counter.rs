//! Utility to track the rate of data transfers on a peer connection.

use std::time::{Duration, SystemTime};

/// A rate counter tracks the number of transfers, the amount of data
/// exchanged, and the rate of transfer over the last minute. It does not
/// try to be proactively accurate; updates are lazy, so the rate it
/// reports is a worst-case estimate until the next `inc`.
pub struct RateCounter {
	last_min_bytes: Vec<u64>,
	last_min_times: Vec<u64>,
}

impl Default for RateCounter {
	fn default() -> Self {
		Self::new()
	}
}

impl RateCounter {
	/// Instantiate a new rate counter.
	pub fn new() -> RateCounter {
		RateCounter {
			last_min_bytes: vec![],
			last_min_times: vec![],
		}
	}

	/// Increments the number of bytes transferred, evicting any samples
	/// older than one minute.
	pub fn inc(&mut self, bytes: u64) {
		let now_millis = millis_since_epoch();
		self.last_min_times.push(now_millis);
		self.last_min_bytes.push(bytes);
		while !self.last_min_times.is_empty() && self.last_min_times[0] + 60_000 < now_millis {
			self.last_min_times.remove(0);
			self.last_min_bytes.remove(0);
		}
	}

	/// Bytes counted in the last minute.
	pub fn bytes_per_min(&self) -> u64 {
		self.last_min_bytes.iter().sum()
	}

	/// Number of `inc` calls in the last minute.
	pub fn count_per_min(&self) -> u64 {
		self.last_min_bytes.len() as u64
	}
}

fn millis_since_epoch() -> u64 {
	let since_epoch = SystemTime::now()
		.duration_since(SystemTime::UNIX_EPOCH)
		.unwrap_or(Duration::new(0, 0));
	since_epoch.as_secs() * 1000 + since_epoch.subsec_millis() as u64
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counts_accumulate() {
		let mut rc = RateCounter::new();
		rc.inc(10);
		rc.inc(20);
		assert_eq!(rc.bytes_per_min(), 30);
		assert_eq!(rc.count_per_min(), 2);
	}
}

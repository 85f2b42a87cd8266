//! `NodeConfig`: the environment boundary spec §6 names, TOML-backed
//! the way the teacher's `grin_config::GlobalConfig` is (serde-derived,
//! loaded from a file or defaulted), trimmed to exactly the field set
//! spec.md's "Environment boundary" bullet lists rather than the
//! teacher's full CLI/logging/wallet superset.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ledger_chain::{PersistenceStrictness, VerificationStrictness};
use ledger_core::params::Network;
use ledger_p2p::endpoint::Endpoint;

use crate::error::Error;

/// How thoroughly `ledger_chain::Chain::accept_block` re-verifies
/// already-buried history (spec §4.5's verification strictness knob),
/// mirrored here as a TOML-friendly enum since `ledger_chain`'s own
/// type derives no `serde` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
	None,
	Minimal,
	LastCheckpoint,
	Lazy,
	Full,
}

impl From<VerificationMode> for VerificationStrictness {
	fn from(mode: VerificationMode) -> VerificationStrictness {
		match mode {
			VerificationMode::None => VerificationStrictness::None,
			VerificationMode::Minimal => VerificationStrictness::Minimal,
			VerificationMode::LastCheckpoint => VerificationStrictness::LastCheckpoint,
			VerificationMode::Lazy => VerificationStrictness::Lazy,
			VerificationMode::Full => VerificationStrictness::Full,
		}
	}
}

/// How much of a connected block's body this node keeps on disk (spec
/// §4.5's persistence strictness knob).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
	HeadersOnly,
	Minimal,
	Full,
}

impl From<PersistenceMode> for PersistenceStrictness {
	fn from(mode: PersistenceMode) -> PersistenceStrictness {
		match mode {
			PersistenceMode::HeadersOnly => PersistenceStrictness::HeadersOnly,
			PersistenceMode::Minimal => PersistenceStrictness::Minimal,
			PersistenceMode::Full => PersistenceStrictness::Full,
		}
	}
}

fn default_network() -> Network {
	Network::Mainnet
}

fn default_listen_port() -> u16 {
	8333
}

fn default_timeout_ms() -> u64 {
	5_000
}

fn default_verification() -> VerificationMode {
	VerificationMode::Full
}

fn default_persistence() -> PersistenceMode {
	PersistenceMode::Full
}

/// The environment boundary spec §6 names: what the consensus/
/// networking core consumes from the outside, and nothing it doesn't
/// (JSON-RPC auth, wallet keys and mining templates are the out-of-
/// scope layers' own config, per spec.md §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
	pub data_dir: PathBuf,
	pub network: Network,
	pub listen_address: String,
	pub listen_port: u16,
	pub proxy_endpoint: Option<SocketAddr>,
	pub timeout_ms: u64,
	pub portmap: bool,
	pub verification_strictness: VerificationMode,
	pub persistence_strictness: PersistenceMode,
	pub searchable: bool,
	pub add_peers: Vec<SocketAddr>,
	pub connect_peers: Vec<SocketAddr>,
}

impl Default for NodeConfig {
	fn default() -> NodeConfig {
		NodeConfig {
			data_dir: default_data_dir(),
			network: default_network(),
			listen_address: "0.0.0.0".to_string(),
			listen_port: default_listen_port(),
			proxy_endpoint: None,
			timeout_ms: default_timeout_ms(),
			portmap: false,
			verification_strictness: default_verification(),
			persistence_strictness: default_persistence(),
			searchable: false,
			add_peers: Vec::new(),
			connect_peers: Vec::new(),
		}
	}
}

fn default_data_dir() -> PathBuf {
	dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("ledgerd")
}

impl NodeConfig {
	/// Loads a config from `path`, falling back to field-level defaults
	/// for anything the file omits (`#[serde(default)]`).
	pub fn load(path: &Path) -> Result<NodeConfig, Error> {
		let text = fs::read_to_string(path).map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
		toml::from_str(&text).map_err(|e| Error::Config(format!("parsing {}: {}", path.display(), e)))
	}

	pub fn listen_socket_addr(&self) -> Result<SocketAddr, Error> {
		format!("{}:{}", self.listen_address, self.listen_port)
			.parse()
			.map_err(|e| Error::Config(format!("invalid listen_address/listen_port: {}", e)))
	}

	pub fn add_peer_endpoints(&self) -> Vec<Endpoint> {
		self.add_peers.iter().map(|addr| Endpoint::new(0, *addr)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_has_sane_listen_port() {
		let config = NodeConfig::default();
		assert_eq!(config.listen_port, 8333);
		assert_eq!(config.network, Network::Mainnet);
	}

	#[test]
	fn round_trips_through_toml() {
		let mut config = NodeConfig::default();
		config.network = Network::Testnet;
		config.listen_port = 18333;
		let text = toml::to_string(&config).unwrap();
		let parsed: NodeConfig = toml::from_str(&text).unwrap();
		assert_eq!(parsed.network, Network::Testnet);
		assert_eq!(parsed.listen_port, 18333);
	}

	#[test]
	fn missing_fields_fall_back_to_defaults() {
		let parsed: NodeConfig = toml::from_str("listen_port = 28333\n").unwrap();
		assert_eq!(parsed.listen_port, 28333);
		assert_eq!(parsed.network, Network::Mainnet);
		assert!(!parsed.searchable);
	}
}

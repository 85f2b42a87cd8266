//! The `Node` struct (spec §2 C12): the single owner of a `Chain`, a
//! `TransactionPool` and a p2p `Server`, and the only implementation of
//! the `rpc_boundary` traits in this workspace. Grounded on the
//! teacher's `servers::grin::Server`, which plays exactly this role
//! over `grin_chain`/`grin_pool`/`grin_p2p`.

use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;

use ledger_chain::Chain;
use ledger_core::block::Block;
use ledger_core::hash::{Hash256, Hashed};
use ledger_core::transaction::Transaction;
use ledger_p2p::endpoint::Endpoint;
use ledger_p2p::endpoint_pool::EndpointPool;
use ledger_p2p::filters::{Handlers, OrphanTransactions, RelayMemory};
use ledger_p2p::peer::PeerInfo;
use ledger_p2p::server::{Server, ServerConfig, DEFAULT_CONNECT_TIMEOUT};
use ledger_pool::pool::DEFAULT_MIN_RELAY_FEE_PER_KB;
use ledger_pool::TransactionPool;

use crate::adapters::{ChainAdapter, ChainUtxoView, PoolAdapter};
use crate::config::NodeConfig;
use crate::error::Error;
use crate::rpc_boundary::{NodeEvent, NodeInfo, NodeMutations, NodeQueries, NodeSubscriptions, SearchResult};

const USER_AGENT: &str = "/ledgerd:0.1/";

/// Services bit this node advertises during the handshake: full node,
/// no bloom-filter or compact-block extensions.
const SERVICE_NETWORK: u64 = 1;

type Subscriber = Box<dyn Fn(&NodeEvent) + Send + Sync>;

/// Owns the consensus core, the mempool and the peer-to-peer server,
/// and answers the RPC boundary over all three (spec §6).
pub struct Node {
	config: NodeConfig,
	chain: Arc<Chain>,
	pool: Arc<Mutex<TransactionPool>>,
	server: Arc<Server>,
	subscribers: Mutex<Vec<Subscriber>>,
}

impl Node {
	/// Opens (or creates) the chain and endpoint databases under
	/// `config.data_dir` and assembles the `Server`, without starting any
	/// background task — call [`Node::start`] for that.
	pub fn open(config: NodeConfig) -> Result<Arc<Node>, Error> {
		let data_dir = config.data_dir.to_string_lossy().into_owned();
		fs::create_dir_all(&config.data_dir).map_err(|e| Error::Config(format!("creating {}: {}", data_dir, e)))?;

		let chain = Arc::new(Chain::open(
			&data_dir,
			config.network,
			config.verification_strictness.into(),
			config.persistence_strictness.into(),
		)?);

		let pool = Arc::new(Mutex::new(TransactionPool::new(DEFAULT_MIN_RELAY_FEE_PER_KB)));

		// A distinct subdirectory: `ledger_store::lmdb::new_env` takes one
		// LMDB environment handle per path, and `Chain::open` already holds
		// one rooted at `data_dir` itself.
		let endpoints_dir = config.data_dir.join("peers");
		fs::create_dir_all(&endpoints_dir).map_err(|e| Error::Config(format!("creating {}: {}", endpoints_dir.display(), e)))?;
		let endpoints_dir = endpoints_dir.to_string_lossy().into_owned();
		let endpoints = Arc::new(EndpointPool::open(&endpoints_dir)?);

		for endpoint in config.add_peer_endpoints() {
			endpoints.insert(endpoint, crate::now_unix())?;
		}

		let handlers = Arc::new(Handlers {
			chain: Arc::new(ChainAdapter { chain: chain.clone() }),
			pool: Arc::new(PoolAdapter { pool: pool.clone(), chain: chain.clone() }),
			relay: Arc::new(RelayMemory::new()),
			orphans: Arc::new(OrphanTransactions::default()),
		});

		let server_config = ServerConfig {
			magic: chain.params().magic(),
			user_agent: USER_AGENT.to_string(),
			services: SERVICE_NETWORK,
			listen_addr: config.listen_socket_addr()?,
			proxy: config.proxy_endpoint,
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
		};
		let server = Arc::new(Server::new(server_config, endpoints, handlers));
		server.set_start_height(chain.tip_height() as i64);

		Ok(Arc::new(Node { config, chain, pool, server, subscribers: Mutex::new(Vec::new()) }))
	}

	pub fn config(&self) -> &NodeConfig {
		&self.config
	}

	pub fn chain(&self) -> &Arc<Chain> {
		&self.chain
	}

	pub fn server(&self) -> &Arc<Server> {
		&self.server
	}

	/// Spawns the listener, the configured-peer dial-out and the
	/// periodic maintenance loop (spec §4.7), returning immediately.
	pub fn start(self: &Arc<Node>) {
		let listener = self.server.clone();
		tokio::spawn(async move {
			if let Err(e) = listener.listen().await {
				log::error!("p2p listener exited: {}", e);
			}
		});

		let node = self.clone();
		tokio::spawn(async move {
			for addr in node.config.connect_peers.clone() {
				let server = node.server.clone();
				tokio::spawn(async move {
					if let Err(e) = server.dial(Endpoint::new(0, addr)).await {
						log::debug!("configured peer {} unreachable: {}", addr, e);
					}
				});
			}
		});

		let node = self.clone();
		tokio::spawn(async move { crate::orchestrator::run(node).await });
	}

	/// Evicts mempool claims admitted before `before_ts` and their
	/// descendants, returning the evicted hashes (spec §3 `purge`).
	/// Called periodically by [`crate::orchestrator::run`], never by the
	/// pool itself.
	pub(crate) fn purge_expired_claims(&self, before_ts: i64) -> Vec<Hash256> {
		self.pool.lock().purge(before_ts).iter().map(|c| c.hash).collect()
	}

	fn notify(&self, event: NodeEvent) {
		self.subscribers.lock().retain(|f| {
			f(&event);
			true
		});
	}

	/// Accepts a transaction from any source (RPC or local wallet) into
	/// the mempool, relaying it onward on success exactly as an inbound
	/// `tx` message would be (spec §4.4/§4.7).
	fn accept_transaction(&self, tx: Transaction) -> Result<Hash256, Error> {
		let utxo = ChainUtxoView { chain: self.chain.clone() };
		let now = crate::now_unix();
		let hash = self
			.pool
			.lock()
			.admit(&ledger_pool::TxSource::local(), tx.clone(), &utxo, now)
			.map_err(Error::Pool)?;
		self.server.post_transaction(tx);
		self.notify(NodeEvent::TransactionAccepted { hash });
		Ok(hash)
	}

	/// Accepts a block from any source into the chain, relaying it
	/// onward and pruning newly-confirmed claims from the mempool on
	/// success (spec §4.5 step 7 / §4.7).
	fn accept_block(&self, block: Block) -> Result<(), Error> {
		let now = crate::now_unix() as u32;
		let height = self.chain.tip_height();
		let hash = block.header.hash();
		self.chain.accept_block(block.clone(), now)?;
		self.pool.lock().remove_confirmed(&block.transactions);
		self.server.post_block(block);
		self.notify(NodeEvent::BlockAccepted { hash, height: height + 1 });
		Ok(())
	}
}

impl NodeQueries for Node {
	fn get_block_count(&self) -> u64 {
		self.chain.tip_height()
	}

	fn get_best_hash(&self) -> Hash256 {
		self.chain.tip_hash()
	}

	fn get_block_hash(&self, height: u64) -> Option<Hash256> {
		self.chain.block_hash_at_height(height)
	}

	fn get_block(&self, hash: &Hash256) -> Option<Block> {
		self.chain.get_block(hash)
	}

	fn get_transaction(&self, hash: &Hash256) -> Option<Transaction> {
		self.pool.lock().get(hash).map(|c| c.transaction.clone())
	}

	fn get_difficulty(&self) -> f64 {
		self.chain.difficulty()
	}

	fn get_connection_count(&self) -> usize {
		self.server.peers().outbound_count() + self.server.peers().inbound_count()
	}

	fn get_info(&self) -> NodeInfo {
		NodeInfo {
			version: 1,
			block_count: self.chain.tip_height(),
			best_hash: self.chain.tip_hash(),
			difficulty: self.chain.difficulty(),
			connections: self.get_connection_count(),
			mempool_size: self.pool.lock().hashes().len(),
		}
	}

	fn get_peer_info(&self) -> Vec<PeerInfo> {
		self.server.peers().all().iter().filter_map(|h| h.info()).collect()
	}

	fn get_mempool(&self) -> Vec<Hash256> {
		self.pool.lock().hashes()
	}

	fn search(&self, hash: &Hash256) -> SearchResult {
		if let Some(block) = self.chain.get_block(hash) {
			return SearchResult::Block(block);
		}
		if let Some(claim) = self.pool.lock().get(hash) {
			return SearchResult::Transaction(claim.transaction.clone());
		}
		SearchResult::NotFound
	}
}

impl NodeMutations for Node {
	fn submit_transaction(&self, tx: Transaction) -> Result<Hash256, Error> {
		self.accept_transaction(tx)
	}

	fn submit_block(&self, block: Block) -> Result<(), Error> {
		self.accept_block(block)
	}

	fn add_peer(&self, endpoint: Endpoint) -> Result<(), Error> {
		self.server.endpoints().insert(endpoint, crate::now_unix())?;
		Ok(())
	}

	fn connect_peer(&self, endpoint: Endpoint) -> Result<(), Error> {
		let server = self.server.clone();
		tokio::spawn(async move {
			if let Err(e) = server.dial(endpoint).await {
				log::debug!("connect_peer to {} failed: {}", endpoint.addr, e);
			}
		});
		Ok(())
	}
}

impl NodeSubscriptions for Node {
	fn subscribe<F: Fn(&NodeEvent) + Send + Sync + 'static>(&self, f: F) {
		self.subscribers.lock().push(Box::new(f));
	}
}

//! In-memory tree of block headers (spec §4.2, C5): one designated
//! trunk (the best chain) plus branches, keyed by hash in a flat arena
//! rather than the teacher's `Rc`/raw-pointer node graph (see
//! DESIGN.md's DESIGN NOTES entry for this crate).

use std::collections::HashMap;

use failure_derive::Fail;
use num_bigint::BigUint;

use ledger_core::hash::Hash256;
use ledger_core::target;

/// A node of the tree: a block header reduced to what reorg bookkeeping
/// needs. `height` is non-negative while on the trunk, negative while
/// off it (spec §3 `BlockRef`).
#[derive(Debug, Clone)]
pub struct BlockRef {
	pub height: i64,
	pub hash: Hash256,
	pub prev: Hash256,
	pub time: u32,
	pub bits: u32,
	pub work: BigUint,
}

impl BlockRef {
	/// Builds a `BlockRef` with `work` derived from `bits` (spec §3:
	/// `work = 2^256/(target+1)`). `height` is a placeholder until
	/// `BlockTree::insert` places it.
	pub fn new(hash: Hash256, prev: Hash256, time: u32, bits: u32) -> BlockRef {
		let work = target::work_from_target(&target::compact_to_target(bits));
		BlockRef { height: 0, hash, prev, time, bits, work }
	}

	pub fn is_on_trunk(&self) -> bool {
		self.height >= 0
	}

	/// The height this block occupies along its own chain, whether or
	/// not that chain is currently the trunk: `insert` encodes an
	/// off-trunk block's absolute position as the negation of what its
	/// trunk height would be, so this is always `height.unsigned_abs()`.
	pub fn absolute_height(&self) -> u64 {
		self.height.unsigned_abs()
	}
}

#[derive(Debug, Fail)]
pub enum TreeError {
	#[fail(display = "block {} is not connected to the tree: parent {} unknown", _0, _1)]
	UnknownParent(Hash256, Hash256),
	#[fail(display = "block {} is already present in the tree", _0)]
	AlreadyPresent(Hash256),
}

/// The result of a trunk-changing splice (spec §4.2): `deleted` lists
/// the old trunk tail from the former tip down to the common ancestor's
/// child, `inserted` lists the new trunk tail from the common
/// ancestor's child up to the new tip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
	pub deleted: Vec<Hash256>,
	pub inserted: Vec<Hash256>,
}

/// Holds every `BlockRef` ever inserted, trunk and branches alike, and
/// the vector giving the trunk's cumulative work at each height.
pub struct BlockTree {
	nodes: HashMap<Hash256, BlockRef>,
	trunk: Vec<Hash256>,
	acc_work: Vec<BigUint>,
}

impl BlockTree {
	/// Seeds the tree with its genesis block at height 0.
	pub fn new(mut genesis: BlockRef) -> BlockTree {
		genesis.height = 0;
		let work = genesis.work.clone();
		let hash = genesis.hash;
		let mut nodes = HashMap::new();
		nodes.insert(hash, genesis);
		BlockTree { nodes, trunk: vec![hash], acc_work: vec![work] }
	}

	pub fn get(&self, hash: &Hash256) -> Option<&BlockRef> {
		self.nodes.get(hash)
	}

	pub fn contains(&self, hash: &Hash256) -> bool {
		self.nodes.contains_key(hash)
	}

	pub fn genesis(&self) -> &BlockRef {
		&self.nodes[&self.trunk[0]]
	}

	pub fn best(&self) -> &BlockRef {
		&self.nodes[self.trunk.last().expect("trunk always has at least genesis")]
	}

	/// Current trunk height (0-based, so a lone genesis has height 0).
	pub fn height(&self) -> i64 {
		self.trunk.len() as i64 - 1
	}

	pub fn trunk_at(&self, height: i64) -> Option<&BlockRef> {
		if height < 0 {
			return None;
		}
		self.trunk.get(height as usize).map(|h| &self.nodes[h])
	}

	pub fn is_on_trunk(&self, hash: &Hash256) -> bool {
		self.nodes.get(hash).is_some_and(BlockRef::is_on_trunk)
	}

	/// Walks parents from `hash` regardless of trunk/branch membership
	/// (spec §4.2's "iterator with +/- operators"; only the backward
	/// direction is meaningful off-trunk, since branch nodes carry no
	/// child pointer).
	pub fn ancestors(&self, hash: Hash256) -> Ancestors<'_> {
		Ancestors { tree: self, cur: Some(hash) }
	}

	/// Cumulative work of the chain ending at `hash`: the trunk's
	/// precomputed prefix sum if `hash` is on it, otherwise its own
	/// work plus everything back to the trunk (`BlockTree.cpp::
	/// accumulatedWork`).
	pub fn accumulated_work(&self, hash: &Hash256) -> BigUint {
		let node = &self.nodes[hash];
		if node.height >= 0 {
			self.acc_work[node.height as usize].clone()
		} else {
			node.work.clone() + self.accumulated_work(&node.prev)
		}
	}

	/// Inserts a new header, connecting it to its parent. If its
	/// cumulative work strictly exceeds the trunk's, splices it (and
	/// whatever branch leads to it) onto the trunk, demoting the
	/// displaced trunk tail to branches, and returns the resulting
	/// `Changes`. Ties leave the trunk untouched: the first-seen chain
	/// wins (spec §4.2).
	pub fn insert(&mut self, mut r: BlockRef) -> Result<Option<Changes>, TreeError> {
		if self.nodes.contains_key(&r.hash) {
			return Err(TreeError::AlreadyPresent(r.hash));
		}
		let prev_height = self.nodes.get(&r.prev).ok_or(TreeError::UnknownParent(r.hash, r.prev))?.height;
		let incoming_work = self.accumulated_work(&r.prev) + &r.work;
		let best_work = self.acc_work.last().cloned().unwrap_or_else(|| BigUint::from(0u32));

		if incoming_work > best_work {
			r.height = -1; // placeholder; promote_chain_to assigns the real height
			let hash = r.hash;
			self.nodes.insert(hash, r);
			Ok(Some(self.promote_chain_to(hash)))
		} else {
			r.height = -(prev_height.unsigned_abs() as i64) - 1;
			self.nodes.insert(r.hash, r);
			Ok(None)
		}
	}

	/// Retires the trunk tip outright (it is not kept as a branch,
	/// mirroring `BlockTree.cpp::pop_back`'s `_heights.erase`). If a
	/// branch now carries more cumulative work than the new tip, splices
	/// it onto the trunk exactly as `insert` would and returns the
	/// resulting `Changes`. Never pops the genesis block.
	pub fn pop_back(&mut self) -> Option<Changes> {
		if self.trunk.len() <= 1 {
			return None;
		}
		let old_tip = self.trunk.pop().expect("checked len above");
		self.acc_work.pop();
		self.nodes.remove(&old_tip);

		let tip_work = self.acc_work.last().cloned().expect("genesis always remains");
		let mut best: Option<(Hash256, BigUint)> = None;
		for (hash, node) in self.nodes.iter() {
			if node.height < 0 {
				let work = self.accumulated_work(hash);
				if work > tip_work && best.as_ref().is_none_or(|(_, bw)| work > *bw) {
					best = Some((*hash, work));
				}
			}
		}
		best.map(|(hash, _)| self.promote_chain_to(hash))
	}

	/// The shared splice: walks back from `target` through branch nodes
	/// to the common ancestor on the trunk, demotes the trunk tail above
	/// the ancestor into branches (heights flipped negative), then
	/// promotes the walked branch onto the trunk in ascending order
	/// (heights flipped positive), ending at `target` itself.
	fn promote_chain_to(&mut self, target: Hash256) -> Changes {
		let mut descending = Vec::new();
		let mut cur = target;
		loop {
			let height = self.nodes[&cur].height;
			if height >= 0 {
				break;
			}
			descending.push(cur);
			cur = self.nodes[&cur].prev;
		}
		let ancestor_height = self.nodes[&cur].height as usize;

		let mut deleted = Vec::new();
		for h in (ancestor_height + 1..self.trunk.len()).rev() {
			let hash = self.trunk[h];
			deleted.push(hash);
			self.nodes.get_mut(&hash).expect("trunk entries are always present").height = -(h as i64);
		}
		self.trunk.truncate(ancestor_height + 1);
		self.acc_work.truncate(ancestor_height + 1);

		let mut inserted = Vec::new();
		for hash in descending.into_iter().rev() {
			let work = self.nodes[&hash].work.clone();
			let new_height = self.trunk.len() as i64;
			self.nodes.get_mut(&hash).expect("just walked to it").height = new_height;
			let cumulative = self.acc_work.last().expect("trunk never empties below genesis") + &work;
			self.trunk.push(hash);
			self.acc_work.push(cumulative);
			inserted.push(hash);
		}

		Changes { deleted, inserted }
	}
}

/// Backward walk from a starting hash to genesis, regardless of
/// trunk/branch membership.
pub struct Ancestors<'a> {
	tree: &'a BlockTree,
	cur: Option<Hash256>,
}

impl<'a> Iterator for Ancestors<'a> {
	type Item = &'a BlockRef;

	fn next(&mut self) -> Option<&'a BlockRef> {
		let hash = self.cur?;
		let node = self.tree.get(&hash)?;
		self.cur = if node.hash == self.tree.genesis().hash { None } else { Some(node.prev) };
		Some(node)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn genesis() -> BlockRef {
		BlockRef::new(Hash256::from_sha256d(b"genesis"), Hash256::ZERO, 0, 0x207fffff)
	}

	fn child(parent: &Hash256, seed: &[u8]) -> BlockRef {
		BlockRef::new(Hash256::from_sha256d(seed), *parent, 0, 0x207fffff)
	}

	#[test]
	fn linear_extension_grows_trunk() {
		let g = genesis();
		let g_hash = g.hash;
		let mut tree = BlockTree::new(g);

		let a1 = child(&g_hash, b"a1");
		let a1_hash = a1.hash;
		let changes = tree.insert(a1).unwrap().expect("first extension always beats genesis-only work");
		assert_eq!(changes.inserted, vec![a1_hash]);
		assert!(changes.deleted.is_empty());
		assert_eq!(tree.best().hash, a1_hash);
		assert_eq!(tree.height(), 1);
	}

	#[test]
	fn heavier_branch_reorganises_the_trunk() {
		let g = genesis();
		let g_hash = g.hash;
		let mut tree = BlockTree::new(g);

		let a1 = child(&g_hash, b"a1");
		let a1_hash = a1.hash;
		tree.insert(a1).unwrap();
		let a2 = child(&a1_hash, b"a2");
		let a2_hash = a2.hash;
		tree.insert(a2).unwrap();

		// competing branch off genesis, same work per block: two blocks
		// only ties A1+A2's cumulative work (see
		// equal_work_does_not_displace_the_trunk), so a third is needed
		// to strictly exceed it.
		let b1 = child(&g_hash, b"b1");
		let b1_hash = b1.hash;
		assert!(tree.insert(b1).unwrap().is_none(), "b1 alone must not beat the two-block trunk");

		let b2 = child(&b1_hash, b"b2");
		let b2_hash = b2.hash;
		assert!(tree.insert(b2).unwrap().is_none(), "b1+b2 only ties a1+a2's work, never displaces the first-seen trunk");

		let b3 = child(&b2_hash, b"b3");
		let b3_hash = b3.hash;
		let changes = tree.insert(b3).unwrap().expect("b1+b2+b3 now exceeds a1+a2");
		assert_eq!(changes.deleted, vec![a2_hash, a1_hash]);
		assert_eq!(changes.inserted, vec![b1_hash, b2_hash, b3_hash]);
		assert_eq!(tree.best().hash, b3_hash);
		assert!(!tree.is_on_trunk(&a1_hash));
		assert!(!tree.is_on_trunk(&a2_hash));
	}

	#[test]
	fn equal_work_does_not_displace_the_trunk() {
		let g = genesis();
		let g_hash = g.hash;
		let mut tree = BlockTree::new(g);
		tree.insert(child(&g_hash, b"a1")).unwrap();

		let b1 = child(&g_hash, b"b1");
		let b1_hash = b1.hash;
		assert!(tree.insert(b1).unwrap().is_none());
		assert_ne!(tree.best().hash, b1_hash);
	}

	#[test]
	fn pop_back_discards_the_tip_and_never_touches_genesis() {
		let g = genesis();
		let g_hash = g.hash;
		let mut tree = BlockTree::new(g);
		let a1 = child(&g_hash, b"a1");
		let a1_hash = a1.hash;
		tree.insert(a1).unwrap();

		let changes = tree.pop_back();
		assert!(changes.is_none());
		assert_eq!(tree.best().hash, g_hash);
		assert!(tree.get(&a1_hash).is_none());
		assert!(tree.pop_back().is_none(), "genesis is never popped");
	}

	#[test]
	fn pop_back_promotes_a_branch_that_now_dominates() {
		let g = genesis();
		let g_hash = g.hash;
		let mut tree = BlockTree::new(g);

		let a1 = child(&g_hash, b"a1");
		let a1_hash = a1.hash;
		tree.insert(a1).unwrap();
		let a2 = child(&a1_hash, b"a2");
		let a2_hash = a2.hash;
		tree.insert(a2).unwrap();

		let b1 = child(&g_hash, b"b1");
		let b1_hash = b1.hash;
		tree.insert(b1).unwrap();
		let b2 = child(&b1_hash, b"b2");
		let b2_hash = b2.hash;
		tree.insert(b2).unwrap();
		let b3 = child(&b2_hash, b"b3");
		let b3_hash = b3.hash;
		tree.insert(b3).unwrap();
		assert_eq!(tree.best().hash, b3_hash);

		// Popping the three-block B branch's tip down to B1+B2 should fall
		// back to A1+A2, which now carries equal or greater work.
		tree.pop_back();
		let changes = tree.pop_back().expect("a-branch should now dominate b1 alone");
		assert_eq!(tree.best().hash, a2_hash);
		assert_eq!(changes.inserted, vec![a1_hash, a2_hash]);
		assert_eq!(changes.deleted, vec![b1_hash]);
	}

	#[test]
	fn ancestors_walks_back_to_genesis_across_a_promoted_branch() {
		let g = genesis();
		let g_hash = g.hash;
		let mut tree = BlockTree::new(g);
		let a1 = child(&g_hash, b"a1");
		let a1_hash = a1.hash;
		tree.insert(a1).unwrap();

		let hashes: Vec<Hash256> = tree.ancestors(a1_hash).map(|r| r.hash).collect();
		assert_eq!(hashes, vec![a1_hash, g_hash]);
	}
}

//! The Claims dependency graph (spec §3's Claims invariant: "If Claim A
//! lists B in `depends_on`, then ... B is also a Claim"). Grounded on
//! `pool/src_teacher/graph.rs`'s `DirectedGraph`, simplified from its
//! generic vertex/edge/root split to the one thing this crate's
//! admission and eviction logic actually needs: given a claim, find
//! every claim that (transitively) depends on it.

use std::collections::{HashMap, HashSet};

use ledger_core::hash::Hash256;

/// Parent-to-children adjacency over claim hashes: `children[p]` is the
/// set of claims whose `depends_on` includes `p`.
#[derive(Debug, Default)]
pub struct DependencyGraph {
	children: HashMap<Hash256, HashSet<Hash256>>,
}

impl DependencyGraph {
	pub fn new() -> DependencyGraph {
		DependencyGraph::default()
	}

	/// Registers `child` as depending on each hash in `depends_on`.
	pub fn add(&mut self, child: Hash256, depends_on: &[Hash256]) {
		for parent in depends_on {
			self.children.entry(*parent).or_default().insert(child);
		}
	}

	/// Un-registers `child`'s dependency edges. Call when `child` leaves
	/// the pool for any reason (inclusion, eviction, conflict).
	pub fn remove(&mut self, child: Hash256, depends_on: &[Hash256]) {
		for parent in depends_on {
			if let Some(set) = self.children.get_mut(parent) {
				set.remove(&child);
				if set.is_empty() {
					self.children.remove(parent);
				}
			}
		}
	}

	/// Every claim that transitively depends on `root` (not including
	/// `root` itself), in breadth-first discovery order. Used both by
	/// block-template selection (to walk dependents when only checking
	/// ancestors matters, it isn't used there) and by conflict eviction,
	/// which must drop not just a conflicting claim but everything built
	/// on top of it (spec §3 Claims lifecycle: "destroyed on ...
	/// conflict").
	pub fn descendants(&self, root: Hash256) -> Vec<Hash256> {
		let mut seen = HashSet::new();
		let mut queue = vec![root];
		let mut out = Vec::new();
		while let Some(next) = queue.pop() {
			if let Some(kids) = self.children.get(&next) {
				for &kid in kids {
					if seen.insert(kid) {
						out.push(kid);
						queue.push(kid);
					}
				}
			}
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn h(byte: u8) -> Hash256 {
		let mut bytes = [0u8; 32];
		bytes[0] = byte;
		Hash256::from_bytes(bytes)
	}

	#[test]
	fn descendants_walks_transitively() {
		let mut g = DependencyGraph::new();
		g.add(h(2), &[h(1)]);
		g.add(h(3), &[h(2)]);
		g.add(h(4), &[h(2)]);

		let mut d = g.descendants(h(1));
		d.sort_by_key(|x| x.as_bytes().clone());
		let mut expected = vec![h(2), h(3), h(4)];
		expected.sort_by_key(|x| x.as_bytes().clone());
		assert_eq!(d, expected);
	}

	#[test]
	fn remove_forgets_the_edge() {
		let mut g = DependencyGraph::new();
		g.add(h(2), &[h(1)]);
		g.remove(h(2), &[h(1)]);
		assert!(g.descendants(h(1)).is_empty());
	}
}

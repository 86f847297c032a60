//! Prefix trie over hit sequences, stored as a node arena.
//!
//! Nodes live in a single `Vec` and refer to each other by index, so the
//! structure has no ownership cycles and stays cache friendly. Children are
//! kept sorted by hit index and looked up by binary search.
//!
//! The trie serves two purposes in the triplet search:
//! - every valid triplet `(a, b, c)` is stored as the path `root → a → b → c`,
//!   which deduplicates triplets and makes "all triplets continuing `(p, q)`"
//!   a two-step lookup (`root → p → q`, then its children);
//! - candidate tracks grow by appending children below their triplet node,
//!   so overlapping candidates share their common prefix.
#![allow(clippy::cast_possible_truncation)]

use velopix_core::{Error, Result};

/// Index of the root node.
pub const ROOT: usize = 0;

const NO_HIT: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct TrieNode {
    /// Hit index in the event (`NO_HIT` for the root).
    hit: u32,
    parent: u32,
    depth: u16,
    /// Scatter of the last triplet of the path.
    scatter: f64,
    /// Accumulated scatter along the path.
    residual: f64,
    /// `(hit, node)` pairs sorted by hit.
    children: Vec<(u32, u32)>,
}

/// Node arena with a hard size limit.
#[derive(Debug, Clone)]
pub struct TripletTrie {
    nodes: Vec<TrieNode>,
    max_nodes: usize,
}

impl TripletTrie {
    /// Creates an empty trie holding at most `max_nodes` nodes (root included).
    #[must_use]
    pub fn new(max_nodes: usize) -> Self {
        Self {
            nodes: vec![TrieNode {
                hit: NO_HIT,
                parent: 0,
                depth: 0,
                scatter: 0.0,
                residual: 0.0,
                children: Vec::new(),
            }],
            max_nodes: max_nodes.max(1),
        }
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if only the root exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Child of `node` labelled `hit`.
    #[must_use]
    pub fn child(&self, node: usize, hit: usize) -> Option<usize> {
        let children = &self.nodes[node].children;
        children
            .binary_search_by_key(&(hit as u32), |&(h, _)| h)
            .ok()
            .map(|pos| children[pos].1 as usize)
    }

    /// Follows `path` from the root.
    #[must_use]
    pub fn lookup(&self, path: &[usize]) -> Option<usize> {
        path.iter()
            .try_fold(ROOT, |node, &hit| self.child(node, hit))
    }

    /// Returns the child of `node` labelled `hit`, creating it if needed.
    ///
    /// A new node records `scatter` and accumulates it onto the parent's
    /// residual; an existing node is returned unchanged.
    fn child_or_insert(&mut self, node: usize, hit: usize, scatter: f64) -> Result<usize> {
        let key = hit as u32;
        let pos = match self.nodes[node]
            .children
            .binary_search_by_key(&key, |&(h, _)| h)
        {
            Ok(pos) => return Ok(self.nodes[node].children[pos].1 as usize),
            Err(pos) => pos,
        };

        if self.nodes.len() >= self.max_nodes {
            return Err(Error::AlgorithmConvergence {
                algorithm: crate::SearchByTripletTrie::NAME,
                reason: format!("trie exceeded {} nodes", self.max_nodes),
            });
        }

        let parent = &self.nodes[node];
        let index = self.nodes.len();
        let child = TrieNode {
            hit: key,
            parent: node as u32,
            depth: parent.depth + 1,
            scatter,
            residual: parent.residual + scatter,
            children: Vec::new(),
        };
        self.nodes.push(child);
        self.nodes[node].children.insert(pos, (key, index as u32));
        Ok(index)
    }

    /// Inserts the triplet `(a, b, c)` with its scatter; duplicates return
    /// the existing node.
    ///
    /// # Errors
    /// Returns `AlgorithmConvergence` when the node limit is reached.
    pub fn insert_triplet(&mut self, [a, b, c]: [usize; 3], scatter: f64) -> Result<usize> {
        let na = self.child_or_insert(ROOT, a, 0.0)?;
        let nb = self.child_or_insert(na, b, 0.0)?;
        self.child_or_insert(nb, c, scatter)
    }

    /// Appends `hit` below `node`.
    ///
    /// # Errors
    /// Returns `AlgorithmConvergence` when the node limit is reached.
    pub fn extend(&mut self, node: usize, hit: usize, scatter: f64) -> Result<usize> {
        self.child_or_insert(node, hit, scatter)
    }

    /// Triplets continuing the pair `(p, q)`: `(hit, scatter)` of every
    /// child of `root → p → q`.
    pub fn continuations(&self, p: usize, q: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let children = self
            .lookup(&[p, q])
            .map_or(&[][..], |node| self.nodes[node].children.as_slice());
        children
            .iter()
            .map(|&(hit, node)| (hit as usize, self.nodes[node as usize].scatter))
    }

    /// Depth of `node` (number of hits on its path).
    #[must_use]
    pub fn depth(&self, node: usize) -> usize {
        usize::from(self.nodes[node].depth)
    }

    /// Accumulated residual of `node`.
    #[must_use]
    pub fn residual(&self, node: usize) -> f64 {
        self.nodes[node].residual
    }

    /// Hit index of `node`.
    #[must_use]
    pub fn hit(&self, node: usize) -> usize {
        self.nodes[node].hit as usize
    }

    /// Last two hits on the path to `node` (depth ≥ 2).
    #[must_use]
    pub fn last_pair(&self, node: usize) -> (usize, usize) {
        let parent = self.nodes[node].parent as usize;
        (self.hit(parent), self.hit(node))
    }

    /// Hit indices on the path from the root to `node`.
    #[must_use]
    pub fn path(&self, node: usize) -> Vec<usize> {
        let mut path = Vec::with_capacity(self.depth(node));
        let mut current = node;
        while current != ROOT {
            path.push(self.hit(current));
            current = self.nodes[current].parent as usize;
        }
        path.reverse();
        path
    }

    /// Nodes at exactly `depth`, in creation order.
    pub fn nodes_at_depth(&self, depth: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(move |&n| self.depth(n) == depth)
    }

    /// Childless nodes at depth ≥ `min_depth`.
    pub fn leaves(&self, min_depth: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len())
            .filter(move |&n| self.depth(n) >= min_depth && self.nodes[n].children.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_triplets_share_prefixes() {
        let mut trie = TripletTrie::new(100);
        let t1 = trie.insert_triplet([0, 1, 2], 0.1).unwrap();
        let t2 = trie.insert_triplet([0, 1, 3], 0.2).unwrap();
        // root + 0 + 1 + {2, 3}
        assert_eq!(trie.len(), 5);
        assert_ne!(t1, t2);
        assert_eq!(trie.lookup(&[0, 1, 2]), Some(t1));
        assert_eq!(trie.path(t2), vec![0, 1, 3]);
    }

    #[test]
    fn test_duplicate_triplet_deduplicated() {
        let mut trie = TripletTrie::new(100);
        let first = trie.insert_triplet([4, 5, 6], 0.3).unwrap();
        let again = trie.insert_triplet([4, 5, 6], 0.9).unwrap();
        assert_eq!(first, again);
        assert_eq!(trie.len(), 4);
        assert_abs_diff_eq!(trie.residual(first), 0.3);
    }

    #[test]
    fn test_continuations_sorted() {
        let mut trie = TripletTrie::new(100);
        trie.insert_triplet([1, 2, 9], 0.5).unwrap();
        trie.insert_triplet([1, 2, 4], 0.25).unwrap();
        trie.insert_triplet([2, 3, 5], 0.0).unwrap();
        let conts: Vec<(usize, f64)> = trie.continuations(1, 2).collect();
        assert_eq!(conts, vec![(4, 0.25), (9, 0.5)]);
        assert_eq!(trie.continuations(7, 8).count(), 0);
    }

    #[test]
    fn test_extend_accumulates_residual() {
        let mut trie = TripletTrie::new(100);
        let t = trie.insert_triplet([0, 1, 2], 0.1).unwrap();
        let ext = trie.extend(t, 3, 0.2).unwrap();
        assert_eq!(trie.depth(ext), 4);
        assert_eq!(trie.last_pair(ext), (2, 3));
        assert_abs_diff_eq!(trie.residual(ext), 0.3, epsilon = 1e-12);
        let leaves: Vec<usize> = trie.leaves(3).collect();
        assert_eq!(leaves, vec![ext]);
        assert_eq!(trie.nodes_at_depth(3).collect::<Vec<_>>(), vec![t]);
    }

    #[test]
    fn test_node_limit() {
        let mut trie = TripletTrie::new(3);
        assert!(matches!(
            trie.insert_triplet([0, 1, 2], 0.0),
            Err(Error::AlgorithmConvergence { .. })
        ));
    }
}

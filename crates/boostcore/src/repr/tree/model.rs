//! Mutable array-backed regression tree.
//!
//! [`RegTree`] stores one or more trees that share a node array. Nodes
//! `0..num_roots` are roots; every other live node is reachable from exactly
//! one root. Pruned nodes are kept in place as parentless leaves and their
//! ids are recorded in a free list, so later splits reuse them and node ids
//! stay stable across prune/split cycles.

use thiserror::Error;

use super::node::{Node, NodeKind, NodeStat, ParentLink};
use super::NodeId;
use crate::data::FVec;
use crate::utils::{parse_param, ParamError};

/// Largest feature index a split can use (bit 31 is reserved on disk).
pub const MAX_SPLIT_FEATURE: u32 = (1 << 31) - 1;

// ============================================================================
// TreeParam
// ============================================================================

/// Shape parameters of a [`RegTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParam {
    /// Number of roots sharing the node array.
    pub num_roots: u32,
    /// Allocated node slots, live and deleted.
    pub num_nodes: u32,
    /// Slots currently on the free list.
    pub num_deleted: u32,
    /// Depth of the deepest leaf, as recorded by the last updater.
    pub max_depth: u32,
    /// Number of features the tree was trained on.
    pub num_feature: u32,
}

impl Default for TreeParam {
    fn default() -> Self {
        Self {
            num_roots: 1,
            num_nodes: 1,
            num_deleted: 0,
            max_depth: 0,
            num_feature: 0,
        }
    }
}

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`RegTree`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeValidationError {
    #[error("tree has no roots")]
    NoRoots,
    #[error("{field} is {recorded} but the tree holds {actual}")]
    CountMismatch {
        field: &'static str,
        recorded: usize,
        actual: usize,
    },
    #[error("node {node} has {side} child {child} outside {n_nodes} nodes")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    #[error("node {node} does not link back to its parent correctly")]
    ParentMismatch { node: NodeId },
    #[error("node {node} was reached twice")]
    DuplicateVisit { node: NodeId },
    #[error("node {node} has a parent but is unreachable from any root")]
    UnreachableNode { node: NodeId },
    #[error("deleted node {node} is not a leaf")]
    DeletedNotLeaf { node: NodeId },
    #[error("free list entry {node} is not a deleted node or is repeated")]
    FreeListMismatch { node: NodeId },
}

// ============================================================================
// RegTree
// ============================================================================

/// Regression tree with O(1) navigation and free-list node reuse.
///
/// Misuse of the mutation API (splitting a non-leaf, pruning a node whose
/// children are not both leaves, out-of-range ids) is a programming error
/// and panics.
#[derive(Debug, Clone, PartialEq)]
pub struct RegTree {
    pub(super) param: TreeParam,
    pub(super) nodes: Vec<Node>,
    pub(super) stats: Vec<NodeStat>,
    pub(super) deleted: Vec<NodeId>,
}

impl Default for RegTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegTree {
    /// A single-root tree whose root is a leaf valued 0.0.
    pub fn new() -> Self {
        Self::with_roots(1)
    }

    /// A tree with `num_roots` leaf roots.
    ///
    /// # Panics
    ///
    /// Panics if `num_roots == 0`.
    pub fn with_roots(num_roots: u32) -> Self {
        assert!(num_roots > 0, "a tree needs at least one root");
        let mut tree = Self {
            param: TreeParam {
                num_roots,
                ..TreeParam::default()
            },
            nodes: Vec::new(),
            stats: Vec::new(),
            deleted: Vec::new(),
        };
        tree.init_model();
        tree
    }

    #[inline]
    pub fn param(&self) -> &TreeParam {
        &self.param
    }

    /// Set a shape parameter by name. Takes effect at the next
    /// [`init_model`](Self::init_model). Unknown names are ignored.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<(), ParamError> {
        match name {
            "num_roots" => {
                let n: u32 = parse_param(name, value)?;
                if n == 0 {
                    return Err(ParamError::new(name, value));
                }
                self.param.num_roots = n;
            }
            "num_feature" => self.param.num_feature = parse_param(name, value)?,
            _ => {}
        }
        Ok(())
    }

    /// Record the number of features the tree is trained on.
    #[inline]
    pub fn set_num_feature(&mut self, num_feature: u32) {
        self.param.num_feature = num_feature;
    }

    /// Reset to `num_roots` leaves valued 0.0 with cleared statistics.
    pub fn init_model(&mut self) {
        let n = self.param.num_roots;
        self.nodes = vec![Node::leaf(0.0, None); n as usize];
        self.stats = vec![NodeStat::default(); n as usize];
        self.deleted.clear();
        self.param.num_nodes = n;
        self.param.num_deleted = 0;
        self.param.max_depth = 0;
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    #[inline]
    pub fn num_roots(&self) -> u32 {
        self.param.num_roots
    }

    /// Allocated node slots, including deleted ones.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn num_live_nodes(&self) -> usize {
        self.nodes.len() - self.deleted.len()
    }

    #[inline]
    pub fn node(&self, nid: NodeId) -> &Node {
        &self.nodes[nid as usize]
    }

    #[inline]
    pub fn is_root(&self, nid: NodeId) -> bool {
        nid < self.param.num_roots
    }

    #[inline]
    pub fn is_leaf(&self, nid: NodeId) -> bool {
        self.node(nid).is_leaf()
    }

    /// Deleted slots are non-root nodes without a parent.
    #[inline]
    pub fn is_deleted(&self, nid: NodeId) -> bool {
        !self.is_root(nid) && self.node(nid).parent.is_none()
    }

    #[inline]
    pub fn parent(&self, nid: NodeId) -> Option<NodeId> {
        self.node(nid).parent.map(|p| p.id)
    }

    #[inline]
    pub fn is_left_child(&self, nid: NodeId) -> bool {
        self.node(nid).parent.is_some_and(|p| p.is_left)
    }

    #[inline]
    fn split_parts(&self, nid: NodeId) -> (u32, f32, bool, NodeId, NodeId) {
        match self.node(nid).kind {
            NodeKind::Split {
                feature,
                cond,
                default_left,
                left,
                right,
            } => (feature, cond, default_left, left, right),
            NodeKind::Leaf { .. } => panic!("node {nid} is a leaf, not a split"),
        }
    }

    /// # Panics
    ///
    /// Panics if `nid` is a leaf. The same holds for the other split accessors.
    #[inline]
    pub fn left_child(&self, nid: NodeId) -> NodeId {
        self.split_parts(nid).3
    }

    #[inline]
    pub fn right_child(&self, nid: NodeId) -> NodeId {
        self.split_parts(nid).4
    }

    /// Child taken when the split feature is missing.
    #[inline]
    pub fn default_child(&self, nid: NodeId) -> NodeId {
        let (_, _, default_left, left, right) = self.split_parts(nid);
        if default_left {
            left
        } else {
            right
        }
    }

    #[inline]
    pub fn split_index(&self, nid: NodeId) -> u32 {
        self.split_parts(nid).0
    }

    #[inline]
    pub fn split_cond(&self, nid: NodeId) -> f32 {
        self.split_parts(nid).1
    }

    #[inline]
    pub fn default_left(&self, nid: NodeId) -> bool {
        self.split_parts(nid).2
    }

    /// # Panics
    ///
    /// Panics if `nid` is a split node.
    #[inline]
    pub fn leaf_value(&self, nid: NodeId) -> f32 {
        match self.node(nid).kind {
            NodeKind::Leaf { value } => value,
            NodeKind::Split { .. } => panic!("node {nid} is a split, not a leaf"),
        }
    }

    #[inline]
    pub fn stat(&self, nid: NodeId) -> &NodeStat {
        &self.stats[nid as usize]
    }

    #[inline]
    pub fn stat_mut(&mut self, nid: NodeId) -> &mut NodeStat {
        &mut self.stats[nid as usize]
    }

    /// Distance from `nid` to its root.
    pub fn depth(&self, mut nid: NodeId) -> u32 {
        let mut depth = 0;
        while let Some(p) = self.parent(nid) {
            depth += 1;
            nid = p;
        }
        depth
    }

    /// Live leaf ids in ascending order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as NodeId).filter(|&nid| self.is_leaf(nid) && !self.is_deleted(nid))
    }

    /// Recompute `param().max_depth` from the live leaves.
    pub fn refresh_max_depth(&mut self) {
        self.param.max_depth = self.leaves().map(|nid| self.depth(nid)).max().unwrap_or(0);
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    fn is_live_leaf(&self, nid: NodeId) -> bool {
        (nid as usize) < self.nodes.len() && !self.is_deleted(nid) && self.is_leaf(nid)
    }

    fn alloc_node(&mut self) -> NodeId {
        if let Some(nid) = self.deleted.pop() {
            self.param.num_deleted -= 1;
            return nid;
        }
        let nid = self.nodes.len() as NodeId;
        assert!(nid < i32::MAX as u32, "tree node count overflow");
        self.nodes.push(Node::leaf(0.0, None));
        self.stats.push(NodeStat::default());
        self.param.num_nodes += 1;
        nid
    }

    fn delete_node(&mut self, nid: NodeId) {
        self.nodes[nid as usize] = Node::leaf(0.0, None);
        self.stats[nid as usize] = NodeStat::default();
        self.deleted.push(nid);
        self.param.num_deleted += 1;
    }

    /// Turn leaf `nid` into a split with two fresh leaf children valued 0.0.
    ///
    /// Child ids come from the free list first, otherwise the node array
    /// grows. Returns `(left, right)`.
    ///
    /// # Panics
    ///
    /// Panics if `nid` is not a live leaf or `feature` exceeds
    /// [`MAX_SPLIT_FEATURE`].
    pub fn split(&mut self, nid: NodeId, feature: u32, cond: f32, default_left: bool) -> (NodeId, NodeId) {
        assert!(self.is_live_leaf(nid), "split requires a live leaf, got node {nid}");
        assert!(feature <= MAX_SPLIT_FEATURE, "split feature {feature} out of range");

        let left = self.alloc_node();
        let right = self.alloc_node();
        for (child, is_left) in [(left, true), (right, false)] {
            self.nodes[child as usize] = Node::leaf(0.0, Some(ParentLink { id: nid, is_left }));
            self.stats[child as usize] = NodeStat::default();
        }
        self.nodes[nid as usize].kind = NodeKind::Split {
            feature,
            cond,
            default_left,
            left,
            right,
        };
        (left, right)
    }

    /// Collapse split `nid` whose children are both leaves.
    ///
    /// The children go to the free list and `nid` becomes a leaf valued 0.0;
    /// the caller restores a meaningful value with
    /// [`set_leaf_value`](Self::set_leaf_value).
    ///
    /// # Panics
    ///
    /// Panics if `nid` is deleted, a leaf, or has a non-leaf child.
    pub fn prune(&mut self, nid: NodeId) {
        assert!(!self.is_deleted(nid), "cannot prune deleted node {nid}");
        let (left, right) = match self.node(nid).children() {
            Some((l, r)) if self.is_leaf(l) && self.is_leaf(r) => (l, r),
            _ => panic!("prune requires a split with two leaf children, got node {nid}"),
        };
        // Right first so the next split pops `left` as its left child.
        self.delete_node(right);
        self.delete_node(left);
        self.nodes[nid as usize].kind = NodeKind::Leaf { value: 0.0 };
    }

    /// # Panics
    ///
    /// Panics if `nid` is not a live leaf.
    pub fn set_leaf_value(&mut self, nid: NodeId, value: f32) {
        assert!(self.is_live_leaf(nid), "set_leaf_value requires a live leaf, got node {nid}");
        self.nodes[nid as usize].kind = NodeKind::Leaf { value };
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Leaf reached by `feat` starting at `root_id`.
    ///
    /// Missing features follow the default child; otherwise `value < cond`
    /// goes left.
    #[inline]
    pub fn leaf_index(&self, feat: &FVec, root_id: NodeId) -> NodeId {
        let mut nid = root_id;
        while let NodeKind::Split {
            feature,
            cond,
            default_left,
            left,
            right,
        } = self.node(nid).kind
        {
            nid = match feat.get(feature as usize) {
                None if default_left => left,
                None => right,
                Some(v) if v < cond => left,
                Some(_) => right,
            };
        }
        nid
    }

    #[inline]
    pub fn predict(&self, feat: &FVec, root_id: NodeId) -> f32 {
        self.leaf_value(self.leaf_index(feat, root_id))
    }

    /// Append every node visited from `root_id` to the leaf, inclusive.
    pub fn pred_path(&self, feat: &FVec, root_id: NodeId, out: &mut Vec<NodeId>) {
        let leaf = self.leaf_index(feat, root_id);
        let start = out.len();
        let mut nid = leaf;
        out.push(nid);
        while nid != root_id {
            match self.parent(nid) {
                Some(p) => nid = p,
                None => break,
            }
            out.push(nid);
        }
        out[start..].reverse();
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check structural consistency of the node array and free list.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.nodes.len();
        let num_roots = self.param.num_roots as usize;
        if num_roots == 0 {
            return Err(TreeValidationError::NoRoots);
        }
        for (field, recorded, actual) in [
            ("num_nodes", self.param.num_nodes as usize, n_nodes),
            ("num_deleted", self.param.num_deleted as usize, self.deleted.len()),
            ("stats length", self.stats.len(), n_nodes),
        ] {
            if recorded != actual {
                return Err(TreeValidationError::CountMismatch {
                    field,
                    recorded,
                    actual,
                });
            }
        }
        if n_nodes < num_roots {
            return Err(TreeValidationError::CountMismatch {
                field: "num_roots",
                recorded: num_roots,
                actual: n_nodes,
            });
        }

        let mut visited = vec![false; n_nodes];
        let mut stack: Vec<NodeId> = Vec::new();
        for root in 0..num_roots as NodeId {
            if self.nodes[root as usize].parent.is_some() {
                return Err(TreeValidationError::ParentMismatch { node: root });
            }
            stack.push(root);
            while let Some(node) = stack.pop() {
                if std::mem::replace(&mut visited[node as usize], true) {
                    return Err(TreeValidationError::DuplicateVisit { node });
                }
                let Some((left, right)) = self.nodes[node as usize].children() else {
                    continue;
                };
                for (child, is_left, side) in [(left, true, "left"), (right, false, "right")] {
                    if child as usize >= n_nodes {
                        return Err(TreeValidationError::ChildOutOfBounds {
                            node,
                            side,
                            child,
                            n_nodes,
                        });
                    }
                    if self.nodes[child as usize].parent != Some(ParentLink { id: node, is_left }) {
                        return Err(TreeValidationError::ParentMismatch { node: child });
                    }
                    stack.push(child);
                }
            }
        }

        for nid in num_roots..n_nodes {
            let node = &self.nodes[nid];
            if visited[nid] {
                continue;
            }
            if node.parent.is_some() {
                return Err(TreeValidationError::UnreachableNode { node: nid as NodeId });
            }
            if !node.is_leaf() {
                return Err(TreeValidationError::DeletedNotLeaf { node: nid as NodeId });
            }
        }

        let mut listed = vec![false; n_nodes];
        for &nid in &self.deleted {
            let ok = (nid as usize) < n_nodes
                && !visited[nid as usize]
                && (nid as usize) >= num_roots
                && !std::mem::replace(&mut listed[nid as usize], true);
            if !ok {
                return Err(TreeValidationError::FreeListMismatch { node: nid });
            }
        }
        let orphans = visited[num_roots..].iter().filter(|&&v| !v).count();
        if orphans != self.deleted.len() {
            return Err(TreeValidationError::CountMismatch {
                field: "num_deleted",
                recorded: self.deleted.len(),
                actual: orphans,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tree_is_single_leaf() {
        let tree = RegTree::new();
        assert_eq!(tree.num_nodes(), 1);
        assert!(tree.is_leaf(0));
        assert!(tree.is_root(0));
        assert_eq!(tree.leaf_value(0), 0.0);
        assert_eq!(tree.parent(0), None);
        tree.validate().unwrap();
    }

    #[test]
    fn split_creates_linked_children() {
        let mut tree = RegTree::new();
        let (l, r) = tree.split(0, 4, 0.3, true);
        assert_eq!((l, r), (1, 2));
        assert_eq!(tree.param().num_nodes, 3);
        assert_eq!(tree.split_index(0), 4);
        assert_eq!(tree.split_cond(0), 0.3);
        assert!(tree.default_left(0));
        assert_eq!(tree.default_child(0), 1);
        assert_eq!(tree.parent(1), Some(0));
        assert!(tree.is_left_child(1));
        assert!(!tree.is_left_child(2));
        assert_eq!(tree.leaf_value(1), 0.0);
        assert_eq!(tree.leaf_value(2), 0.0);
        tree.validate().unwrap();
    }

    #[test]
    fn prune_reclaims_and_split_reuses() {
        let mut tree = RegTree::new();
        tree.split(0, 1, 0.5, false);
        tree.set_leaf_value(1, -1.0);
        tree.prune(0);
        assert!(tree.is_leaf(0));
        assert_eq!(tree.leaf_value(0), 0.0);
        assert_eq!(tree.param().num_deleted, 2);
        assert!(tree.is_deleted(1) && tree.is_deleted(2));
        assert_eq!(tree.num_live_nodes(), 1);
        tree.validate().unwrap();

        let (l, r) = tree.split(0, 2, 1.5, true);
        assert_eq!((l, r), (1, 2));
        assert_eq!(tree.param().num_nodes, 3);
        assert_eq!(tree.param().num_deleted, 0);
        tree.validate().unwrap();
    }

    #[test]
    fn depth_and_leaves() {
        let mut tree = RegTree::new();
        let (l, _) = tree.split(0, 0, 0.0, false);
        let (ll, _) = tree.split(l, 1, 0.0, false);
        assert_eq!(tree.depth(ll), 2);
        assert_eq!(tree.leaves().collect::<Vec<_>>(), vec![2, 3, 4]);
        tree.refresh_max_depth();
        assert_eq!(tree.param().max_depth, 2);
    }

    #[test]
    fn traversal_uses_default_for_missing() {
        let mut tree = RegTree::new();
        let (l, r) = tree.split(0, 0, 1.0, true);
        tree.set_leaf_value(l, -1.0);
        tree.set_leaf_value(r, 1.0);

        assert_eq!(tree.predict(&FVec::from_dense(&[0.5], &[false]), 0), -1.0);
        assert_eq!(tree.predict(&FVec::from_dense(&[1.0], &[false]), 0), 1.0);
        assert_eq!(tree.predict(&FVec::from_dense(&[9.0], &[true]), 0), -1.0);

        let mut path = vec![99];
        tree.pred_path(&FVec::from_dense(&[2.0], &[false]), 0, &mut path);
        assert_eq!(path, vec![99, 0, r]);
    }

    #[test]
    fn multiple_roots() {
        let mut tree = RegTree::with_roots(2);
        let (l, r) = tree.split(1, 0, 0.0, false);
        assert_eq!((l, r), (2, 3));
        assert!(tree.is_root(1));
        assert!(!tree.is_deleted(1));
        tree.validate().unwrap();
    }

    #[test]
    fn set_param_keys() {
        let mut tree = RegTree::new();
        tree.set_param("num_roots", "3").unwrap();
        tree.set_param("num_feature", "12").unwrap();
        tree.set_param("unrelated", "x").unwrap();
        assert!(tree.set_param("num_roots", "0").is_err());
        assert!(tree.set_param("num_feature", "many").is_err());
        tree.init_model();
        assert_eq!(tree.num_nodes(), 3);
        assert_eq!(tree.param().num_feature, 12);
    }

    #[test]
    #[should_panic(expected = "live leaf")]
    fn split_internal_node_panics() {
        let mut tree = RegTree::new();
        tree.split(0, 0, 0.0, false);
        tree.split(0, 0, 0.0, false);
    }

    #[test]
    #[should_panic(expected = "two leaf children")]
    fn prune_leaf_panics() {
        let mut tree = RegTree::new();
        tree.prune(0);
    }

    #[test]
    #[should_panic(expected = "two leaf children")]
    fn prune_with_internal_child_panics() {
        let mut tree = RegTree::new();
        let (l, _) = tree.split(0, 0, 0.0, false);
        tree.split(l, 0, 0.0, false);
        tree.prune(0);
    }

    #[test]
    fn validate_detects_broken_parent_link() {
        let mut tree = RegTree::new();
        tree.split(0, 0, 0.0, false);
        tree.nodes[1].parent = Some(ParentLink { id: 0, is_left: false });
        assert_eq!(
            tree.validate(),
            Err(TreeValidationError::ParentMismatch { node: 1 })
        );
    }
}

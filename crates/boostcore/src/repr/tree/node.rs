//! Tree node and node statistics.

use super::NodeId;

/// Link from a node to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    pub id: NodeId,
    /// Whether the node is its parent's left child.
    pub is_left: bool,
}

/// What a node does: carry a leaf value or route instances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Leaf {
        value: f32,
    },
    Split {
        feature: u32,
        /// Instances with `value < cond` go left.
        cond: f32,
        /// Child taken when the feature is missing.
        default_left: bool,
        left: NodeId,
        right: NodeId,
    },
}

/// A node slot in the tree's node array.
///
/// Deleted slots are kept as parentless leaves until reused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub(crate) parent: Option<ParentLink>,
    pub(crate) kind: NodeKind,
}

impl Node {
    #[inline]
    pub(crate) const fn leaf(value: f32, parent: Option<ParentLink>) -> Self {
        Self {
            parent,
            kind: NodeKind::Leaf { value },
        }
    }

    #[inline]
    pub fn parent(&self) -> Option<ParentLink> {
        self.parent
    }

    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// `(left, right)` children of a split node.
    #[inline]
    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self.kind {
            NodeKind::Split { left, right, .. } => Some((left, right)),
            NodeKind::Leaf { .. } => None,
        }
    }
}

/// Per-node statistics recorded by tree updaters.
///
/// Pure data: the tree never reads these for routing or prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeStat {
    /// Loss reduction achieved by this node's split.
    pub loss_chg: f32,
    /// Sum of hessians of instances reaching the node.
    pub sum_hess: f32,
    /// Leaf weight the node would have if it were a leaf.
    pub base_weight: f32,
    /// Number of leaf children (used by pruners).
    pub leaf_child_cnt: i32,
}

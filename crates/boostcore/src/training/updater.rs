//! Tree updater contract.
//!
//! A tree booster runs a sequence of [`TreeUpdater`]s on a fresh tree each
//! round: typically a grower that materializes splits, then a pruner that
//! collapses the unprofitable ones. Updaters only mutate the tree through
//! [`RegTree::split`], [`RegTree::prune`], [`RegTree::set_leaf_value`] and the
//! node statistics.

use super::params::TreeTrainParams;
use crate::data::SparseMatrix;
use crate::repr::tree::{NodeKind, RegTree};
use crate::Parallelism;

/// Inputs of one update round.
///
/// `grad` and `hess` hold one entry per matrix row. `root_index` is either
/// empty (every instance starts at root 0) or holds one root id per row.
/// The matrix must have column access.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    pub grad: &'a [f32],
    pub hess: &'a [f32],
    pub matrix: &'a SparseMatrix,
    pub root_index: &'a [u32],
    pub parallelism: Parallelism,
}

impl UpdateContext<'_> {
    /// Root an instance starts from.
    #[inline]
    pub fn root_of(&self, ridx: usize) -> u32 {
        self.root_index.get(ridx).copied().unwrap_or(0)
    }
}

/// One stage of tree construction.
pub trait TreeUpdater: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Pick up new training parameters.
    fn configure(&mut self, params: &TreeTrainParams);

    /// Mutate `tree` using the statistics in `ctx`.
    fn update(&mut self, tree: &mut RegTree, ctx: &UpdateContext<'_>);
}

/// Recompute `leaf_child_cnt` for live splits and the recorded max depth.
pub(crate) fn refresh_derived_stats(tree: &mut RegTree) {
    for nid in 0..tree.num_nodes() as u32 {
        if tree.is_deleted(nid) {
            continue;
        }
        let cnt = match *tree.node(nid).kind() {
            NodeKind::Split { left, right, .. } => {
                tree.is_leaf(left) as i32 + tree.is_leaf(right) as i32
            }
            NodeKind::Leaf { .. } => 0,
        };
        tree.stat_mut(nid).leaf_child_cnt = cnt;
    }
    tree.refresh_max_depth();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_of_defaults_to_zero() {
        let m = SparseMatrix::new();
        let ctx = UpdateContext {
            grad: &[],
            hess: &[],
            matrix: &m,
            root_index: &[],
            parallelism: Parallelism::Sequential,
        };
        assert_eq!(ctx.root_of(5), 0);

        let roots = [1, 0];
        let ctx = UpdateContext {
            root_index: &roots,
            ..ctx
        };
        assert_eq!(ctx.root_of(0), 1);
    }

    #[test]
    fn derived_stats() {
        let mut tree = RegTree::new();
        let (l, _) = tree.split(0, 0, 0.0, false);
        tree.split(l, 1, 0.0, false);
        refresh_derived_stats(&mut tree);
        assert_eq!(tree.stat(0).leaf_child_cnt, 1);
        assert_eq!(tree.stat(l).leaf_child_cnt, 2);
        assert_eq!(tree.param().max_depth, 2);
    }
}

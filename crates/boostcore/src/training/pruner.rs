//! Post-growth pruning.
//!
//! Splits are grown greedily as long as they reduce the loss at all;
//! [`TreePruner`] then walks up from every leaf and collapses each split
//! whose children are both leaves and whose recorded loss change is below
//! `min_split_loss`. A collapsed node gets back the leaf value it had
//! before splitting, `learning_rate × base_weight`.

use super::params::TreeTrainParams;
use super::updater::{refresh_derived_stats, TreeUpdater, UpdateContext};
use crate::repr::tree::{NodeId, RegTree};

#[derive(Debug, Clone)]
pub struct TreePruner {
    min_split_loss: f32,
    learning_rate: f32,
}

impl TreePruner {
    pub fn new(params: &TreeTrainParams) -> Self {
        Self {
            min_split_loss: params.min_split_loss,
            learning_rate: params.learning_rate,
        }
    }

    /// Prune `tree` in place, returning how many splits were collapsed.
    pub fn prune(&self, tree: &mut RegTree) -> usize {
        let mut pruned = 0;
        let leaves: Vec<NodeId> = tree.leaves().collect();
        for leaf in leaves {
            let mut nid = leaf;
            while let Some(parent) = tree.parent(nid) {
                let Some((l, r)) = tree.node(parent).children() else { break };
                if !(tree.is_leaf(l) && tree.is_leaf(r)) {
                    break;
                }
                if tree.stat(parent).loss_chg >= self.min_split_loss {
                    break;
                }
                tree.prune(parent);
                let value = self.learning_rate * tree.stat(parent).base_weight;
                tree.set_leaf_value(parent, value);
                pruned += 1;
                nid = parent;
            }
        }
        if pruned > 0 {
            refresh_derived_stats(tree);
        }
        pruned
    }
}

impl TreeUpdater for TreePruner {
    fn name(&self) -> &'static str {
        "prune"
    }

    fn configure(&mut self, params: &TreeTrainParams) {
        *self = Self::new(params);
    }

    fn update(&mut self, tree: &mut RegTree, _ctx: &UpdateContext<'_>) {
        let pruned = self.prune(tree);
        tracing::trace!(pruned, live = tree.num_live_nodes(), "pruned tree");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pruner(min_split_loss: f32) -> TreePruner {
        let params = TreeTrainParams::builder()
            .min_split_loss(min_split_loss)
            .learning_rate(0.5)
            .build()
            .unwrap();
        TreePruner::new(&params)
    }

    /// Root split (loss 5) with a left child split (loss 0.5).
    fn two_level_tree() -> RegTree {
        let mut tree = RegTree::new();
        let (l, _) = tree.split(0, 0, 1.0, false);
        tree.split(l, 1, 2.0, true);
        tree.stat_mut(0).loss_chg = 5.0;
        tree.stat_mut(0).base_weight = 4.0;
        tree.stat_mut(l).loss_chg = 0.5;
        tree.stat_mut(l).base_weight = 2.0;
        tree
    }

    #[test]
    fn prunes_weak_bottom_split_only() {
        let mut tree = two_level_tree();
        assert_eq!(pruner(1.0).prune(&mut tree), 1);
        assert!(tree.is_leaf(1));
        assert_eq!(tree.leaf_value(1), 1.0);
        assert!(!tree.is_leaf(0));
        assert_eq!(tree.param().num_deleted, 2);
        assert_eq!(tree.stat(0).leaf_child_cnt, 2);
        tree.validate().unwrap();
    }

    #[test]
    fn cascades_to_root() {
        let mut tree = two_level_tree();
        assert_eq!(pruner(10.0).prune(&mut tree), 2);
        assert!(tree.is_leaf(0));
        assert_eq!(tree.leaf_value(0), 2.0);
        assert_eq!(tree.num_live_nodes(), 1);
        assert_eq!(tree.param().max_depth, 0);
        tree.validate().unwrap();
    }

    #[test]
    fn zero_threshold_keeps_everything() {
        let mut tree = two_level_tree();
        assert_eq!(pruner(0.0).prune(&mut tree), 0);
        assert_eq!(tree.num_live_nodes(), 5);
    }
}

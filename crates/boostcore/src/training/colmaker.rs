//! Exact greedy tree grower over the sorted column view.
//!
//! Trees grow level by level. For every node being expanded, each feature's
//! value-sorted column is scanned once per missing-value direction,
//! accumulating per-node gradient and hessian sums; every boundary between
//! two distinct values is a candidate threshold. Features are scanned in
//! parallel and the per-feature winners are reduced afterwards.
//!
//! # Missing values
//!
//! Instances without an entry for a feature never appear in its column.
//! The forward (ascending) scan keeps them on the right; the backward scan
//! keeps them on the left. [`DefaultDirection`] chooses which scans run.

use super::gain::{GainStrategy, L2Gain};
use super::params::{DefaultDirection, TreeTrainParams};
use super::sampling::RowSubsampler;
use super::updater::{refresh_derived_stats, TreeUpdater, UpdateContext};
use crate::data::ColEntry;
use crate::repr::tree::{NodeId, RegTree};

/// Minimum loss change for a split to be admitted.
const RT_EPS: f64 = 1e-5;

// =============================================================================
// Split candidates
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct SplitCandidate {
    loss_chg: f64,
    feature: u32,
    cond: f32,
    default_left: bool,
}

impl SplitCandidate {
    /// Higher loss wins; ties go to the lower feature index.
    #[inline]
    fn beats(&self, other: &Option<SplitCandidate>) -> bool {
        match other {
            None => true,
            Some(o) => {
                self.loss_chg > o.loss_chg || (self.loss_chg == o.loss_chg && self.feature < o.feature)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GradStats {
    grad: f64,
    hess: f64,
}

impl GradStats {
    #[inline]
    fn add(&mut self, grad: f32, hess: f32) {
        self.grad += grad as f64;
        self.hess += hess as f64;
    }

    #[inline]
    fn minus(self, other: GradStats) -> GradStats {
        GradStats {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ScanState {
    acc: GradStats,
    last_value: f32,
    seen: bool,
}

/// Threshold strictly between `lo < hi` such that `lo < cond <= hi`.
#[inline]
fn midpoint(lo: f32, hi: f32) -> f32 {
    let mid = (lo + hi) * 0.5;
    if mid > lo {
        mid
    } else {
        hi
    }
}

/// Smallest representable threshold that keeps `v` on the left.
#[inline]
fn above(v: f32) -> f32 {
    let bumped = v + (v.abs() * 1e-5).max(1e-5);
    if bumped > v {
        bumped
    } else {
        f32::INFINITY
    }
}

// =============================================================================
// ColMaker
// =============================================================================

/// Level-wise exact greedy grower.
#[derive(Debug, Clone)]
pub struct ColMaker<G: GainStrategy = L2Gain> {
    params: TreeTrainParams,
    gain: G,
    sampler: RowSubsampler,
}

impl ColMaker<L2Gain> {
    pub fn new(params: TreeTrainParams) -> Self {
        let gain = params.gain();
        Self::with_gain(params, gain)
    }
}

impl<G: GainStrategy> ColMaker<G> {
    /// Grower with a custom gain strategy.
    pub fn with_gain(params: TreeTrainParams, gain: G) -> Self {
        let sampler = RowSubsampler::new(params.subsample, params.seed);
        Self {
            params,
            gain,
            sampler,
        }
    }

    #[inline]
    pub fn params(&self) -> &TreeTrainParams {
        &self.params
    }

    fn leaf_weight(&self, s: GradStats) -> f64 {
        self.gain.weight(s.grad, s.hess)
    }

    /// Record statistics of a fresh node and give it its leaf value.
    fn init_node(&self, tree: &mut RegTree, nid: NodeId, s: GradStats) {
        let weight = self.leaf_weight(s);
        let stat = tree.stat_mut(nid);
        stat.sum_hess = s.hess as f32;
        stat.base_weight = weight as f32;
        tree.set_leaf_value(nid, (weight * self.params.learning_rate as f64) as f32);
    }

    fn consider(
        &self,
        best: &mut Option<SplitCandidate>,
        left: GradStats,
        right: GradStats,
        feature: u32,
        cond: f32,
        default_left: bool,
    ) {
        let mcw = self.params.min_child_weight as f64;
        if left.hess < mcw || right.hess < mcw {
            return;
        }
        let loss_chg = self.gain.split_gain(left.grad, left.hess, right.grad, right.hess);
        let cand = SplitCandidate {
            loss_chg,
            feature,
            cond,
            default_left,
        };
        if cand.beats(best) {
            *best = Some(cand);
        }
    }

    /// One directional scan of a feature column.
    ///
    /// Ascending scans accumulate the left side (missing go right);
    /// descending scans accumulate the right side (missing go left).
    #[allow(clippy::too_many_arguments)]
    fn scan<'a>(
        &self,
        entries: impl Iterator<Item = &'a ColEntry>,
        ascending: bool,
        feature: u32,
        ctx: &UpdateContext<'_>,
        positions: &[Option<NodeId>],
        slot_of: &[Option<usize>],
        totals: &[GradStats],
        best: &mut [Option<SplitCandidate>],
    ) {
        let mut states = vec![ScanState::default(); totals.len()];
        for e in entries {
            let ridx = e.row as usize;
            let Some(nid) = positions[ridx] else { continue };
            let Some(slot) = slot_of[nid as usize] else { continue };
            let st = &mut states[slot];
            if st.seen && e.value != st.last_value {
                let other = totals[slot].minus(st.acc);
                if ascending {
                    let cond = midpoint(st.last_value, e.value);
                    self.consider(&mut best[slot], st.acc, other, feature, cond, false);
                } else {
                    let cond = midpoint(e.value, st.last_value);
                    self.consider(&mut best[slot], other, st.acc, feature, cond, true);
                }
            }
            st.acc.add(ctx.grad[ridx], ctx.hess[ridx]);
            st.last_value = e.value;
            st.seen = true;
        }

        // Boundary between present values and missing instances.
        for (slot, st) in states.iter().enumerate() {
            if !st.seen {
                continue;
            }
            let other = totals[slot].minus(st.acc);
            if ascending {
                self.consider(&mut best[slot], st.acc, other, feature, above(st.last_value), false);
            } else {
                self.consider(&mut best[slot], other, st.acc, feature, st.last_value, true);
            }
        }
    }

    fn find_splits(
        &self,
        ctx: &UpdateContext<'_>,
        positions: &[Option<NodeId>],
        slot_of: &[Option<usize>],
        totals: &[GradStats],
    ) -> Vec<Option<SplitCandidate>> {
        let num_col = ctx.matrix.num_col().unwrap_or(0);
        let direction = self.params.default_direction;

        let per_feature = ctx.parallelism.maybe_par_map(0..num_col, |fid| {
            let col = ctx.matrix.col_slice(fid);
            let mut best = vec![None; totals.len()];
            if col.is_empty() {
                return best;
            }
            if direction != DefaultDirection::Left {
                self.scan(col.iter(), true, fid as u32, ctx, positions, slot_of, totals, &mut best);
            }
            if direction != DefaultDirection::Right {
                self.scan(col.iter().rev(), false, fid as u32, ctx, positions, slot_of, totals, &mut best);
            }
            best
        });

        let mut best: Vec<Option<SplitCandidate>> = vec![None; totals.len()];
        for feature_best in per_feature {
            for (slot, cand) in feature_best.into_iter().enumerate() {
                if let Some(c) = cand {
                    if c.beats(&best[slot]) {
                        best[slot] = Some(c);
                    }
                }
            }
        }
        best
    }

    fn node_totals(
        &self,
        ctx: &UpdateContext<'_>,
        positions: &[Option<NodeId>],
        slot_of: &[Option<usize>],
        n_slots: usize,
    ) -> Vec<GradStats> {
        let mut totals = vec![GradStats::default(); n_slots];
        for (ridx, pos) in positions.iter().enumerate() {
            if let Some(slot) = pos.and_then(|nid| slot_of.get(nid as usize).copied().flatten()) {
                totals[slot].add(ctx.grad[ridx], ctx.hess[ridx]);
            }
        }
        totals
    }

    fn initial_positions(&mut self, tree: &RegTree, ctx: &UpdateContext<'_>) -> Vec<Option<NodeId>> {
        let mut positions: Vec<Option<NodeId>> = (0..ctx.matrix.num_row())
            .map(|ridx| {
                let root = ctx.root_of(ridx);
                assert!(root < tree.num_roots(), "root index {root} out of range");
                (ctx.hess[ridx] >= 0.0).then_some(root)
            })
            .collect();
        self.sampler.apply(&mut positions);
        positions
    }
}

impl<G: GainStrategy> TreeUpdater for ColMaker<G> {
    fn name(&self) -> &'static str {
        "grow_colmaker"
    }

    fn configure(&mut self, params: &TreeTrainParams) {
        if params.seed != self.params.seed {
            self.sampler.reseed(params.seed);
        }
        self.sampler.set_rate(params.subsample);
        self.params = params.clone();
    }

    fn update(&mut self, tree: &mut RegTree, ctx: &UpdateContext<'_>) {
        let mut positions = self.initial_positions(tree, ctx);

        let mut expand: Vec<NodeId> = (0..tree.num_roots()).collect();
        let mut slot_of = vec![None; tree.num_nodes()];
        for (slot, &nid) in expand.iter().enumerate() {
            slot_of[nid as usize] = Some(slot);
        }
        let totals = self.node_totals(ctx, &positions, &slot_of, expand.len());
        for (&nid, &s) in expand.iter().zip(&totals) {
            self.init_node(tree, nid, s);
        }

        for depth in 0..self.params.max_depth {
            if expand.is_empty() {
                break;
            }
            slot_of.clear();
            slot_of.resize(tree.num_nodes(), None);
            for (slot, &nid) in expand.iter().enumerate() {
                slot_of[nid as usize] = Some(slot);
            }
            let totals = self.node_totals(ctx, &positions, &slot_of, expand.len());
            let best = self.find_splits(ctx, &positions, &slot_of, &totals);

            let mut next = Vec::new();
            for (&nid, cand) in expand.iter().zip(&best) {
                match cand {
                    Some(c) if c.loss_chg > RT_EPS => {
                        let (l, r) = tree.split(nid, c.feature, c.cond, c.default_left);
                        tree.stat_mut(nid).loss_chg = c.loss_chg as f32;
                        next.push(l);
                        next.push(r);
                    }
                    _ => {}
                }
            }
            tracing::trace!(depth, expanded = expand.len(), split = next.len() / 2, "grew level");
            if next.is_empty() {
                break;
            }

            let snapshot: &RegTree = tree;
            positions = ctx.parallelism.maybe_par_map(0..positions.len(), |ridx| {
                let nid = positions[ridx]?;
                if snapshot.is_leaf(nid) {
                    return Some(nid);
                }
                let next_nid = match ctx.matrix.feature_value(ridx, snapshot.split_index(nid)) {
                    None => snapshot.default_child(nid),
                    Some(v) if v < snapshot.split_cond(nid) => snapshot.left_child(nid),
                    Some(_) => snapshot.right_child(nid),
                };
                Some(next_nid)
            });

            slot_of.clear();
            slot_of.resize(tree.num_nodes(), None);
            for (slot, &nid) in next.iter().enumerate() {
                slot_of[nid as usize] = Some(slot);
            }
            let child_totals = self.node_totals(ctx, &positions, &slot_of, next.len());
            for (&nid, &s) in next.iter().zip(&child_totals) {
                self.init_node(tree, nid, s);
            }
            expand = next;
        }

        refresh_derived_stats(tree);
    }
}

//! Regression tree booster.

use std::cell::RefCell;

use super::{check_boost_inputs, check_root_index, decode_payload, BoosterError, GradBooster};
use crate::data::{FVec, SparseMatrix};
use crate::io::{BoosterKind, DeserializeError, SerializeError};
use crate::repr::tree::{NodeId, RegTree};
use crate::training::{ColMaker, TrainingLogger, TreePruner, TreeTrainParams, TreeUpdater, UpdateContext};
use crate::utils::{parse_param, run_with_threads, ParamError, Parallelism};

thread_local! {
    static SCRATCH: RefCell<FVec> = RefCell::new(FVec::default());
}

/// A single regression tree trained by a sequence of updaters.
///
/// Each [`do_boost`](GradBooster::do_boost) regrows the tree from its roots:
/// the default sequence is [`ColMaker`] followed by [`TreePruner`].
///
/// `num_roots` set through [`set_param`](GradBooster::set_param) is held
/// until the next [`init_model`](GradBooster::init_model) or `do_boost`, so a
/// loaded or trained tree stays consistent until it is reinitialized.
pub struct GBTree {
    tree: RegTree,
    num_roots: u32,
    params: TreeTrainParams,
    updaters: Vec<Box<dyn TreeUpdater>>,
    logger: TrainingLogger,
    rounds: usize,
}

impl Default for GBTree {
    fn default() -> Self {
        Self::new()
    }
}

impl GBTree {
    pub fn new() -> Self {
        Self::with_params(TreeTrainParams::default())
    }

    pub fn with_params(params: TreeTrainParams) -> Self {
        let updaters: Vec<Box<dyn TreeUpdater>> = vec![
            Box::new(ColMaker::new(params.clone())),
            Box::new(TreePruner::new(&params)),
        ];
        Self::with_updaters(params, updaters)
    }

    /// Booster running a custom updater sequence.
    pub fn with_updaters(params: TreeTrainParams, updaters: Vec<Box<dyn TreeUpdater>>) -> Self {
        Self {
            tree: RegTree::new(),
            num_roots: 1,
            logger: TrainingLogger::new(params.verbosity),
            params,
            updaters,
            rounds: 0,
        }
    }

    #[inline]
    pub fn tree(&self) -> &RegTree {
        &self.tree
    }

    #[inline]
    pub fn params(&self) -> &TreeTrainParams {
        &self.params
    }

    pub fn updater_names(&self) -> Vec<&'static str> {
        self.updaters.iter().map(|u| u.name()).collect()
    }

    /// Fresh tree with the configured roots, keeping the feature count.
    fn reset_tree(&mut self) {
        let num_feature = self.tree.param().num_feature;
        self.tree = RegTree::with_roots(self.num_roots);
        self.tree.set_num_feature(num_feature);
    }
}

impl GradBooster for GBTree {
    fn kind(&self) -> BoosterKind {
        BoosterKind::Tree
    }

    fn num_feature(&self) -> u32 {
        self.tree.param().num_feature
    }

    fn set_param(&mut self, name: &str, value: &str) -> Result<(), BoosterError> {
        if name == "num_roots" {
            let n: u32 = parse_param(name, value)?;
            if n == 0 {
                return Err(ParamError::new(name, value).into());
            }
            self.num_roots = n;
        } else {
            self.tree.set_param(name, value)?;
        }
        if self.params.set_param(name, value)? {
            for updater in &mut self.updaters {
                updater.configure(&self.params);
            }
            self.logger = TrainingLogger::new(self.params.verbosity);
        }
        Ok(())
    }

    fn init_model(&mut self) {
        self.reset_tree();
        self.rounds = 0;
    }

    fn save_payload(&self, out: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.tree.serialize(out)
    }

    fn load_payload(&mut self, payload: &[u8]) -> Result<(), DeserializeError> {
        self.tree = decode_payload(payload, |r| RegTree::deserialize(r))?;
        self.num_roots = self.tree.num_roots();
        Ok(())
    }

    fn do_boost(
        &mut self,
        grad: &mut [f32],
        hess: &mut [f32],
        matrix: &SparseMatrix,
        root_index: &[u32],
    ) -> Result<(), BoosterError> {
        let num_col = check_boost_inputs(grad, hess, matrix, root_index, self.num_roots)?;
        self.logger
            .debug(&format!("building tree with {} instances", matrix.num_row()));

        let num_feature = self.num_feature().max(u32::try_from(num_col).unwrap_or(u32::MAX));
        self.reset_tree();
        self.tree.set_num_feature(num_feature);

        let (grad, hess) = (&*grad, &*hess);
        let tree = &mut self.tree;
        let updaters = &mut self.updaters;
        run_with_threads(self.params.n_threads, |parallelism| {
            let ctx = UpdateContext {
                grad,
                hess,
                matrix,
                root_index,
                parallelism,
            };
            for updater in updaters.iter_mut() {
                tracing::trace!(updater = updater.name(), "running tree updater");
                updater.update(tree, &ctx);
            }
        });

        self.logger.log_metrics(
            self.rounds,
            &[
                ("live_nodes", self.tree.num_live_nodes() as f64),
                ("max_depth", self.tree.param().max_depth as f64),
            ],
        );
        self.rounds += 1;
        Ok(())
    }

    fn predict(&self, matrix: &SparseMatrix, ridx: usize, root_id: u32) -> f32 {
        SCRATCH.with(|cell| {
            let mut feat = cell.borrow_mut();
            matrix.fill_dense(ridx, &mut feat);
            let value = self.tree.predict(&feat, root_id);
            matrix.drop_dense(ridx, &mut feat);
            value
        })
    }

    fn predict_dense(&self, values: &[f32], unknown: &[bool], root_id: u32) -> f32 {
        self.tree.predict(&FVec::from_dense(values, unknown), root_id)
    }

    fn predict_batch(
        &self,
        matrix: &SparseMatrix,
        root_index: &[u32],
        parallelism: Parallelism,
    ) -> Result<Vec<f32>, BoosterError> {
        check_root_index(root_index, matrix.num_row(), self.tree.num_roots())?;
        Ok(parallelism.maybe_par_map_init(0..matrix.num_row(), FVec::default, |feat, ridx| {
            let root = root_index.get(ridx).copied().unwrap_or(0);
            matrix.fill_dense(ridx, feat);
            let value = self.tree.predict(feat, root);
            matrix.drop_dense(ridx, feat);
            value
        }))
    }

    fn pred_path(
        &self,
        out: &mut Vec<NodeId>,
        matrix: &SparseMatrix,
        ridx: usize,
        root_id: u32,
    ) -> Result<(), BoosterError> {
        SCRATCH.with(|cell| {
            let mut feat = cell.borrow_mut();
            matrix.fill_dense(ridx, &mut feat);
            self.tree.pred_path(&feat, root_id, out);
            matrix.drop_dense(ridx, &mut feat);
        });
        Ok(())
    }
}

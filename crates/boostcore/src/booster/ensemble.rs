//! Additive ensembles of boosters.
//!
//! An [`Ensemble`] trains one fresh booster per round and predicts the sum
//! of `base_score` and every member's output.
//!
//! # Persisted layout
//!
//! ```text
//! 4 bytes  magic "BSTE"
//! u8       booster kind
//! 3 bytes  reserved
//! f32      base score
//! u32      member count
//! member envelopes, in training order
//! ```

use std::io::{Read, Write};

use super::{check_root_index, BoosterError, BoosterRegistry, GradBooster};
use crate::data::SparseMatrix;
use crate::io::{BoosterKind, DeserializeError, ReadLe, SerializeError, WriteLe};
use crate::utils::parse_param;
use crate::Parallelism;

pub const ENSEMBLE_MAGIC: &[u8; 4] = b"BSTE";

/// Ordered members of one booster kind plus a constant offset.
pub struct Ensemble {
    kind: BoosterKind,
    base_score: f32,
    params: Vec<(String, String)>,
    members: Vec<Box<dyn GradBooster>>,
    registry: BoosterRegistry,
}

impl Ensemble {
    /// Empty ensemble using the default registry.
    pub fn new(kind: BoosterKind) -> Self {
        Self::with_registry(kind, BoosterRegistry::with_defaults())
    }

    pub fn with_registry(kind: BoosterKind, registry: BoosterRegistry) -> Self {
        Self {
            kind,
            base_score: 0.0,
            params: Vec::new(),
            members: Vec::new(),
            registry,
        }
    }

    #[inline]
    pub fn kind(&self) -> BoosterKind {
        self.kind
    }

    #[inline]
    pub fn base_score(&self) -> f32 {
        self.base_score
    }

    pub fn set_base_score(&mut self, base_score: f32) {
        self.base_score = base_score;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[Box<dyn GradBooster>] {
        &self.members
    }

    /// Store a parameter forwarded to every booster created afterwards.
    ///
    /// `base_score` is consumed by the ensemble itself. Other values are
    /// checked against a scratch booster so a bad value fails here rather
    /// than at the next round.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<(), BoosterError> {
        if name == "base_score" {
            self.base_score = parse_param(name, value)?;
            return Ok(());
        }
        self.registry.create(self.kind)?.set_param(name, value)?;
        self.params.retain(|(n, _)| n != name);
        self.params.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Train one new member on the given statistics and append it.
    pub fn boost_round(
        &mut self,
        grad: &mut [f32],
        hess: &mut [f32],
        matrix: &SparseMatrix,
        root_index: &[u32],
    ) -> Result<(), BoosterError> {
        let mut booster = self.registry.create(self.kind)?;
        for (name, value) in &self.params {
            booster.set_param(name, value)?;
        }
        booster.init_model();
        booster.do_boost(grad, hess, matrix, root_index)?;
        self.members.push(booster);
        tracing::debug!(kind = %self.kind, members = self.members.len(), "ensemble round finished");
        Ok(())
    }

    pub fn predict(&self, matrix: &SparseMatrix, ridx: usize, root_id: u32) -> f32 {
        self.members
            .iter()
            .fold(self.base_score, |acc, m| acc + m.predict(matrix, ridx, root_id))
    }

    pub fn predict_dense(&self, values: &[f32], unknown: &[bool], root_id: u32) -> f32 {
        self.members
            .iter()
            .fold(self.base_score, |acc, m| acc + m.predict_dense(values, unknown, root_id))
    }

    pub fn predict_batch(
        &self,
        matrix: &SparseMatrix,
        root_index: &[u32],
        parallelism: Parallelism,
    ) -> Result<Vec<f32>, BoosterError> {
        check_root_index(root_index, matrix.num_row(), u32::MAX)?;
        let mut out = vec![self.base_score; matrix.num_row()];
        for member in &self.members {
            let preds = member.predict_batch(matrix, root_index, parallelism)?;
            out.iter_mut().zip(preds).for_each(|(o, p)| *o += p);
        }
        Ok(out)
    }

    fn write_header(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        let count = u32::try_from(self.members.len())
            .map_err(|_| SerializeError::PayloadTooLarge(self.members.len()))?;
        writer.write_all(ENSEMBLE_MAGIC)?;
        writer.write_le_u8(self.kind as u8)?;
        writer.write_all(&[0u8; 3])?;
        writer.write_le_f32(self.base_score)?;
        writer.write_le_u32(count)?;
        Ok(())
    }

    pub fn save(&self, writer: &mut dyn Write) -> Result<(), BoosterError> {
        self.write_header(writer)?;
        for member in &self.members {
            member.save_model(writer)?;
        }
        Ok(())
    }

    /// Load an ensemble, creating members through `registry`.
    pub fn load(reader: &mut dyn Read, registry: BoosterRegistry) -> Result<Self, BoosterError> {
        let magic = reader.read_le_array::<4>("ensemble header")?;
        if &magic != ENSEMBLE_MAGIC {
            return Err(DeserializeError::NotAModel.into());
        }
        let id = reader.read_le_u8("ensemble header")?;
        let kind = BoosterKind::from_u8(id).ok_or(DeserializeError::UnknownKind(id))?;
        reader.read_le_array::<3>("ensemble header")?;
        let base_score = reader.read_le_f32("ensemble header")?;
        let count = reader.read_le_u32("ensemble header")?;

        let mut ensemble = Self::with_registry(kind, registry);
        ensemble.base_score = base_score;
        for _ in 0..count {
            let mut member = ensemble.registry.create(kind)?;
            member.load_model(reader)?;
            ensemble.members.push(member);
        }
        Ok(ensemble)
    }
}

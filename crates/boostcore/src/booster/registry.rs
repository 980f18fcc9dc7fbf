//! Booster construction by kind.

use std::collections::BTreeMap;
use std::io::Read;

use super::{BoosterError, GBLinear, GBTree, GradBooster};
use crate::io::{BoosterKind, DeserializeError, NativeCodec};

/// Constructor of an untrained booster.
pub type BoosterCtor = fn() -> Box<dyn GradBooster>;

fn new_gbtree() -> Box<dyn GradBooster> {
    Box::new(GBTree::new())
}

fn new_gblinear() -> Box<dyn GradBooster> {
    Box::new(GBLinear::new())
}

/// Maps booster kinds to constructors.
#[derive(Debug, Clone, Default)]
pub struct BoosterRegistry {
    ctors: BTreeMap<BoosterKind, BoosterCtor>,
}

impl BoosterRegistry {
    /// Registry with no constructors.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the tree and linear boosters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(BoosterKind::Tree, new_gbtree);
        registry.register(BoosterKind::Linear, new_gblinear);
        registry
    }

    /// Install `ctor` for `kind`, returning the constructor it replaces.
    pub fn register(&mut self, kind: BoosterKind, ctor: BoosterCtor) -> Option<BoosterCtor> {
        self.ctors.insert(kind, ctor)
    }

    pub fn contains(&self, kind: BoosterKind) -> bool {
        self.ctors.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = BoosterKind> + '_ {
        self.ctors.keys().copied()
    }

    pub fn create(&self, kind: BoosterKind) -> Result<Box<dyn GradBooster>, BoosterError> {
        self.ctors
            .get(&kind)
            .map(|ctor| ctor())
            .ok_or_else(|| BoosterError::UnknownBooster(kind.name().to_string()))
    }

    /// Create by name, e.g. `"gbtree"`.
    pub fn create_by_name(&self, name: &str) -> Result<Box<dyn GradBooster>, BoosterError> {
        let kind =
            BoosterKind::from_name(name).ok_or_else(|| BoosterError::UnknownBooster(name.to_string()))?;
        self.create(kind)
    }

    /// Create by the discriminant stored in model files.
    pub fn create_by_id(&self, id: u8) -> Result<Box<dyn GradBooster>, BoosterError> {
        let kind = BoosterKind::from_u8(id).ok_or_else(|| BoosterError::UnknownBooster(id.to_string()))?;
        self.create(kind)
    }

    /// Read one enveloped model and return a booster of the recorded kind.
    pub fn load(&self, reader: &mut dyn Read) -> Result<Box<dyn GradBooster>, BoosterError> {
        let (header, payload) = NativeCodec::new().read_from(reader)?;
        let mut booster = self.create(header.kind)?;
        booster.load_payload(&payload)?;
        if booster.num_feature() != header.num_feature {
            return Err(DeserializeError::Corrupt(format!(
                "header records {} features, payload {}",
                header.num_feature,
                booster.num_feature()
            ))
            .into());
        }
        tracing::debug!(kind = %header.kind, num_feature = header.num_feature, "loaded booster");
        Ok(booster)
    }
}

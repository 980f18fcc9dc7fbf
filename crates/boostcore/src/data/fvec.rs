//! Dense feature vector with an explicit missing mask.

use super::sparse::Entry;

/// Dense view of one instance used during tree traversal.
///
/// A slot is either a known value or missing. Sparse rows are scattered in
/// with [`fill`](Self::fill) and cleared with [`drop_entries`](Self::drop_entries)
/// so a single vector can be reused across rows without a full reset.
#[derive(Debug, Clone, Default)]
pub struct FVec {
    values: Vec<f32>,
    known: Vec<bool>,
}

impl FVec {
    /// All-missing vector with `len` slots.
    pub fn with_len(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
            known: vec![false; len],
        }
    }

    /// Build from dense values and an "unknown" mask.
    ///
    /// # Panics
    ///
    /// Panics if the slices differ in length.
    pub fn from_dense(values: &[f32], unknown: &[bool]) -> Self {
        assert_eq!(
            values.len(),
            unknown.len(),
            "values and unknown mask must have equal length"
        );
        Self {
            values: values.to_vec(),
            known: unknown.iter().map(|&u| !u).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Grow to at least `len` slots; new slots are missing.
    pub fn ensure_len(&mut self, len: usize) {
        if self.values.len() < len {
            self.values.resize(len, 0.0);
            self.known.resize(len, false);
        }
    }

    /// Value of feature `fidx`, `None` if missing or beyond the vector.
    #[inline]
    pub fn get(&self, fidx: usize) -> Option<f32> {
        match self.known.get(fidx) {
            Some(true) => Some(self.values[fidx]),
            _ => None,
        }
    }

    /// Scatter sparse entries into the vector.
    pub fn fill(&mut self, entries: &[Entry]) {
        if let Some(last) = entries.iter().map(|e| e.index as usize).max() {
            self.ensure_len(last + 1);
        }
        for e in entries {
            self.values[e.index as usize] = e.value;
            self.known[e.index as usize] = true;
        }
    }

    /// Mark the given entries missing again.
    pub fn drop_entries(&mut self, entries: &[Entry]) {
        for e in entries {
            if let Some(k) = self.known.get_mut(e.index as usize) {
                *k = false;
            }
        }
    }
}

//! Dual-access sparse feature matrix.
//!
//! [`SparseMatrix`] stores instances row-wise (CSR) for prediction and
//! gradient computation, and can additionally materialize a column view
//! (CSC) whose per-feature buckets are sorted by value for split search.
//!
//! # Persisted layout
//!
//! All fields little-endian, offsets as explicit `u64`:
//!
//! ```text
//! u64                      row_count
//! u64 × (row_count + 1)    row offsets
//! (u32 index, f32 value)   × row_offsets[last]
//! u8                       column-access flag (0 or 1)
//! if flag == 1:
//!   u64                    col_count
//!   u64 × (col_count + 1)  column offsets
//!   (u32 row, f32 value)   × col_offsets[last]
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::cmp::Ordering;
use std::ops::RangeBounds;
use std::path::Path;

use ndarray::ArrayView2;
use thiserror::Error;

use super::bucket::BucketBuilder;
use super::fvec::FVec;
use crate::io::{DeserializeError, ReadLe, SerializeError, WriteLe};
use crate::Parallelism;

// ============================================================================
// Entries
// ============================================================================

/// One present feature of a row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Entry {
    pub index: u32,
    pub value: f32,
}

impl Entry {
    #[inline]
    pub const fn new(index: u32, value: f32) -> Self {
        Self { index, value }
    }
}

/// One row's value within a feature column.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColEntry {
    pub row: u32,
    pub value: f32,
}

impl ColEntry {
    #[inline]
    pub const fn new(row: u32, value: f32) -> Self {
        Self { row, value }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum MatrixError {
    /// Column access was requested before `build_column_view`.
    #[error("column access is not available; call build_column_view first")]
    NoColumnAccess,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Deserialize(#[from] DeserializeError),
}

// ============================================================================
// Cursors
// ============================================================================

/// Restartable forward cursor over a slice of copyable entries.
#[derive(Debug, Clone)]
pub struct Cursor<'a, T> {
    items: &'a [T],
    pos: usize,
}

impl<'a, T: Copy> Cursor<'a, T> {
    fn new(items: &'a [T]) -> Self {
        Self { items, pos: 0 }
    }

    /// Rewind to before the first element.
    #[inline]
    pub fn restart(&mut self) {
        self.pos = 0;
    }

    /// The full underlying slice, regardless of position.
    #[inline]
    pub fn as_slice(&self) -> &'a [T] {
        self.items
    }
}

impl<T: Copy> Iterator for Cursor<'_, T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        let item = self.items.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.items.len() - self.pos;
        (n, Some(n))
    }
}

impl<T: Copy> ExactSizeIterator for Cursor<'_, T> {}

/// Entries of one row in stored (feature index) order.
pub type RowIter<'a> = Cursor<'a, Entry>;

/// Entries of one column in ascending value order.
pub type ColIter<'a> = Cursor<'a, ColEntry>;

// ============================================================================
// SparseMatrix
// ============================================================================

/// Sparse feature matrix with row access and optional sorted column access.
///
/// Rows are appended with [`add_row`](Self::add_row); row ids are insertion
/// order. Any mutation discards the column view, which must be rebuilt with
/// [`build_column_view`](Self::build_column_view) before column access.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    row_ptr: Vec<usize>,
    row_data: Vec<Entry>,
    col_ptr: Vec<usize>,
    col_data: Vec<ColEntry>,
}

impl Default for SparseMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseMatrix {
    pub fn new() -> Self {
        Self {
            row_ptr: vec![0],
            row_data: Vec::new(),
            col_ptr: Vec::new(),
            col_data: Vec::new(),
        }
    }

    /// Build from a dense row-major array, treating NaN as missing.
    pub fn from_dense(features: ArrayView2<'_, f32>) -> Self {
        let mut m = Self::new();
        let mut indices = Vec::with_capacity(features.ncols());
        let mut values = Vec::with_capacity(features.ncols());
        for row in features.rows() {
            indices.clear();
            values.clear();
            for (j, &v) in row.iter().enumerate() {
                if !v.is_nan() {
                    indices.push(j as u32);
                    values.push(v);
                }
            }
            m.add_row(&indices, &values);
        }
        m
    }

    /// Remove all rows and the column view.
    pub fn clear(&mut self) {
        self.row_ptr.clear();
        self.row_ptr.push(0);
        self.row_data.clear();
        self.drop_column_view();
    }

    /// Append a row and return its id.
    ///
    /// `indices` must be strictly increasing; `values` pairs with `indices`.
    pub fn add_row(&mut self, indices: &[u32], values: &[f32]) -> usize {
        self.add_row_in_range(indices, values, ..)
    }

    /// Append a row keeping only features whose index lies in `range`.
    pub fn add_row_in_range(
        &mut self,
        indices: &[u32],
        values: &[f32],
        range: impl RangeBounds<u32>,
    ) -> usize {
        assert_eq!(
            indices.len(),
            values.len(),
            "indices and values must have equal length"
        );
        debug_assert!(
            indices.windows(2).all(|w| w[0] < w[1]),
            "row feature indices must be strictly increasing"
        );

        self.drop_column_view();
        self.row_data.extend(
            indices
                .iter()
                .zip(values)
                .filter(|(i, _)| range.contains(*i))
                .map(|(&i, &v)| Entry::new(i, v)),
        );
        self.row_ptr.push(self.row_data.len());
        self.row_ptr.len() - 2
    }

    #[inline]
    pub fn num_row(&self) -> usize {
        self.row_ptr.len() - 1
    }

    /// Total stored entries.
    #[inline]
    pub fn num_entry(&self) -> usize {
        self.row_data.len()
    }

    /// Number of column buckets (one past the largest feature index).
    pub fn num_col(&self) -> Result<usize, MatrixError> {
        if !self.have_col_access() {
            return Err(MatrixError::NoColumnAccess);
        }
        Ok(self.col_ptr.len() - 1)
    }

    #[inline]
    pub fn have_col_access(&self) -> bool {
        !self.col_ptr.is_empty() && self.col_data.len() == self.row_data.len()
    }

    /// Row entries as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `ridx >= num_row()`.
    #[inline]
    pub fn row_slice(&self, ridx: usize) -> &[Entry] {
        &self.row_data[self.row_ptr[ridx]..self.row_ptr[ridx + 1]]
    }

    #[inline]
    pub fn row(&self, ridx: usize) -> RowIter<'_> {
        Cursor::new(self.row_slice(ridx))
    }

    /// Column entries sorted ascending by value.
    ///
    /// # Panics
    ///
    /// Panics if column access is disabled or `fidx` is out of range.
    #[inline]
    pub fn col_slice(&self, fidx: usize) -> &[ColEntry] {
        assert!(self.have_col_access(), "column access is not available");
        &self.col_data[self.col_ptr[fidx]..self.col_ptr[fidx + 1]]
    }

    #[inline]
    pub fn col(&self, fidx: usize) -> ColIter<'_> {
        Cursor::new(self.col_slice(fidx))
    }

    /// Number of entries in feature column `fidx`.
    #[inline]
    pub fn col_len(&self, fidx: usize) -> usize {
        self.col_slice(fidx).len()
    }

    /// Value of feature `fidx` in row `ridx`, if present.
    pub fn feature_value(&self, ridx: usize, fidx: u32) -> Option<f32> {
        let row = self.row_slice(ridx);
        row.binary_search_by_key(&fidx, |e| e.index)
            .ok()
            .map(|i| row[i].value)
    }

    /// Scatter row `ridx` into `fvec`.
    #[inline]
    pub fn fill_dense(&self, ridx: usize, fvec: &mut FVec) {
        fvec.fill(self.row_slice(ridx));
    }

    /// Undo [`fill_dense`](Self::fill_dense) for row `ridx`.
    #[inline]
    pub fn drop_dense(&self, ridx: usize, fvec: &mut FVec) {
        fvec.drop_entries(self.row_slice(ridx));
    }

    fn drop_column_view(&mut self) {
        self.col_ptr.clear();
        self.col_data.clear();
    }

    /// Materialize the value-sorted column view.
    ///
    /// Entries are bucketed by feature index in two passes (budget, then
    /// fill), after which each bucket is stably sorted by value. Ties keep
    /// ascending row order. Does nothing if the view already exists.
    pub fn build_column_view(&mut self, parallelism: Parallelism) {
        if self.have_col_access() {
            return;
        }

        let mut builder = BucketBuilder::<ColEntry>::new();
        builder.init_budget(0);
        for e in &self.row_data {
            builder.add_budget(e.index as usize, 1);
        }
        builder.init_storage();
        for ridx in 0..self.num_row() {
            for e in self.row_slice(ridx) {
                builder.push_elem(e.index as usize, ColEntry::new(ridx as u32, e.value));
            }
        }

        parallelism.maybe_par_for_each(builder.buckets_mut(), |bucket| {
            bucket.sort_by(|a, b| a.value.total_cmp(&b.value));
        });

        let (col_ptr, col_data) = builder.finish();
        tracing::debug!(
            rows = self.num_row(),
            cols = col_ptr.len() - 1,
            entries = col_data.len(),
            "built column view"
        );
        self.col_ptr = col_ptr;
        self.col_data = col_data;
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the matrix in the raw little-endian layout.
    pub fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), SerializeError> {
        write_offsets(writer, &self.row_ptr)?;
        for e in &self.row_data {
            writer.write_le_u32(e.index)?;
            writer.write_le_f32(e.value)?;
        }

        if self.have_col_access() {
            writer.write_le_u8(1)?;
            write_offsets(writer, &self.col_ptr)?;
            for e in &self.col_data {
                writer.write_le_u32(e.row)?;
                writer.write_le_f32(e.value)?;
            }
        } else {
            writer.write_le_u8(0)?;
        }
        Ok(())
    }

    /// Read a matrix written by [`serialize`](Self::serialize).
    ///
    /// Rows must have strictly increasing feature indices. A stored column
    /// view must be value-sorted per column (ties in row order) and match
    /// the row entries one-to-one; anything else is `Corrupt`.
    pub fn deserialize<R: Read + ?Sized>(reader: &mut R) -> Result<Self, DeserializeError> {
        let row_ptr = read_offsets(reader, "row offsets")?;
        let total = *row_ptr.last().unwrap_or(&0);
        let row_data = reader.read_le_vec(total, |r| {
            Ok(Entry::new(r.read_le_u32("row entries")?, r.read_le_f32("row entries")?))
        })?;

        let mut m = Self {
            row_ptr,
            row_data,
            col_ptr: Vec::new(),
            col_data: Vec::new(),
        };
        for ridx in 0..m.num_row() {
            if m.row_slice(ridx).windows(2).any(|w| w[0].index >= w[1].index) {
                return Err(DeserializeError::Corrupt(format!(
                    "row {ridx} has unordered feature indices"
                )));
            }
        }

        match reader.read_le_u8("column flag")? {
            0 => {}
            1 => {
                let col_ptr = read_offsets(reader, "column offsets")?;
                let col_total = *col_ptr.last().unwrap_or(&0);
                if col_total != m.row_data.len() {
                    return Err(DeserializeError::Corrupt(format!(
                        "column view holds {col_total} entries, rows hold {}",
                        m.row_data.len()
                    )));
                }
                m.col_data = reader.read_le_vec(col_total, |r| {
                    Ok(ColEntry::new(
                        r.read_le_u32("column entries")?,
                        r.read_le_f32("column entries")?,
                    ))
                })?;
                if let Some(e) = m.col_data.iter().find(|e| e.row as usize >= m.num_row()) {
                    return Err(DeserializeError::Corrupt(format!(
                        "column entry references row {} of {}",
                        e.row,
                        m.num_row()
                    )));
                }
                m.col_ptr = col_ptr;
                m.check_column_view()?;
            }
            flag => {
                return Err(DeserializeError::Corrupt(format!(
                    "invalid column flag {flag}"
                )))
            }
        }
        Ok(m)
    }

    /// Every column is sorted and each entry is its row's value for that
    /// feature. With equal totals and no repeated row per column, this makes
    /// the column view a bijection onto the row entries.
    fn check_column_view(&self) -> Result<(), DeserializeError> {
        for fidx in 0..self.col_ptr.len() - 1 {
            let col = self.col_slice(fidx);
            let unordered = col.windows(2).any(|w| match w[0].value.total_cmp(&w[1].value) {
                Ordering::Less => false,
                Ordering::Equal => w[0].row >= w[1].row,
                Ordering::Greater => true,
            });
            if unordered {
                return Err(DeserializeError::Corrupt(format!(
                    "column {fidx} is not sorted by value"
                )));
            }
            let feature = u32::try_from(fidx).map_err(|_| {
                DeserializeError::Corrupt(format!("column {fidx} exceeds the feature index range"))
            })?;
            for e in col {
                let stored = self.feature_value(e.row as usize, feature);
                if stored.map(f32::to_bits) != Some(e.value.to_bits()) {
                    return Err(DeserializeError::Corrupt(format!(
                        "column {fidx} entry for row {} does not match the row",
                        e.row
                    )));
                }
            }
        }
        Ok(())
    }

    /// Save to a file at `path`.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<(), MatrixError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.serialize(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Load from a file at `path`.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, MatrixError> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(Self::deserialize(&mut reader)?)
    }
}

fn write_offsets<W: Write + ?Sized>(writer: &mut W, offsets: &[usize]) -> std::io::Result<()> {
    writer.write_le_len(offsets.len() - 1)?;
    for &o in offsets {
        writer.write_le_len(o)?;
    }
    Ok(())
}

fn read_offsets<R: Read + ?Sized>(
    reader: &mut R,
    section: &'static str,
) -> Result<Vec<usize>, DeserializeError> {
    let count = reader.read_le_len(section)?;
    let len = count
        .checked_add(1)
        .ok_or_else(|| DeserializeError::Corrupt(format!("{section}: count overflows")))?;
    let offsets = reader.read_le_vec(len, |r| r.read_le_len(section))?;
    if offsets[0] != 0 {
        return Err(DeserializeError::Corrupt(format!(
            "{section}: first offset is {}",
            offsets[0]
        )));
    }
    if offsets.windows(2).any(|w| w[0] > w[1]) {
        return Err(DeserializeError::Corrupt(format!(
            "{section}: offsets are not monotone"
        )));
    }
    Ok(offsets)
}

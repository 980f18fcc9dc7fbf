//! Two-phase bucket builder.
//!
//! [`BucketBuilder`] redistributes `(key, value)` pairs into contiguous
//! per-key segments of one flat buffer. The caller first declares how many
//! values each key will receive, then allocates storage once, then pushes
//! exactly that many values per key:
//!
//! ```
//! use boostcore::data::BucketBuilder;
//!
//! let mut builder = BucketBuilder::<u32>::new();
//! builder.init_budget(0);
//! builder.add_budget(2, 1);
//! builder.add_budget(0, 2);
//! builder.init_storage();
//! builder.push_elem(2, 20);
//! builder.push_elem(0, 1);
//! builder.push_elem(0, 2);
//!
//! assert_eq!(builder.bucket(0), &[1, 2]);
//! assert!(builder.bucket(1).is_empty());
//! assert_eq!(builder.bucket(2), &[20]);
//! ```
//!
//! The push count per key must equal its budget. Pushing more than budgeted
//! either panics (last key) or overwrites the start of the next segment;
//! pushing fewer leaves default-initialized slots.

/// Largest key accepted by [`BucketBuilder::add_budget`].
///
/// Keys are feature indices stored as `u32` on the wire.
pub const MAX_BUCKET_KEY: usize = u32::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Budget,
    Fill,
}

/// Builder for a bucketed flat array.
///
/// Offsets have `num_buckets + 1` slots. During budgeting slot `k + 1` holds
/// the pending count of key `k`. After [`init_storage`](Self::init_storage)
/// slot `k + 1` is the write cursor of key `k`, starting at the bucket's
/// first position; once every key is filled it has advanced to the bucket
/// end, which makes `offsets[k]..offsets[k + 1]` the final segment.
#[derive(Debug, Clone)]
pub struct BucketBuilder<T> {
    offsets: Vec<usize>,
    data: Vec<T>,
    phase: Phase,
}

impl<T> Default for BucketBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BucketBuilder<T> {
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            data: Vec::new(),
            phase: Phase::Budget,
        }
    }

    /// Reset all state and pre-size the key space to `hint` keys.
    pub fn init_budget(&mut self, hint: usize) {
        self.offsets.clear();
        self.offsets.resize(hint + 1, 0);
        self.data.clear();
        self.phase = Phase::Budget;
    }

    /// Declare `n` more values for `key`, growing the key space on demand.
    ///
    /// # Panics
    ///
    /// Panics if called after [`init_storage`](Self::init_storage) or if
    /// `key` exceeds [`MAX_BUCKET_KEY`].
    pub fn add_budget(&mut self, key: usize, n: usize) {
        assert!(
            self.phase == Phase::Budget,
            "add_budget called after init_storage"
        );
        assert!(key <= MAX_BUCKET_KEY, "bucket key {key} out of range");
        if self.offsets.len() < key + 2 {
            self.offsets.resize(key + 2, 0);
        }
        self.offsets[key + 1] += n;
    }

    /// Number of keys currently addressable.
    #[inline]
    pub fn num_buckets(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Bucket contents for `key`.
    ///
    /// Only meaningful once every key has been filled.
    #[inline]
    pub fn bucket(&self, key: usize) -> &[T] {
        &self.data[self.offsets[key]..self.offsets[key + 1]]
    }

    /// Disjoint mutable segments, one per key, in key order.
    pub fn buckets_mut(&mut self) -> Vec<&mut [T]> {
        let mut out = Vec::with_capacity(self.num_buckets());
        let mut rest = self.data.as_mut_slice();
        for w in self.offsets.windows(2) {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(w[1] - w[0]);
            out.push(head);
            rest = tail;
        }
        out
    }

    /// Consume the builder, returning `(offsets, data)`.
    pub fn finish(self) -> (Vec<usize>, Vec<T>) {
        (self.offsets, self.data)
    }
}

impl<T: Default + Clone> BucketBuilder<T> {
    /// Turn budgets into start offsets and allocate the flat storage.
    pub fn init_storage(&mut self) {
        assert!(self.phase == Phase::Budget, "init_storage called twice");
        let mut start = 0;
        for slot in self.offsets.iter_mut().skip(1) {
            let len = *slot;
            *slot = start;
            start += len;
        }
        self.data.clear();
        self.data.resize(start, T::default());
        self.phase = Phase::Fill;
    }

    /// Write `value` at the next free position of `key`'s bucket.
    #[inline]
    pub fn push_elem(&mut self, key: usize, value: T) {
        debug_assert!(self.phase == Phase::Fill, "push_elem before init_storage");
        let cursor = &mut self.offsets[key + 1];
        self.data[*cursor] = value;
        *cursor += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_follow_budget_and_push_order() {
        let mut b = BucketBuilder::<(u32, char)>::new();
        b.init_budget(1);
        let pairs = [(3usize, 'a'), (1, 'b'), (3, 'c'), (0, 'd'), (3, 'e')];
        for &(k, _) in &pairs {
            b.add_budget(k, 1);
        }
        b.init_storage();
        for (i, &(k, v)) in pairs.iter().enumerate() {
            b.push_elem(k, (i as u32, v));
        }

        assert_eq!(b.num_buckets(), 4);
        assert_eq!(b.bucket(0), &[(3, 'd')]);
        assert_eq!(b.bucket(1), &[(1, 'b')]);
        assert!(b.bucket(2).is_empty());
        assert_eq!(b.bucket(3), &[(0, 'a'), (2, 'c'), (4, 'e')]);

        let (offsets, data) = b.finish();
        assert_eq!(offsets, vec![0, 1, 2, 2, 5]);
        assert_eq!(data.len(), 5);
    }

    #[test]
    fn hint_larger_than_used_keys() {
        let mut b = BucketBuilder::<u8>::new();
        b.init_budget(8);
        b.add_budget(2, 2);
        b.init_storage();
        b.push_elem(2, 7);
        b.push_elem(2, 9);
        assert_eq!(b.num_buckets(), 8);
        assert_eq!(b.bucket(2), &[7, 9]);
        assert!(b.bucket(7).is_empty());
    }

    #[test]
    fn empty_builder() {
        let mut b = BucketBuilder::<f32>::new();
        b.init_budget(0);
        b.init_storage();
        assert_eq!(b.num_buckets(), 0);
        assert!(b.buckets_mut().is_empty());
    }

    #[test]
    fn buckets_mut_are_disjoint() {
        let mut b = BucketBuilder::<i32>::new();
        b.init_budget(0);
        b.add_budget(0, 3);
        b.add_budget(1, 2);
        b.init_storage();
        for v in [3, 1, 2] {
            b.push_elem(0, v);
        }
        for v in [9, 8] {
            b.push_elem(1, v);
        }
        for seg in b.buckets_mut() {
            seg.sort_unstable();
        }
        assert_eq!(b.bucket(0), &[1, 2, 3]);
        assert_eq!(b.bucket(1), &[8, 9]);
    }

    #[test]
    #[should_panic]
    fn overfilling_last_key_panics() {
        let mut b = BucketBuilder::<u8>::new();
        b.init_budget(0);
        b.add_budget(0, 1);
        b.init_storage();
        b.push_elem(0, 1);
        b.push_elem(0, 2);
    }

    #[test]
    #[should_panic(expected = "after init_storage")]
    fn budget_after_storage_panics() {
        let mut b = BucketBuilder::<u8>::new();
        b.init_budget(0);
        b.init_storage();
        b.add_budget(0, 1);
    }
}

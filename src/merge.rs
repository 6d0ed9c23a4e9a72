// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::value::{SeqNo, Value};
use interval_heap::IntervalHeap;
use std::cmp::Reverse;

pub type BoxedIterator<'a> = Box<dyn DoubleEndedIterator<Item = crate::Result<Value>> + 'a>;

#[derive(Eq)]
struct IteratorValue(usize, Value);

impl PartialEq for IteratorValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl PartialOrd for IteratorValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Order by user key, then by seqno descending, then by iterator index,
// so the ordering is total even for equal internal keys from different sources
impl Ord for IteratorValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.1.key, Reverse(self.1.seqno), self.0).cmp(&(
            &other.1.key,
            Reverse(other.1.seqno),
            other.0,
        ))
    }
}

/// Merges multiple KV iterators into a single, sorted stream
///
/// The sub-iterators must be sorted by the internal key ordering
/// (ascending user key, descending seqno).
#[allow(clippy::module_name_repetitions)]
pub struct MergeIterator<'a> {
    iterators: Vec<BoxedIterator<'a>>,
    heap: IntervalHeap<IteratorValue>,

    evict_old_versions: bool,
    snapshot_seqno: Option<SeqNo>,

    initialized_lo: bool,
    initialized_hi: bool,
}

impl<'a> MergeIterator<'a> {
    /// Initializes a new merge iterator
    #[must_use]
    pub fn new(iterators: Vec<BoxedIterator<'a>>) -> Self {
        let heap = IntervalHeap::with_capacity(iterators.len());

        Self {
            iterators,
            heap,
            evict_old_versions: false,
            snapshot_seqno: None,
            initialized_lo: false,
            initialized_hi: false,
        }
    }

    /// Evict old versions of each key by skipping over them
    ///
    /// Tombstones shadow older versions of the same key either way.
    #[must_use]
    pub fn evict_old_versions(mut self, v: bool) -> Self {
        self.evict_old_versions = v;
        self
    }

    /// Only yields entries that are visible to the given snapshot seqno
    ///
    /// An entry is visible if its seqno is strictly lower than the snapshot seqno.
    #[must_use]
    pub fn snapshot_seqno(mut self, seqno: SeqNo) -> Self {
        self.snapshot_seqno = Some(seqno);
        self
    }

    fn is_visible(&self, value: &Value) -> bool {
        match self.snapshot_seqno {
            Some(seqno) => value.seqno < seqno,
            None => true,
        }
    }

    fn advance_iter(&mut self, idx: usize) -> crate::Result<()> {
        #[allow(clippy::expect_used)]
        let iterator = self.iterators.get_mut(idx).expect("iterator should exist");

        if let Some(value) = iterator.next() {
            self.heap.push(IteratorValue(idx, value?));
        }

        Ok(())
    }

    fn advance_iter_backwards(&mut self, idx: usize) -> crate::Result<()> {
        #[allow(clippy::expect_used)]
        let iterator = self.iterators.get_mut(idx).expect("iterator should exist");

        if let Some(value) = iterator.next_back() {
            self.heap.push(IteratorValue(idx, value?));
        }

        Ok(())
    }

    fn push_next(&mut self) -> crate::Result<()> {
        for idx in 0..self.iterators.len() {
            self.advance_iter(idx)?;
        }
        self.initialized_lo = true;
        Ok(())
    }

    fn push_next_back(&mut self) -> crate::Result<()> {
        for idx in 0..self.iterators.len() {
            self.advance_iter_backwards(idx)?;
        }
        self.initialized_hi = true;
        Ok(())
    }
}

impl<'a> Iterator for MergeIterator<'a> {
    type Item = crate::Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.initialized_lo {
            fail_iter!(self.push_next());
        }

        loop {
            let head = self.heap.pop_min()?;
            fail_iter!(self.advance_iter(head.0));

            if !self.is_visible(&head.1) {
                // This version is invisible to the snapshot;
                // an older version of the same key may still be visible
                continue;
            }

            if self.evict_old_versions {
                // Remove all older versions of the same key.
                // This includes everything a tombstone shadows.
                // Every remaining same-key entry in the heap (and in the
                // sources' unseen tails) has a lower seqno than `head`.
                while let Some(next) = self.heap.pop_min() {
                    if next.1.key == head.1.key {
                        fail_iter!(self.advance_iter(next.0));
                    } else {
                        self.heap.push(next);
                        break;
                    }
                }
            }

            return Some(Ok(head.1));
        }
    }
}

impl<'a> DoubleEndedIterator for MergeIterator<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if !self.initialized_hi {
            fail_iter!(self.push_next_back());
        }

        loop {
            let tail = self.heap.pop_max()?;
            fail_iter!(self.advance_iter_backwards(tail.0));

            if !self.evict_old_versions {
                if self.is_visible(&tail.1) {
                    return Some(Ok(tail.1));
                }
                continue;
            }

            // Iterating backwards, the oldest version of a key is seen first,
            // so same-key entries are drained while keeping the newest visible one
            let key = tail.1.key.clone();
            let mut candidate = self.is_visible(&tail.1).then_some(tail.1);

            while let Some(next) = self.heap.pop_max() {
                if next.1.key == key {
                    fail_iter!(self.advance_iter_backwards(next.0));

                    if self.is_visible(&next.1) {
                        candidate = Some(next.1);
                    }
                } else {
                    self.heap.push(next);
                    break;
                }
            }

            if let Some(value) = candidate {
                return Some(Ok(value));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::value::ValueType;
    use test_log::test;

    macro_rules! value {
        ($key:expr, $value:expr, $seqno:expr) => {
            Value::new($key.as_bytes(), $value.as_bytes(), $seqno, ValueType::Value)
        };
    }

    macro_rules! tombstone {
        ($key:expr, $seqno:expr) => {
            Value::new_tombstone($key.as_bytes(), $seqno)
        };
    }

    fn boxed(values: Vec<Value>) -> BoxedIterator<'static> {
        Box::new(values.into_iter().map(Ok))
    }

    fn collect(iter: MergeIterator) -> Vec<Value> {
        iter.collect::<crate::Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn merge_simple() {
        let a = boxed(vec![value!("a", "old", 1), value!("c", "old", 1)]);
        let b = boxed(vec![value!("b", "old", 1)]);

        let merged = collect(MergeIterator::new(vec![a, b]));

        assert_eq!(3, merged.len());
        assert_eq!(b"a", &*merged[0].key);
        assert_eq!(b"b", &*merged[1].key);
        assert_eq!(b"c", &*merged[2].key);
    }

    #[test]
    fn merge_evict_old_versions() {
        let a = boxed(vec![value!("a", "old", 1)]);
        let b = boxed(vec![value!("a", "new", 2)]);

        let merged = collect(MergeIterator::new(vec![a, b]).evict_old_versions(true));

        assert_eq!(1, merged.len());
        assert_eq!(b"new", &*merged[0].value);
        assert_eq!(2, merged[0].seqno);
    }

    #[test]
    fn merge_tombstone_shadowing() {
        let a = boxed(vec![value!("a", "old", 1)]);
        let b = boxed(vec![tombstone!("a", 2)]);

        let merged = collect(MergeIterator::new(vec![a, b]).evict_old_versions(true));

        // The tombstone is yielded; older versions are shadowed
        assert_eq!(1, merged.len());
        assert!(merged[0].is_tombstone());
    }

    #[test]
    fn merge_keeps_all_versions_without_eviction() {
        let a = boxed(vec![value!("a", "old", 1)]);
        let b = boxed(vec![tombstone!("a", 2)]);

        let merged = collect(MergeIterator::new(vec![a, b]));

        // Without version eviction, everything is emitted
        // (needed for snapshot-preserving compactions)
        assert_eq!(2, merged.len());
        assert!(merged[0].is_tombstone());
        assert_eq!(b"old", &*merged[1].value);
    }

    #[test]
    fn merge_snapshot_filter() {
        let a = boxed(vec![value!("a", "old", 1)]);
        let b = boxed(vec![value!("a", "new", 5)]);

        let merged = collect(
            MergeIterator::new(vec![a, b])
                .evict_old_versions(true)
                .snapshot_seqno(5),
        );

        // seqno 5 is invisible to snapshot 5, so the old version is seen
        assert_eq!(1, merged.len());
        assert_eq!(b"old", &*merged[0].value);
    }

    #[test]
    fn merge_snapshot_filter_all_invisible() {
        let a = boxed(vec![value!("a", "new", 5)]);

        let merged = collect(
            MergeIterator::new(vec![a])
                .evict_old_versions(true)
                .snapshot_seqno(1),
        );

        assert!(merged.is_empty());
    }

    #[test]
    fn merge_reverse() {
        let a = boxed(vec![value!("a", "old", 1), value!("b", "old", 1)]);
        let b = boxed(vec![value!("b", "new", 2), value!("c", "new", 2)]);

        let iter = MergeIterator::new(vec![a, b]).evict_old_versions(true);
        let merged = iter.rev().collect::<crate::Result<Vec<_>>>().unwrap();

        assert_eq!(3, merged.len());
        assert_eq!(b"c", &*merged[0].key);
        assert_eq!(b"b", &*merged[1].key);
        assert_eq!(b"new", &*merged[1].value);
        assert_eq!(b"a", &*merged[2].key);
    }

    #[test]
    fn merge_reverse_snapshot() {
        let a = boxed(vec![value!("a", "old", 1)]);
        let b = boxed(vec![value!("a", "new", 5)]);

        let iter = MergeIterator::new(vec![a, b])
            .evict_old_versions(true)
            .snapshot_seqno(2);
        let merged = iter.rev().collect::<crate::Result<Vec<_>>>().unwrap();

        // The newer version is invisible and must not shadow the old one
        assert_eq!(1, merged.len());
        assert_eq!(b"old", &*merged[0].value);
    }

    #[test]
    fn merge_multiple_versions_one_source() {
        let a = boxed(vec![
            value!("a", "v3", 3),
            value!("a", "v2", 2),
            value!("a", "v1", 1),
            value!("b", "v1", 1),
        ]);

        let merged = collect(MergeIterator::new(vec![a]).evict_old_versions(true));

        assert_eq!(2, merged.len());
        assert_eq!(b"v3", &*merged[0].value);
        assert_eq!(b"v1", &*merged[1].value);
    }
}

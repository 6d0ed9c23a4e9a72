// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    memtable::MemTable,
    merge::{BoxedIterator, MergeIterator},
    segment::Segment,
    tree_inner::SealedMemtables,
    value::{ParsedInternalKey, SeqNo, UserKey, ValueType},
    KvPair,
};
use std::ops::Bound;
use std::sync::{Arc, RwLockReadGuard};

/// Read guards over the memtables, held for the lifetime of an iterator,
/// so the memtables cannot be rotated away mid-scan
pub struct MemTableGuard<'a> {
    pub(crate) active: RwLockReadGuard<'a, MemTable>,
    pub(crate) sealed: RwLockReadGuard<'a, SealedMemtables>,
}

/// A range query over the whole tree: active memtable, sealed memtables
/// and all overlapping segments, merged
pub struct Range<'a> {
    guard: MemTableGuard<'a>,
    bounds: (Bound<UserKey>, Bound<UserKey>),
    segments: Vec<Arc<Segment>>,
    seqno: Option<SeqNo>,
}

impl<'a> Range<'a> {
    pub(crate) fn new(
        guard: MemTableGuard<'a>,
        bounds: (Bound<UserKey>, Bound<UserKey>),
        segments: Vec<Arc<Segment>>,
        seqno: Option<SeqNo>,
    ) -> Self {
        Self {
            guard,
            bounds,
            segments,
            seqno,
        }
    }
}

/// Maps user key bounds to internal key bounds
///
/// For the lower bound, the highest possible seqno is used, because for one
/// user key, the entry with the highest seqno is sorted first; the upper
/// bound conversely uses the lowest possible seqno.
pub(crate) fn internal_key_bounds(
    bounds: &(Bound<UserKey>, Bound<UserKey>),
) -> (Bound<ParsedInternalKey>, Bound<ParsedInternalKey>) {
    let lo = match &bounds.0 {
        Bound::Included(key) => Bound::Included(ParsedInternalKey::new(
            key.clone(),
            SeqNo::MAX,
            ValueType::Tombstone,
        )),
        Bound::Excluded(key) => Bound::Excluded(ParsedInternalKey::new(
            key.clone(),
            0,
            ValueType::Value,
        )),
        Bound::Unbounded => Bound::Unbounded,
    };

    let hi = match &bounds.1 {
        Bound::Included(key) => {
            Bound::Included(ParsedInternalKey::new(key.clone(), 0, ValueType::Value))
        }
        Bound::Excluded(key) => Bound::Excluded(ParsedInternalKey::new(
            key.clone(),
            SeqNo::MAX,
            ValueType::Tombstone,
        )),
        Bound::Unbounded => Bound::Unbounded,
    };

    (lo, hi)
}

pub struct RangeIterator<'a> {
    iter: BoxedIterator<'a>,
}

impl<'a> RangeIterator<'a> {
    fn new(lock: &'a Range<'a>) -> Self {
        let range = internal_key_bounds(&lock.bounds);

        let mut iters: Vec<BoxedIterator<'a>> = Vec::with_capacity(lock.segments.len() + 2);

        for segment in &lock.segments {
            iters.push(Box::new(segment.range(lock.bounds.clone())));
        }

        for (_, memtable) in lock.guard.sealed.iter() {
            iters.push(Box::new(memtable.range(range.clone()).map(Ok)));
        }

        iters.push(Box::new(lock.guard.active.range(range).map(Ok)));

        let mut merged = MergeIterator::new(iters).evict_old_versions(true);

        if let Some(seqno) = lock.seqno {
            merged = merged.snapshot_seqno(seqno);
        }

        Self {
            iter: Box::new(merged),
        }
    }
}

impl<'a> Iterator for RangeIterator<'a> {
    type Item = crate::Result<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let value = fail_iter!(self.iter.next()?);

            if value.is_tombstone() {
                continue;
            }

            return Some(Ok((value.key, value.value)));
        }
    }
}

impl<'a> DoubleEndedIterator for RangeIterator<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            let value = fail_iter!(self.iter.next_back()?);

            if value.is_tombstone() {
                continue;
            }

            return Some(Ok((value.key, value.value)));
        }
    }
}

impl<'a> IntoIterator for &'a Range<'a> {
    type IntoIter = RangeIterator<'a>;
    type Item = <Self::IntoIter as Iterator>::Item;

    fn into_iter(self) -> Self::IntoIter {
        RangeIterator::new(self)
    }
}

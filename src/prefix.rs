// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    merge::{BoxedIterator, MergeIterator},
    range::{internal_key_bounds, MemTableGuard},
    segment::Segment,
    value::{SeqNo, UserKey},
    KvPair,
};
use std::ops::Bound;
use std::sync::Arc;

/// A prefix query over the whole tree: active memtable, sealed memtables
/// and all segments that may contain the prefix, merged
pub struct Prefix<'a> {
    guard: MemTableGuard<'a>,
    prefix: UserKey,
    segments: Vec<Arc<Segment>>,
    seqno: Option<SeqNo>,
}

impl<'a> Prefix<'a> {
    pub(crate) fn new(
        guard: MemTableGuard<'a>,
        prefix: UserKey,
        segments: Vec<Arc<Segment>>,
        seqno: Option<SeqNo>,
    ) -> Self {
        Self {
            guard,
            prefix,
            segments,
            seqno,
        }
    }
}

pub struct PrefixIterator<'a> {
    iter: BoxedIterator<'a>,
}

impl<'a> PrefixIterator<'a> {
    fn new(lock: &'a Prefix<'a>) -> Self {
        // The memtables are bounded by [prefix, prefix upper bound)
        let upper_bound = match crate::key_range::prefix_upper_bound(&lock.prefix) {
            Some(key) => Bound::Excluded(key.into()),
            None => Bound::Unbounded,
        };

        let range = internal_key_bounds(&(Bound::Included(lock.prefix.clone()), upper_bound));

        let mut iters: Vec<BoxedIterator<'a>> = Vec::with_capacity(lock.segments.len() + 2);

        for segment in &lock.segments {
            iters.push(Box::new(segment.prefix(lock.prefix.clone())));
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

impl<'a> Iterator for PrefixIterator<'a> {
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

impl<'a> DoubleEndedIterator for PrefixIterator<'a> {
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

impl<'a> IntoIterator for &'a Prefix<'a> {
    type IntoIter = PrefixIterator<'a>;
    type Item = <Self::IntoIter as Iterator>::Item;

    fn into_iter(self) -> Self::IntoIter {
        PrefixIterator::new(self)
    }
}

// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::index::BlockIndex;
use super::reader::Reader;
use super::SegmentId;
use crate::{
    block_cache::BlockCache,
    descriptor_table::FileDescriptorTable,
    value::{UserKey, Value},
};
use std::ops::Bound;
use std::sync::Arc;

/// Bounded iterator over the entries of a segment
pub struct Range {
    descriptor_table: Arc<FileDescriptorTable>,
    block_index: Arc<BlockIndex>,
    segment_id: SegmentId,
    block_cache: Arc<BlockCache>,

    range: (Bound<UserKey>, Bound<UserKey>),

    iterator: Option<Reader>,
    has_error: bool,
}

impl Range {
    #[must_use]
    pub fn new(
        descriptor_table: Arc<FileDescriptorTable>,
        segment_id: SegmentId,
        block_cache: Arc<BlockCache>,
        block_index: Arc<BlockIndex>,
        range: (Bound<UserKey>, Bound<UserKey>),
    ) -> Self {
        Self {
            descriptor_table,
            segment_id,
            block_cache,
            block_index,
            range,
            iterator: None,
            has_error: false,
        }
    }

    /// Computes the start key of the block the lower bound lives in
    ///
    /// If the bound key is exactly a block boundary, the previous block is
    /// chosen as well, because newer versions of the bound key may still sit
    /// at the tail of the previous block.
    fn offset_lo(&self, key: &UserKey) -> crate::Result<Option<UserKey>> {
        Ok(match self.block_index.get_lower_bound_block_info(key)? {
            Some(handle) if handle.start_key == *key => Some(
                self.block_index
                    .get_previous_block_key(&handle.start_key)?
                    .map_or(handle.start_key, |prev| prev.start_key),
            ),
            Some(handle) => Some(handle.start_key),
            None => None,
        })
    }

    fn initialize(&mut self) -> crate::Result<()> {
        let offset_lo = match self.range.0.clone() {
            Bound::Unbounded => None,
            Bound::Included(start) | Bound::Excluded(start) => self.offset_lo(&start)?,
        };

        // The upper bound block is the one *after* the block containing the
        // end key, so backwards iteration starts early enough; out-of-range
        // entries are dropped by the bound checks below
        let offset_hi = match self.range.1.clone() {
            Bound::Unbounded => None,
            Bound::Included(end) | Bound::Excluded(end) => self
                .block_index
                .get_upper_bound_block_info(&end)?
                .map(|handle| handle.start_key),
        };

        self.iterator = Some(Reader::new(
            self.descriptor_table.clone(),
            self.segment_id.clone(),
            self.block_cache.clone(),
            self.block_index.clone(),
            offset_lo,
            offset_hi,
        ));

        Ok(())
    }
}

impl Iterator for Range {
    type Item = crate::Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_error {
            return None;
        }

        if self.iterator.is_none() {
            fail_iter!(self.initialize().inspect_err(|_| {
                self.has_error = true;
            }));
        }

        loop {
            let entry = match self.iterator.as_mut()?.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };

            match &self.range.0 {
                Bound::Included(start) => {
                    if entry.key < *start {
                        // Before the start key
                        continue;
                    }
                }
                Bound::Excluded(start) => {
                    if entry.key <= *start {
                        // Before or equal the start key
                        continue;
                    }
                }
                Bound::Unbounded => {}
            }

            match &self.range.1 {
                Bound::Included(end) => {
                    if entry.key > *end {
                        // Past the end key
                        return None;
                    }
                }
                Bound::Excluded(end) => {
                    if entry.key >= *end {
                        // Reached the end key
                        return None;
                    }
                }
                Bound::Unbounded => {}
            }

            return Some(Ok(entry));
        }
    }
}

impl DoubleEndedIterator for Range {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.has_error {
            return None;
        }

        if self.iterator.is_none() {
            fail_iter!(self.initialize().inspect_err(|_| {
                self.has_error = true;
            }));
        }

        loop {
            let entry = match self.iterator.as_mut()?.next_back()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };

            match &self.range.0 {
                Bound::Included(start) => {
                    if entry.key < *start {
                        // Past the start key (going backwards)
                        return None;
                    }
                }
                Bound::Excluded(start) => {
                    if entry.key <= *start {
                        // Reached the start key (going backwards)
                        return None;
                    }
                }
                Bound::Unbounded => {}
            }

            match &self.range.1 {
                Bound::Included(end) => {
                    if entry.key > *end {
                        // Still after the end key
                        continue;
                    }
                }
                Bound::Excluded(end) => {
                    if entry.key >= *end {
                        // Still at or after the end key
                        continue;
                    }
                }
                Bound::Unbounded => {}
            }

            return Some(Ok(entry));
        }
    }
}

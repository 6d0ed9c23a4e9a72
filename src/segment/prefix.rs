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
use std::sync::Arc;

/// Iterates over the entries of a segment that start with a given prefix
///
/// The underlying reader is bounded by the prefix's block range
/// (from the block that may contain the prefix up to the first block
/// past the prefix), so unrelated blocks are never read.
#[allow(clippy::module_name_repetitions)]
pub struct PrefixedReader {
    descriptor_table: Arc<FileDescriptorTable>,
    block_index: Arc<BlockIndex>,
    segment_id: SegmentId,
    block_cache: Arc<BlockCache>,

    prefix: UserKey,

    iterator: Option<Reader>,
    has_error: bool,
}

impl PrefixedReader {
    #[must_use]
    pub fn new<K: Into<UserKey>>(
        descriptor_table: Arc<FileDescriptorTable>,
        segment_id: SegmentId,
        block_cache: Arc<BlockCache>,
        block_index: Arc<BlockIndex>,
        prefix: K,
    ) -> Self {
        Self {
            descriptor_table,
            segment_id,
            block_cache,
            block_index,
            prefix: prefix.into(),
            iterator: None,
            has_error: false,
        }
    }

    fn initialize(&mut self) -> crate::Result<()> {
        let offset_lo = match self.block_index.get_lower_bound_block_info(&self.prefix)? {
            // The prefix itself may be a block boundary; newer versions of it
            // can still sit at the tail of the previous block
            Some(handle) if &*handle.start_key == &*self.prefix => Some(
                self.block_index
                    .get_previous_block_key(&handle.start_key)?
                    .map_or(handle.start_key, |prev| prev.start_key),
            ),
            Some(handle) => Some(handle.start_key),
            None => None,
        };

        let offset_hi = self
            .block_index
            .get_prefix_upper_bound(&self.prefix)?
            .map(|handle| handle.start_key);

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

impl Iterator for PrefixedReader {
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

            if entry.key.starts_with(&self.prefix) {
                return Some(Ok(entry));
            }

            if entry.key < self.prefix {
                // Before the prefix key space
                continue;
            }

            // Past the prefix key space
            return None;
        }
    }
}

impl DoubleEndedIterator for PrefixedReader {
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

            if entry.key.starts_with(&self.prefix) {
                return Some(Ok(entry));
            }

            if entry.key < self.prefix {
                // Past the prefix key space (going backwards)
                return None;
            }

            // Still after the prefix key space
        }
    }
}

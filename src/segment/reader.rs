// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::block::load_by_item_key;
use super::index::BlockIndex;
use super::SegmentId;
use crate::{
    block_cache::BlockCache, descriptor_table::FileDescriptorTable, value::UserKey, value::Value,
    HashMap,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// Iterates over the entries of a segment, in order
///
/// The reader holds at most two loaded blocks: one at the low end and
/// one at the high end, so memory usage is bounded by 2x block size,
/// regardless of segment size.
pub struct Reader {
    descriptor_table: Arc<FileDescriptorTable>,
    block_index: Arc<BlockIndex>,

    segment_id: SegmentId,
    block_cache: Arc<BlockCache>,

    blocks: HashMap<UserKey, VecDeque<Value>>,
    current_lo: Option<UserKey>,
    current_hi: Option<UserKey>,

    start_offset: Option<UserKey>,
    end_offset: Option<UserKey>,
    is_initialized: bool,

    has_error: bool,
}

impl Reader {
    /// Creates a new reader
    ///
    /// `start_offset` and `end_offset` are *block start keys*; the reader
    /// iterates from the block starting at `start_offset` to the block
    /// starting at `end_offset` (both inclusive). `None` means the first
    /// (resp. last) block of the segment.
    #[must_use]
    pub fn new(
        descriptor_table: Arc<FileDescriptorTable>,
        segment_id: SegmentId,
        block_cache: Arc<BlockCache>,
        block_index: Arc<BlockIndex>,
        start_offset: Option<UserKey>,
        end_offset: Option<UserKey>,
    ) -> Self {
        Self {
            descriptor_table,
            segment_id,
            block_cache,
            block_index,
            blocks: HashMap::default(),
            current_lo: None,
            current_hi: None,
            start_offset,
            end_offset,
            is_initialized: false,
            has_error: false,
        }
    }

    fn initialize(&mut self) -> crate::Result<()> {
        if let Some(offset) = self.start_offset.clone() {
            self.current_lo = Some(offset.clone());
            self.load_block(&offset)?;
        }

        if let Some(offset) = self.end_offset.clone() {
            self.current_hi = Some(offset.clone());

            if self.current_lo.as_ref() != Some(&offset) {
                self.load_block(&offset)?;
            }
        }

        self.is_initialized = true;

        Ok(())
    }

    fn load_block(&mut self, key: &UserKey) -> crate::Result<Option<()>> {
        let block = load_by_item_key(
            &self.descriptor_table,
            &self.block_index,
            &self.block_cache,
            &self.segment_id,
            key,
        )?;

        Ok(block.map(|block| {
            let items = block.items.iter().cloned().collect::<VecDeque<_>>();
            self.blocks.insert(key.clone(), items);
        }))
    }
}

impl Iterator for Reader {
    type Item = crate::Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_error {
            return None;
        }

        if !self.is_initialized {
            fail_iter!(self.initialize().inspect_err(|_| {
                self.has_error = true;
            }));
        }

        if self.current_lo.is_none() {
            let new_block_offset = fail_iter!(self.block_index.get_first_block_key());
            self.current_lo = Some(new_block_offset.start_key.clone());

            if Some(&new_block_offset.start_key) != self.current_hi.as_ref() {
                fail_iter!(self.load_block(&new_block_offset.start_key));
            }
        }

        if self.current_lo == self.current_hi {
            // We've reached the highest (last) block (bound by the hi marker)
            // Just consume from it instead
            let block = self.blocks.get_mut(self.current_lo.as_ref()?);
            return block.and_then(VecDeque::pop_front).map(Ok);
        }

        let current_lo = self.current_lo.clone()?;

        if let Some(block) = self.blocks.get_mut(&current_lo) {
            let item = block.pop_front();

            if block.is_empty() {
                // Load next block
                self.blocks.remove(&current_lo);

                if let Some(new_block_offset) =
                    fail_iter!(self.block_index.get_next_block_key(&current_lo))
                {
                    self.current_lo = Some(new_block_offset.start_key.clone());

                    if Some(&new_block_offset.start_key) != self.current_hi.as_ref() {
                        fail_iter!(self.load_block(&new_block_offset.start_key));
                    }
                }
            }

            item.map(Ok)
        } else {
            None
        }
    }
}

impl DoubleEndedIterator for Reader {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.has_error {
            return None;
        }

        if !self.is_initialized {
            fail_iter!(self.initialize().inspect_err(|_| {
                self.has_error = true;
            }));
        }

        if self.current_hi.is_none() {
            let new_block_offset = fail_iter!(self.block_index.get_last_block_key());
            self.current_hi = Some(new_block_offset.start_key.clone());

            if Some(&new_block_offset.start_key) != self.current_lo.as_ref() {
                fail_iter!(self.load_block(&new_block_offset.start_key));
            }
        }

        if self.current_hi == self.current_lo {
            // We've reached the lowest (first) block (bound by the lo marker)
            // Just consume from it instead
            let block = self.blocks.get_mut(self.current_hi.as_ref()?);
            return block.and_then(VecDeque::pop_back).map(Ok);
        }

        let current_hi = self.current_hi.clone()?;

        if let Some(block) = self.blocks.get_mut(&current_hi) {
            let item = block.pop_back();

            if block.is_empty() {
                // Load previous block
                self.blocks.remove(&current_hi);

                if let Some(new_block_offset) =
                    fail_iter!(self.block_index.get_previous_block_key(&current_hi))
                {
                    self.current_hi = Some(new_block_offset.start_key.clone());

                    if Some(&new_block_offset.start_key) != self.current_lo.as_ref() {
                        fail_iter!(self.load_block(&new_block_offset.start_key));
                    }
                }
            }

            item.map(Ok)
        } else {
            None
        }
    }
}

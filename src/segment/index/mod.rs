// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod block_handle;
pub mod top_level;
pub mod writer;

use self::block_handle::{BlockHandle, BlockHandleBlock};
use self::top_level::{BlockHandleBlockHandle, TopLevelIndex};
use crate::block_cache::BlockCache;
use crate::descriptor_table::FileDescriptorTable;
use crate::file::{BLOCKS_FILE, TOP_LEVEL_INDEX_FILE};
use crate::segment::SegmentId;
use crate::value::UserKey;
use std::path::Path;
use std::sync::Arc;

/// Allows reading index blocks - just a wrapper around a block cache
#[allow(clippy::module_name_repetitions)]
pub struct IndexBlockFetcher(Arc<BlockCache>);

impl IndexBlockFetcher {
    pub fn insert(&self, segment_id: SegmentId, key: UserKey, value: Arc<BlockHandleBlock>) {
        self.0.insert_block_handle_block(segment_id, key, value);
    }

    #[must_use]
    pub fn get(&self, segment_id: &str, key: &[u8]) -> Option<Arc<BlockHandleBlock>> {
        self.0.get_block_handle_block(segment_id, key)
    }
}

/// Index that translates item keys to data block handles
///
/// The index is only partially loaded into memory.
///
/// The top level is an in-memory sorted map of index block positions;
/// the index blocks themselves are loaded and cached on demand.
///
/// See <https://rocksdb.org/blog/2017/05/12/partitioned-index-filter.html>
pub struct BlockIndex {
    descriptor_table: Arc<FileDescriptorTable>,

    /// Segment ID
    segment_id: SegmentId,

    /// Level-0 index. Is read-only and always fully loaded.
    ///
    /// This index points to index blocks inside the level-1 index.
    top_level_index: TopLevelIndex,

    /// Level-1 index. This index is only partially loaded into memory, decreasing memory usage, compared to a fully loaded one.
    ///
    /// However to find a disk block, one layer of indirection is required:
    ///
    /// To find a reference to a data block, first the level-0 index needs to be checked,
    /// then the corresponding index block needs to be loaded, which contains the wanted data block handle.
    blocks: IndexBlockFetcher,
}

impl BlockIndex {
    /// Loads an index block from disk, or returns the cached one
    fn load_and_cache_index_block(
        &self,
        block_key: &UserKey,
        block_handle: &BlockHandleBlockHandle,
    ) -> crate::Result<Arc<BlockHandleBlock>> {
        if let Some(block) = self.blocks.get(&self.segment_id, block_key) {
            // Cache hit: Copy from block

            Ok(block)
        } else {
            // Cache miss: load from disk

            log::trace!(
                "loading index block {:?}/{block_key:?}",
                self.segment_id
            );

            let file_guard = self
                .descriptor_table
                .access(&self.segment_id)?
                .ok_or_else(|| {
                    crate::Error::MissingFile(self.segment_id.to_string().into())
                })?;

            let block = BlockHandleBlock::from_file_compressed(
                &mut *file_guard.file.lock().expect("lock is poisoned"),
                block_handle.offset,
                block_handle.size,
            )?;

            drop(file_guard);

            let block = Arc::new(block);

            self.blocks
                .insert(self.segment_id.clone(), block_key.clone(), block.clone());

            Ok(block)
        }
    }

    /// Returns the handle of the data block that may contain the latest
    /// version of the given item key
    pub fn get_latest(&self, key: &[u8]) -> crate::Result<Option<BlockHandle>> {
        self.get_lower_bound_block_info(key)
    }

    /// Returns the handle of the last data block whose start key is lower or equal the given key
    pub fn get_lower_bound_block_info(&self, key: &[u8]) -> crate::Result<Option<BlockHandle>> {
        let Some((block_key, block_handle)) = self.top_level_index.get_block_containing_item(key)
        else {
            return Ok(None);
        };

        let index_block = self.load_and_cache_index_block(block_key, block_handle)?;

        Ok(index_block.get_lower_bound_block_info(key).cloned())
    }

    /// Returns the handle of the first data block whose start key is greater than the given key
    pub fn get_upper_bound_block_info(&self, key: &[u8]) -> crate::Result<Option<BlockHandle>> {
        let Some((block_key, block_handle)) = self.top_level_index.get_block_containing_item(key)
        else {
            // The key is lower than the first block, so the upper bound is the very first block
            return self.get_first_block_key().map(Some);
        };

        let index_block = self.load_and_cache_index_block(block_key, block_handle)?;

        if let Some(next_block) = index_block.get_next_block_info(key) {
            return Ok(Some(next_block.clone()));
        }

        // The upper bound is in the next index block
        let Some((next_block_key, next_block_handle)) =
            self.top_level_index.get_next_block_handle(block_key)
        else {
            return Ok(None);
        };

        let index_block = self.load_and_cache_index_block(next_block_key, next_block_handle)?;

        Ok(index_block.items.first().cloned())
    }

    /// Returns the handle of the first data block that cannot contain keys
    /// starting with the given prefix
    pub fn get_prefix_upper_bound(&self, prefix: &[u8]) -> crate::Result<Option<BlockHandle>> {
        let Some((block_key, block_handle)) = self.top_level_index.get_prefix_upper_bound(prefix)
        else {
            return Ok(None);
        };

        let index_block = self.load_and_cache_index_block(block_key, block_handle)?;

        Ok(index_block.items.first().cloned())
    }

    /// Returns the handle of the first data block
    pub fn get_first_block_key(&self) -> crate::Result<BlockHandle> {
        let (block_key, block_handle) = self
            .top_level_index
            .get_first_block_handle()
            .ok_or_else(|| {
                crate::Error::Deserialize(crate::DeserializeError::InvalidHeader(
                    "empty top-level index",
                ))
            })?;

        let index_block = self.load_and_cache_index_block(block_key, block_handle)?;

        index_block.items.first().cloned().ok_or_else(|| {
            crate::Error::Deserialize(crate::DeserializeError::InvalidHeader("empty index block"))
        })
    }

    /// Returns the handle of the last data block
    pub fn get_last_block_key(&self) -> crate::Result<BlockHandle> {
        let (block_key, block_handle) = self
            .top_level_index
            .get_last_block_handle()
            .ok_or_else(|| {
                crate::Error::Deserialize(crate::DeserializeError::InvalidHeader(
                    "empty top-level index",
                ))
            })?;

        let index_block = self.load_and_cache_index_block(block_key, block_handle)?;

        index_block.items.last().cloned().ok_or_else(|| {
            crate::Error::Deserialize(crate::DeserializeError::InvalidHeader("empty index block"))
        })
    }

    /// Returns the handle of the data block after the block starting with the given key
    ///
    /// Used to advance a reader to its next block.
    pub fn get_next_block_key(&self, key: &[u8]) -> crate::Result<Option<BlockHandle>> {
        let Some((block_key, block_handle)) = self.top_level_index.get_block_containing_item(key)
        else {
            return Ok(None);
        };

        let index_block = self.load_and_cache_index_block(block_key, block_handle)?;

        if let Some(next_block) = index_block.get_next_block_info(key) {
            return Ok(Some(next_block.clone()));
        }

        let Some((next_block_key, next_block_handle)) =
            self.top_level_index.get_next_block_handle(block_key)
        else {
            return Ok(None);
        };

        let index_block = self.load_and_cache_index_block(next_block_key, next_block_handle)?;

        Ok(index_block.items.first().cloned())
    }

    /// Returns the handle of the data block before the block starting with the given key
    ///
    /// Used to advance a reader to its previous block.
    pub fn get_previous_block_key(&self, key: &[u8]) -> crate::Result<Option<BlockHandle>> {
        let Some((block_key, block_handle)) = self.top_level_index.get_block_containing_item(key)
        else {
            return Ok(None);
        };

        let index_block = self.load_and_cache_index_block(block_key, block_handle)?;

        if let Some(prev_block) = index_block.get_previous_block_info(key) {
            return Ok(Some(prev_block.clone()));
        }

        let Some((prev_block_key, prev_block_handle)) =
            self.top_level_index.get_previous_block_handle(block_key)
        else {
            return Ok(None);
        };

        let index_block = self.load_and_cache_index_block(prev_block_key, prev_block_handle)?;

        Ok(index_block.items.last().cloned())
    }

    /// Recovers a block index by reading the top-level index from disk
    pub fn from_file<P: AsRef<Path>>(
        segment_id: SegmentId,
        descriptor_table: Arc<FileDescriptorTable>,
        path: P,
        block_cache: Arc<BlockCache>,
    ) -> crate::Result<Self> {
        let path = path.as_ref();
        log::trace!("Reading block index from {path:?}");

        let tli_path = path.join(TOP_LEVEL_INDEX_FILE);
        if !tli_path.try_exists()? {
            return Err(crate::Error::MissingFile(tli_path));
        }

        let blocks_path = path.join(BLOCKS_FILE);
        if !blocks_path.try_exists()? {
            return Err(crate::Error::MissingFile(blocks_path));
        }

        let top_level_index = TopLevelIndex::from_file(tli_path)?;

        Ok(Self {
            descriptor_table,
            segment_id,
            top_level_index,
            blocks: IndexBlockFetcher(block_cache),
        })
    }
}

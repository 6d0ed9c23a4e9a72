// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::index::{block_handle::BlockHandle, BlockIndex};
use super::SegmentId;
use crate::{
    block_cache::BlockCache, descriptor_table::FileDescriptorTable, disk_block::DiskBlock,
    value::Value,
};
use std::sync::Arc;

/// Value blocks are the building blocks of a [`crate::Segment`]. Each block is a sorted list of [`Value`]s,
/// and stored in compressed form on disk, in sorted order.
///
/// The integrity of a block can be checked using the CRC value that is saved in it.
#[allow(clippy::module_name_repetitions)]
pub type ValueBlock = DiskBlock<Value>;

impl ValueBlock {
    /// Returns the entry with the highest seqno for the given key, if any
    #[must_use]
    pub fn get_latest(&self, key: &[u8]) -> Option<&Value> {
        let idx = self.items.partition_point(|item| &*item.key < key);

        self.items.get(idx).filter(|&item| &*item.key == key)
    }

    pub fn size(&self) -> usize {
        std::mem::size_of::<Self>() + self.items.iter().map(Value::size).sum::<usize>()
    }
}

/// Loads a data block from disk or block cache
pub fn load_by_block_handle(
    descriptor_table: &Arc<FileDescriptorTable>,
    block_cache: &Arc<BlockCache>,
    segment_id: &SegmentId,
    block_handle: &BlockHandle,
) -> crate::Result<Option<Arc<ValueBlock>>> {
    Ok(
        if let Some(block) = block_cache.get_disk_block(segment_id, &block_handle.start_key) {
            // Cache hit: Copy from block

            Some(block)
        } else {
            // Cache miss: load from disk

            log::trace!(
                "loading value block {segment_id:?}/{:?}",
                block_handle.start_key
            );

            let file_guard = descriptor_table
                .access(segment_id)?
                .ok_or_else(|| crate::Error::MissingFile(segment_id.to_string().into()))?;

            let block = ValueBlock::from_file_compressed(
                &mut *file_guard.file.lock().expect("lock is poisoned"),
                block_handle.offset,
                block_handle.size,
            )?;

            drop(file_guard);

            let block = Arc::new(block);

            block_cache.insert_disk_block(
                segment_id.clone(),
                block_handle.start_key.clone(),
                Arc::clone(&block),
            );

            Some(block)
        },
    )
}

/// Loads the data block that may contain the given item key,
/// from disk or block cache
pub fn load_by_item_key<K: AsRef<[u8]>>(
    descriptor_table: &Arc<FileDescriptorTable>,
    block_index: &BlockIndex,
    block_cache: &Arc<BlockCache>,
    segment_id: &SegmentId,
    item_key: K,
) -> crate::Result<Option<Arc<ValueBlock>>> {
    Ok(
        if let Some(block_handle) = block_index.get_latest(item_key.as_ref())? {
            load_by_block_handle(descriptor_table, block_cache, segment_id, &block_handle)?
        } else {
            None
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;
    use test_log::test;

    #[test]
    fn value_block_find_latest() {
        let items = vec![
            Value::new(*b"b", *b"b", 2, ValueType::Value),
            Value::new(*b"b", *b"b", 1, ValueType::Value),
            Value::new(*b"b", *b"b", 0, ValueType::Value),
            Value::new(*b"c", *b"c", 0, ValueType::Value),
            Value::new(*b"d", *b"d", 5, ValueType::Value),
        ];

        let block = ValueBlock {
            items: items.into_boxed_slice(),
            crc: 0,
        };

        assert_eq!(block.get_latest(b"a"), None);
        assert_eq!(
            block.get_latest(b"b"),
            Some(&Value::new(*b"b", *b"b", 2, ValueType::Value))
        );
        assert_eq!(
            block.get_latest(b"c"),
            Some(&Value::new(*b"c", *b"c", 0, ValueType::Value))
        );
        assert_eq!(
            block.get_latest(b"d"),
            Some(&Value::new(*b"d", *b"d", 5, ValueType::Value))
        );
        assert_eq!(block.get_latest(b"e"), None);
    }
}

// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::either::Either::{self, Left, Right};
use crate::segment::block::ValueBlock;
use crate::segment::index::block_handle::BlockHandleBlock;
use crate::segment::SegmentId;
use crate::value::UserKey;
use quick_cache::Weighter;
use quick_cache::{sync::Cache, Equivalent};
use std::sync::Arc;

type Item = Either<Arc<ValueBlock>, Arc<BlockHandleBlock>>;

#[derive(Copy, Clone, Debug, Eq, std::hash::Hash, PartialEq)]
enum BlockTag {
    Data,
    Index,
}

#[derive(Eq, std::hash::Hash, PartialEq)]
struct CacheKey(BlockTag, SegmentId, UserKey);

impl<'a> Equivalent<CacheKey> for (BlockTag, &'a str, &'a [u8]) {
    fn equivalent(&self, key: &CacheKey) -> bool {
        self.0 == key.0 && self.1 == &*key.1 && self.2 == &*key.2
    }
}

#[derive(Clone)]
struct BlockWeighter;

impl Weighter<CacheKey, Item> for BlockWeighter {
    fn weight(&self, _: &CacheKey, block: &Item) -> u64 {
        match block {
            Either::Left(block) => block.items.len() as u64,
            Either::Right(block) => block
                .items
                .iter()
                .map(|handle| handle.start_key.len() as u64 + 16)
                .sum(),
        }
    }
}

/// Block cache, in which blocks are cached in-memory
/// after being retrieved from disk
///
/// This speeds up consecutive queries to nearby data, improving
/// read performance for hot data.
///
/// # Examples
///
/// Sharing block cache between multiple trees
///
/// ```
/// # use talus::{Config, BlockCache};
/// # use std::sync::Arc;
/// #
/// // Provide 40 MB of cache capacity
/// let block_cache = Arc::new(BlockCache::with_capacity_bytes(40 * 1_000 * 1_000));
///
/// # let folder = tempfile::tempdir()?;
/// let tree1 = Config::new(folder).block_cache(block_cache.clone()).open()?;
/// # let folder = tempfile::tempdir()?;
/// let tree2 = Config::new(folder).block_cache(block_cache.clone()).open()?;
/// #
/// # Ok::<(), talus::Error>(())
/// ```
pub struct BlockCache {
    data: Cache<CacheKey, Item, BlockWeighter, rustc_hash::FxBuildHasher>,
    capacity: u64,
}

impl BlockCache {
    /// Creates a new block cache with roughly `n` bytes of capacity
    #[must_use]
    pub fn with_capacity_bytes(bytes: u64) -> Self {
        use quick_cache::sync::DefaultLifecycle;

        #[allow(clippy::default_trait_access)]
        let quick_cache = Cache::with(
            1_000_000,
            bytes,
            BlockWeighter,
            Default::default(),
            DefaultLifecycle::default(),
        );

        Self {
            data: quick_cache,
            capacity: bytes,
        }
    }

    /// Returns the cache capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the weight of the cached blocks
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.weight()
    }

    /// Returns the number of cached blocks
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if there are no cached blocks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[doc(hidden)]
    pub fn insert_disk_block(
        &self,
        segment_id: SegmentId,
        start_key: UserKey,
        value: Arc<ValueBlock>,
    ) {
        if self.capacity > 0 {
            self.data
                .insert(CacheKey(BlockTag::Data, segment_id, start_key), Left(value));
        }
    }

    #[doc(hidden)]
    pub fn insert_block_handle_block(
        &self,
        segment_id: SegmentId,
        start_key: UserKey,
        value: Arc<BlockHandleBlock>,
    ) {
        if self.capacity > 0 {
            self.data.insert(
                CacheKey(BlockTag::Index, segment_id, start_key),
                Right(value),
            );
        }
    }

    #[doc(hidden)]
    #[must_use]
    pub fn get_disk_block(&self, segment_id: &str, start_key: &[u8]) -> Option<Arc<ValueBlock>> {
        let key = (BlockTag::Data, segment_id, start_key);
        let item = self.data.get(&key)?;
        Some(item.left())
    }

    #[doc(hidden)]
    #[must_use]
    pub fn get_block_handle_block(
        &self,
        segment_id: &str,
        start_key: &[u8],
    ) -> Option<Arc<BlockHandleBlock>> {
        let key = (BlockTag::Index, segment_id, start_key);
        let item = self.data.get(&key)?;
        Some(item.right())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, ValueType};
    use test_log::test;

    #[test]
    fn block_cache_insert_and_get() {
        let cache = BlockCache::with_capacity_bytes(1_024 * 1_024);
        assert!(cache.is_empty());

        let block = Arc::new(ValueBlock {
            items: vec![Value::new(*b"a", *b"a", 0, ValueType::Value)].into_boxed_slice(),
            crc: 0,
        });

        cache.insert_disk_block("seg1".into(), (*b"a").into(), block);

        assert_eq!(1, cache.len());
        assert!(cache.get_disk_block("seg1", b"a").is_some());
        assert!(cache.get_disk_block("seg1", b"b").is_none());
        assert!(cache.get_disk_block("seg2", b"a").is_none());
        assert!(cache.get_block_handle_block("seg1", b"a").is_none());
    }

    #[test]
    fn block_cache_weight_bounded() {
        // Tiny budget, so most blocks are evicted again
        let cache = BlockCache::with_capacity_bytes(100);

        for i in 0u64..1_000 {
            let items = (0..10)
                .map(|j: u64| {
                    Value::new(
                        (i * 100 + j).to_be_bytes(),
                        *b"value",
                        0,
                        ValueType::Value,
                    )
                })
                .collect::<Vec<_>>();

            let block = Arc::new(ValueBlock {
                items: items.into_boxed_slice(),
                crc: 0,
            });

            cache.insert_disk_block("seg1".into(), i.to_be_bytes().into(), block);
        }

        // Total cost never exceeds the configured capacity
        assert!(cache.size() <= cache.capacity());
        assert!(cache.len() <= 10);
    }
}

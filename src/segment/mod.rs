// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod block;
pub mod index;
pub mod meta;
pub mod multi_writer;
pub mod prefix;
pub mod range;
pub mod reader;
pub mod writer;

use self::index::BlockIndex;
use self::meta::Metadata;
use self::prefix::PrefixedReader;
use self::range::Range;
use crate::{
    block_cache::BlockCache,
    descriptor_table::FileDescriptorTable,
    file::SEGMENT_METADATA_FILE,
    value::{SeqNo, UserKey, Value},
};
use std::{ops::Bound, path::Path, sync::Arc};

/// Unique segment identifier, a time-sortable base36 string
///
/// See [`crate::id::generate_segment_id`].
pub type SegmentId = Arc<str>;

/// Disk segment (a.k.a. `SSTable`, `SST`, `sorted string table`) that is located on disk
///
/// A segment is an immutable list of key-value pairs, split into compressed blocks (see [`block::ValueBlock`]).
/// The block offset and size in the file is saved in the "block index".
///
/// Deleted entries are represented by tombstones.
///
/// Segments can be merged together to remove duplicate items, reducing disk space and improving read performance.
#[doc(alias("sstable", "sst", "sorted string table"))]
pub struct Segment {
    /// Segment metadata object (will be stored in a JSON file)
    pub metadata: Metadata,

    /// Translates key (first item of a block) to block offset (address inside file) and (compressed) size
    pub(crate) block_index: Arc<BlockIndex>,

    /// Block cache
    ///
    /// Stores references to (likely) recently read blocks
    pub(crate) block_cache: Arc<BlockCache>,

    /// Descriptor table that takes care of cycling file descriptors
    pub(crate) descriptor_table: Arc<FileDescriptorTable>,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Segment:{}", self.metadata.id)
    }
}

impl Segment {
    /// Tries to recover a segment from a folder.
    pub fn recover<P: AsRef<Path>>(
        folder: P,
        block_cache: Arc<BlockCache>,
        descriptor_table: Arc<FileDescriptorTable>,
    ) -> crate::Result<Self> {
        let folder = folder.as_ref();

        let metadata_path = folder.join(SEGMENT_METADATA_FILE);
        if !metadata_path.try_exists()? {
            return Err(crate::Error::MissingFile(metadata_path));
        }

        let mut metadata = Metadata::from_disk(metadata_path)?;

        // The store folder may have been moved since the segment was written
        metadata.path = folder.into();

        let block_index = BlockIndex::from_file(
            metadata.id.clone(),
            descriptor_table.clone(),
            folder,
            block_cache.clone(),
        )?;

        Ok(Self {
            metadata,
            block_index: Arc::new(block_index),
            block_cache,
            descriptor_table,
        })
    }

    /// Retrieves an item from the segment
    ///
    /// If `seqno` is set, only entries that are visible to that
    /// snapshot seqno are considered.
    pub fn get<K: AsRef<[u8]>>(
        &self,
        key: K,
        seqno: Option<SeqNo>,
    ) -> crate::Result<Option<Value>> {
        let key = key.as_ref();

        if !self.key_range_contains(key) {
            return Ok(None);
        }

        if let Some(seqno) = seqno {
            if self.metadata.seqnos.0 >= seqno {
                // The segment only contains entries newer than the snapshot
                return Ok(None);
            }
        }

        // Walk the versions of the key, newest to oldest.
        // A reader is needed (instead of probing just one block), because the
        // newest version may be in a different block than the rest.
        let range = self.range((
            Bound::Included(key.to_vec().into()),
            Bound::Included(key.to_vec().into()),
        ));

        for item in range {
            let item = item?;

            if let Some(seqno) = seqno {
                if item.seqno >= seqno {
                    continue;
                }
            }

            return Ok(Some(item));
        }

        Ok(None)
    }

    /// Creates an iterator over the `Segment`
    #[must_use]
    #[allow(clippy::iter_without_into_iter)]
    pub fn iter(&self) -> Range {
        self.range((Bound::Unbounded, Bound::Unbounded))
    }

    /// Creates a bounded iterator over the `Segment`
    #[must_use]
    pub fn range(&self, range: (Bound<UserKey>, Bound<UserKey>)) -> Range {
        Range::new(
            self.descriptor_table.clone(),
            self.metadata.id.clone(),
            self.block_cache.clone(),
            self.block_index.clone(),
            range,
        )
    }

    /// Creates a prefixed iterator over the `Segment`
    #[must_use]
    pub fn prefix<K: Into<UserKey>>(&self, prefix: K) -> PrefixedReader {
        PrefixedReader::new(
            self.descriptor_table.clone(),
            self.metadata.id.clone(),
            self.block_cache.clone(),
            self.block_index.clone(),
            prefix,
        )
    }

    /// Returns `true` if the key is (possibly) contained in the segment's key range
    #[must_use]
    pub fn key_range_contains<K: AsRef<[u8]>>(&self, key: K) -> bool {
        self.metadata.key_range_contains(key.as_ref())
    }

    /// Checks if a key range partially or fully overlaps this segment
    #[must_use]
    pub fn check_key_range_overlap(&self, bounds: &(Bound<&[u8]>, Bound<&[u8]>)) -> bool {
        self.metadata.key_range.overlaps_with_bounds(bounds)
    }

    /// Checks if keys with the given prefix may be contained in this segment
    #[must_use]
    pub fn check_prefix_overlap(&self, prefix: &[u8]) -> bool {
        self.metadata.key_range.contains_prefix(prefix)
    }

    /// Returns the highest sequence number in the segment
    #[must_use]
    pub fn get_highest_seqno(&self) -> SeqNo {
        self.metadata.seqnos.1
    }

    /// Returns the amount of tombstone markers in the `Segment`
    #[must_use]
    pub fn tombstone_count(&self) -> u64 {
        self.metadata.tombstone_count
    }
}

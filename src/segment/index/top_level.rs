// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::block_handle::BlockHandleBlock;
use crate::serde::{Deserializable, DeserializeError, Serializable, SerializeError};
use crate::value::UserKey;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    collections::BTreeMap,
    io::{Read, Write},
    path::Path,
};

/// A reference to a block handle block on disk
///
/// Stores the block's position and size in bytes
/// The start key is stored in the in-memory search tree, see [`TopLevelIndex`] below.
///
/// # Disk representation
///
/// \[offset; 8 bytes] - \[size; 4 bytes]
//
// NOTE: Yes the name is absolutely ridiculous, but it's not the
// same as a regular BlockHandle (to a data block), because the
// start key is not required (it's already in the index, see below)
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockHandleBlockHandle {
    pub offset: u64,
    pub size: u32,
}

impl Serializable for BlockHandleBlockHandle {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), SerializeError> {
        writer.write_u64::<BigEndian>(self.offset)?;
        writer.write_u32::<BigEndian>(self.size)?;
        Ok(())
    }
}

impl Deserializable for BlockHandleBlockHandle {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DeserializeError> {
        let offset = reader.read_u64::<BigEndian>()?;
        let size = reader.read_u32::<BigEndian>()?;
        Ok(Self { offset, size })
    }
}

/// The block index stores references to the positions of blocks on a file and their size
///
/// __________________
/// |                |
/// |     BLOCK0     |
/// |________________| <- 'G': 0x0
/// |                |
/// |     BLOCK1     |
/// |________________| <- 'M': 0x...
/// |                |
/// |     BLOCK2     |
/// |________________| <- 'Z': 0x...
///
/// The block information can be accessed by key.
/// Because the blocks are sorted, any entries not covered by the index (it is sparse) can be
/// found by finding the highest block that has a lower or equal end key than the searched key.
/// In the diagram above, searching for 'J' yields the block starting with 'G'.
/// 'J' must be in that block, because the next block starts with 'M').
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct TopLevelIndex {
    pub(crate) data: BTreeMap<UserKey, BlockHandleBlockHandle>,
}

impl TopLevelIndex {
    /// Creates a top-level index from a sorted map
    #[must_use]
    pub fn new(data: BTreeMap<UserKey, BlockHandleBlockHandle>) -> Self {
        Self { data }
    }

    /// Loads a top-level index from disk
    ///
    /// The index file is a single compressed block of block handles.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        log::trace!("Reading top-level index from {path:?}");

        let file_size = std::fs::metadata(path)?.len();

        let mut file = std::fs::File::open(path)?;

        // NOTE: The index file is tiny compared to data blocks, way below 4 GB
        #[allow(clippy::cast_possible_truncation)]
        let block = BlockHandleBlock::from_file_compressed(&mut file, 0, file_size as u32)?;

        let mut data = BTreeMap::new();

        for item in block.items.iter() {
            data.insert(
                item.start_key.clone(),
                BlockHandleBlockHandle {
                    offset: item.offset,
                    size: item.size,
                },
            );
        }

        Ok(Self::new(data))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the block containing the given item, if any
    #[must_use]
    pub fn get_block_containing_item(
        &self,
        key: &[u8],
    ) -> Option<(&UserKey, &BlockHandleBlockHandle)> {
        use std::ops::Bound::{Included, Unbounded};

        self.data.range::<[u8], _>((Unbounded, Included(key))).next_back()
    }

    /// Returns the first block that cannot contain keys starting with the prefix
    ///
    /// This bounds prefix scans.
    #[must_use]
    pub fn get_prefix_upper_bound(
        &self,
        prefix: &[u8],
    ) -> Option<(&UserKey, &BlockHandleBlockHandle)> {
        use std::ops::Bound::{Included, Unbounded};

        self.data
            .range::<[u8], _>((Included(prefix), Unbounded))
            .find(|(block_key, _)| !block_key.starts_with(prefix))
    }

    /// Returns the first block
    #[must_use]
    pub fn get_first_block_handle(&self) -> Option<(&UserKey, &BlockHandleBlockHandle)> {
        self.data.iter().next()
    }

    /// Returns the last block
    #[must_use]
    pub fn get_last_block_handle(&self) -> Option<(&UserKey, &BlockHandleBlockHandle)> {
        self.data.iter().next_back()
    }

    /// Returns the block before the block starting with the given key, if any
    #[must_use]
    pub fn get_previous_block_handle(
        &self,
        key: &[u8],
    ) -> Option<(&UserKey, &BlockHandleBlockHandle)> {
        use std::ops::Bound::{Excluded, Unbounded};

        self.data.range::<[u8], _>((Unbounded, Excluded(key))).next_back()
    }

    /// Returns the block after the block starting with the given key, if any
    #[must_use]
    pub fn get_next_block_handle(&self, key: &[u8]) -> Option<(&UserKey, &BlockHandleBlockHandle)> {
        use std::ops::Bound::{Excluded, Unbounded};

        self.data.range::<[u8], _>((Excluded(key), Unbounded)).next()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use test_log::test;

    fn index(keys: &[&str]) -> TopLevelIndex {
        let mut data = BTreeMap::new();

        for (idx, key) in keys.iter().enumerate() {
            data.insert(
                UserKey::from(key.as_bytes()),
                BlockHandleBlockHandle {
                    offset: idx as u64 * 100,
                    size: 100,
                },
            );
        }

        TopLevelIndex::new(data)
    }

    #[test]
    fn tli_get_block_containing_item() {
        let index = index(&["c", "g", "m"]);

        assert!(index.get_block_containing_item(b"a").is_none());
        assert_eq!(
            b"c",
            &**index.get_block_containing_item(b"c").unwrap().0
        );
        assert_eq!(
            b"c",
            &**index.get_block_containing_item(b"e").unwrap().0
        );
        assert_eq!(
            b"m",
            &**index.get_block_containing_item(b"z").unwrap().0
        );
    }

    #[test]
    fn tli_next_previous() {
        let index = index(&["c", "g", "m"]);

        assert_eq!(b"g", &**index.get_next_block_handle(b"c").unwrap().0);
        assert!(index.get_next_block_handle(b"m").is_none());

        assert_eq!(b"g", &**index.get_previous_block_handle(b"m").unwrap().0);
        assert!(index.get_previous_block_handle(b"c").is_none());
    }

    #[test]
    fn tli_prefix_upper_bound() {
        let index = index(&["ab1", "ab5", "ac0", "b"]);

        assert_eq!(b"ac0", &**index.get_prefix_upper_bound(b"ab").unwrap().0);
        assert_eq!(b"b", &**index.get_prefix_upper_bound(b"ac").unwrap().0);
        assert!(index.get_prefix_upper_bound(b"b").is_none());
    }

    #[test]
    fn tli_endpoints() {
        let index = index(&["c", "g", "m"]);

        assert_eq!(b"c", &**index.get_first_block_handle().unwrap().0);
        assert_eq!(b"m", &**index.get_last_block_handle().unwrap().0);
    }
}

// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::disk_block::DiskBlock;
use crate::serde::{Deserializable, DeserializeError, Serializable, SerializeError};
use crate::value::UserKey;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Points to a data block on disk
///
/// # Disk representation
///
/// \[offset; 8 bytes] - \[size; 4 bytes] - \[key length; 2 bytes] - \[key; N bytes]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockHandle {
    /// Key of the first item in the block
    pub start_key: UserKey,

    /// Position of the block in the file
    pub offset: u64,

    /// Size of the block in bytes
    pub size: u32,
}

impl Serializable for BlockHandle {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), SerializeError> {
        writer.write_u64::<BigEndian>(self.offset)?;
        writer.write_u32::<BigEndian>(self.size)?;

        // NOTE: Truncation is okay and actually needed
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u16::<BigEndian>(self.start_key.len() as u16)?;
        writer.write_all(&self.start_key)?;

        Ok(())
    }
}

impl Deserializable for BlockHandle {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DeserializeError> {
        let offset = reader.read_u64::<BigEndian>()?;
        let size = reader.read_u32::<BigEndian>()?;

        let key_len = reader.read_u16::<BigEndian>()?;
        let mut start_key = vec![0; key_len.into()];
        reader.read_exact(&mut start_key)?;

        Ok(Self {
            start_key: start_key.into(),
            offset,
            size,
        })
    }
}

/// A block of block handles, the second level of the block index
#[allow(clippy::module_name_repetitions)]
pub type BlockHandleBlock = DiskBlock<BlockHandle>;

impl BlockHandleBlock {
    /// Finds the last block that could contain the given item
    pub(crate) fn get_lower_bound_block_info(&self, key: &[u8]) -> Option<&BlockHandle> {
        let idx = self.items.partition_point(|x| &*x.start_key <= key);

        if idx == 0 {
            None
        } else {
            self.items.get(idx - 1)
        }
    }

    /// Finds the first block that starts after the given key
    pub(crate) fn get_next_block_info(&self, key: &[u8]) -> Option<&BlockHandle> {
        let idx = self.items.partition_point(|x| &*x.start_key <= key);
        self.items.get(idx)
    }

    /// Finds the last block that starts before the given key
    pub(crate) fn get_previous_block_info(&self, key: &[u8]) -> Option<&BlockHandle> {
        let idx = self.items.partition_point(|x| &*x.start_key < key);

        if idx == 0 {
            None
        } else {
            self.items.get(idx - 1)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use test_log::test;

    fn block(keys: &[&str]) -> BlockHandleBlock {
        let items = keys
            .iter()
            .enumerate()
            .map(|(idx, key)| BlockHandle {
                start_key: key.as_bytes().into(),
                offset: idx as u64 * 100,
                size: 100,
            })
            .collect::<Vec<_>>();

        DiskBlock {
            items: items.into_boxed_slice(),
            crc: 0,
        }
    }

    #[test]
    fn block_handle_round_trip() -> crate::Result<()> {
        let handle = BlockHandle {
            start_key: (*b"some_key").into(),
            offset: 1_234,
            size: 56,
        };

        let mut bytes = Vec::new();
        handle.serialize(&mut bytes)?;

        let read_back = BlockHandle::deserialize(&mut &bytes[..])?;
        assert_eq!(handle, read_back);

        Ok(())
    }

    #[test]
    fn block_handle_lower_bound() {
        let block = block(&["c", "g", "m"]);

        assert!(block.get_lower_bound_block_info(b"a").is_none());
        assert_eq!(
            b"c",
            &*block.get_lower_bound_block_info(b"c").unwrap().start_key
        );
        assert_eq!(
            b"c",
            &*block.get_lower_bound_block_info(b"f").unwrap().start_key
        );
        assert_eq!(
            b"m",
            &*block.get_lower_bound_block_info(b"z").unwrap().start_key
        );
    }

    #[test]
    fn block_handle_next_prev() {
        let block = block(&["c", "g", "m"]);

        assert_eq!(b"g", &*block.get_next_block_info(b"c").unwrap().start_key);
        assert_eq!(b"c", &*block.get_next_block_info(b"a").unwrap().start_key);
        assert!(block.get_next_block_info(b"m").is_none());

        assert_eq!(
            b"g",
            &*block.get_previous_block_info(b"m").unwrap().start_key
        );
        assert!(block.get_previous_block_info(b"c").is_none());
    }
}

// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::serde::{Deserializable, DeserializeError, Serializable, SerializeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// Contains the items of a block after decompressing & deserializing.
///
/// The integrity of a block can be checked using the CRC value that is saved in it.
#[derive(Clone, Debug)]
pub struct DiskBlock<T: Clone + Serializable + Deserializable> {
    pub items: Box<[T]>,
    pub crc: u32,
}

impl<T: Clone + Serializable + Deserializable> DiskBlock<T> {
    /// Calculates the CRC from a list of values
    ///
    /// The CRC covers the item count and the serialized items,
    /// so both a corrupted header and corrupted payload are caught.
    pub fn create_crc(items: &[T]) -> Result<u32, SerializeError> {
        let mut hasher = crc32fast::Hasher::new();

        // NOTE: Truncation is okay, because a block cannot possibly contain 4 billion items
        #[allow(clippy::cast_possible_truncation)]
        hasher.update(&(items.len() as u32).to_be_bytes());

        for value in items {
            let mut bytes = Vec::new();
            value.serialize(&mut bytes)?;
            hasher.update(&bytes);
        }

        Ok(hasher.finalize())
    }

    /// Reads a compressed block from a reader, decompresses it,
    /// parses it and verifies its integrity
    pub fn from_reader_compressed<R: Read>(reader: &mut R, size: u32) -> crate::Result<Self> {
        let mut bytes = vec![0u8; size as usize];
        reader.read_exact(&mut bytes)?;

        let bytes = lz4_flex::decompress_size_prepended(&bytes)
            .map_err(|_| crate::Error::Decompress)?;

        let mut bytes = Cursor::new(bytes);
        let block = Self::deserialize(&mut bytes)?;

        let got = Self::create_crc(&block.items)?;
        if got != block.crc {
            return Err(crate::Error::CorruptBlock((got, block.crc)));
        }

        Ok(block)
    }

    /// Seeks to the block's position in a file, then reads and parses it
    pub fn from_file_compressed<F: Read + Seek>(
        file: &mut F,
        offset: u64,
        size: u32,
    ) -> crate::Result<Self> {
        file.seek(SeekFrom::Start(offset))?;
        Self::from_reader_compressed(file, size)
    }

    /// Serializes the block and compresses it using LZ4
    pub fn to_bytes_compressed(&self) -> Result<Vec<u8>, SerializeError> {
        let mut bytes = Vec::with_capacity(u16::MAX.into());
        self.serialize(&mut bytes)?;
        Ok(lz4_flex::compress_prepend_size(&bytes))
    }
}

impl<T: Clone + Serializable + Deserializable> Serializable for DiskBlock<T> {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), SerializeError> {
        writer.write_u32::<BigEndian>(self.crc)?;

        // NOTE: Truncation is okay, because a block cannot possibly contain 4 billion items
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<BigEndian>(self.items.len() as u32)?;

        for value in self.items.iter() {
            value.serialize(writer)?;
        }

        Ok(())
    }
}

impl<T: Clone + Serializable + Deserializable> Deserializable for DiskBlock<T> {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DeserializeError> {
        let crc = reader.read_u32::<BigEndian>()?;
        let item_count = reader.read_u32::<BigEndian>()? as usize;

        let mut items = Vec::with_capacity(item_count);
        for _ in 0..item_count {
            items.push(T::deserialize(reader)?);
        }

        Ok(Self {
            items: items.into_boxed_slice(),
            crc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, ValueType};
    use test_log::test;

    #[test]
    fn disk_block_round_trip() -> crate::Result<()> {
        let items = vec![
            Value::new(*b"key-1", *b"value-1", 1, ValueType::Value),
            Value::new(*b"key-2", *b"value-2", 2, ValueType::Value),
            Value::new(*b"key-3", vec![], 3, ValueType::Tombstone),
        ];

        let block = DiskBlock {
            crc: DiskBlock::create_crc(&items)?,
            items: items.into_boxed_slice(),
        };

        let bytes = block.to_bytes_compressed()?;

        // NOTE: Truncation is okay in tests
        #[allow(clippy::cast_possible_truncation)]
        let read_back = DiskBlock::<Value>::from_reader_compressed(
            &mut Cursor::new(&bytes),
            bytes.len() as u32,
        )?;

        assert_eq!(block.items, read_back.items);
        assert_eq!(block.crc, read_back.crc);

        Ok(())
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn disk_block_corrupt_payload() -> crate::Result<()> {
        let items = vec![
            Value::new(*b"abc", *b"def", 4, ValueType::Value),
            Value::new(*b"ghi", *b"jkl", 5, ValueType::Value),
        ];

        let block = DiskBlock {
            crc: DiskBlock::create_crc(&items)?,
            items: items.into_boxed_slice(),
        };

        let mut raw = Vec::new();
        block.serialize(&mut raw)?;

        // Flip a byte inside the serialized payload, past the header
        *raw.last_mut().unwrap() ^= 0xFF;

        let bytes = lz4_flex::compress_prepend_size(&raw);

        #[allow(clippy::cast_possible_truncation)]
        let result =
            DiskBlock::<Value>::from_reader_compressed(&mut Cursor::new(&bytes), bytes.len() as u32);

        assert!(matches!(result, Err(crate::Error::CorruptBlock(_))));

        Ok(())
    }

    #[test]
    fn disk_block_garbage_bytes() {
        let bytes = b"definitely not an lz4 frame";

        #[allow(clippy::cast_possible_truncation)]
        let result = DiskBlock::<Value>::from_reader_compressed(
            &mut Cursor::new(bytes.as_slice()),
            bytes.len() as u32,
        );

        assert!(matches!(result, Err(crate::Error::Decompress)));
    }
}

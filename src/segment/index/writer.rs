// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::block_handle::{BlockHandle, BlockHandleBlock};
use crate::disk_block::DiskBlock;
use crate::file::{BLOCKS_FILE, INDEX_BLOCKS_FILE, TOP_LEVEL_INDEX_FILE};
use crate::value::UserKey;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

fn concat_files<P: AsRef<Path>>(src_path: P, dest_path: P) -> crate::Result<u64> {
    let mut src = File::open(src_path)?;

    let dest = OpenOptions::new().append(true).open(dest_path)?;
    let mut dest = BufWriter::new(dest);

    let bytes = std::io::copy(&mut src, &mut dest)?;
    dest.flush()?;

    Ok(bytes)
}

/// Writes the secondary index blocks and the top-level index of a segment
///
/// Block handles are buffered into index blocks like data is buffered into
/// data blocks; the sealed index blocks go into a scratch file that is
/// concatenated onto the blocks file on finish.
pub struct Writer {
    path: PathBuf,
    block_size: u32,

    /// Position inside the index block region
    file_pos: u64,

    block_writer: BufWriter<File>,
    block_counter: u32,
    block_chunk: Vec<BlockHandle>,
    index_chunk: Vec<BlockHandle>,

    /// Number of written index blocks
    pub block_count: u32,
}

impl Writer {
    pub fn new<P: AsRef<Path>>(path: P, block_size: u32) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let block_writer = File::create(path.join(INDEX_BLOCKS_FILE))?;
        let block_writer = BufWriter::with_capacity(u16::MAX.into(), block_writer);

        Ok(Self {
            path,
            block_size,
            file_pos: 0,
            block_writer,
            block_counter: 0,
            block_chunk: Vec::with_capacity(100),
            index_chunk: Vec::with_capacity(100),
            block_count: 0,
        })
    }

    fn write_block(&mut self) -> crate::Result<()> {
        debug_assert!(!self.block_chunk.is_empty());

        let block = BlockHandleBlock {
            crc: DiskBlock::create_crc(&self.block_chunk)?,
            items: std::mem::take(&mut self.block_chunk).into_boxed_slice(),
        };

        let bytes = block.to_bytes_compressed()?;
        self.block_writer.write_all(&bytes)?;

        // NOTE: Blocks are never bigger than 4 GB anyway,
        // so it's fine to just truncate it
        #[allow(clippy::cast_possible_truncation)]
        let bytes_written = bytes.len() as u32;

        // Expect is fine, because the chunk is not empty
        #[allow(clippy::expect_used)]
        let first = block.items.first().expect("chunk should not be empty");

        self.index_chunk.push(BlockHandle {
            start_key: first.start_key.clone(),
            offset: self.file_pos,
            size: bytes_written,
        });

        log::trace!(
            "Written index block @ {} ({bytes_written} bytes)",
            self.file_pos,
        );

        self.block_counter = 0;
        self.block_count += 1;
        self.file_pos += u64::from(bytes_written);

        Ok(())
    }

    /// Registers a data block handle in the index
    pub fn register_block(
        &mut self,
        start_key: UserKey,
        offset: u64,
        size: u32,
    ) -> crate::Result<()> {
        // NOTE: Truncation is okay and actually needed
        #[allow(clippy::cast_possible_truncation)]
        let block_handle_size = (start_key.len() + std::mem::size_of::<BlockHandle>()) as u32;

        self.block_chunk.push(BlockHandle {
            start_key,
            offset,
            size,
        });

        self.block_counter += block_handle_size;

        if self.block_counter >= self.block_size {
            self.write_block()?;
        }

        Ok(())
    }

    fn write_top_level_index(&mut self, data_file_size: u64) -> crate::Result<()> {
        // The index blocks are appended to the data blocks,
        // so their offsets need to be shifted by the data file size
        for handle in &mut self.index_chunk {
            handle.offset += data_file_size;
        }

        let block = BlockHandleBlock {
            crc: DiskBlock::create_crc(&self.index_chunk)?,
            items: std::mem::take(&mut self.index_chunk).into_boxed_slice(),
        };

        let bytes = block.to_bytes_compressed()?;

        let file = File::create(self.path.join(TOP_LEVEL_INDEX_FILE))?;
        let mut index_writer = BufWriter::new(file);
        index_writer.write_all(&bytes)?;
        index_writer.flush()?;
        index_writer.get_mut().sync_all()?;

        log::trace!("Written top-level index, with {} pointers", block.items.len());

        Ok(())
    }

    /// Finishes the index
    ///
    /// Appends the index blocks onto the blocks file and writes the
    /// top-level index with adjusted offsets.
    ///
    /// Returns the size of the index block region in bytes.
    pub fn finish(&mut self, data_file_size: u64) -> crate::Result<u64> {
        if self.block_counter > 0 {
            self.write_block()?;
        }

        self.block_writer.flush()?;
        self.block_writer.get_mut().sync_all()?;

        concat_files(
            self.path.join(INDEX_BLOCKS_FILE),
            self.path.join(BLOCKS_FILE),
        )?;

        self.write_top_level_index(data_file_size)?;

        std::fs::remove_file(self.path.join(INDEX_BLOCKS_FILE))?;

        Ok(self.file_pos)
    }
}

// Serialization sanity check lives here because the writer
// is the only place creating top-level index files
#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::index::top_level::TopLevelIndex;
    use test_log::test;

    #[test]
    fn index_writer_top_level_round_trip() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;

        std::fs::File::create(folder.path().join(BLOCKS_FILE))?;

        let mut writer = Writer::new(folder.path(), 4_096)?;

        writer.register_block((*b"a").into(), 0, 100)?;
        writer.register_block((*b"m").into(), 100, 100)?;
        writer.register_block((*b"z").into(), 200, 100)?;

        let index_size = writer.finish(300)?;
        assert!(index_size > 0);

        let tli = TopLevelIndex::from_file(folder.path().join(TOP_LEVEL_INDEX_FILE))?;
        assert_eq!(1, tli.len());

        let (key, handle) = tli.get_first_block_handle().expect("should exist");
        assert_eq!(b"a", &**key);
        assert_eq!(300, handle.offset);

        Ok(())
    }
}

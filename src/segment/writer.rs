// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::index::writer::Writer as IndexWriter;
use crate::disk_block::DiskBlock;
use crate::file::{fsync_directory, BLOCKS_FILE};
use crate::segment::block::ValueBlock;
use crate::value::{ParsedInternalKey, SeqNo, UserKey, Value};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

pub struct Options {
    pub path: PathBuf,
    pub evict_tombstones: bool,
    pub block_size: u32,
}

/// Serializes and compresses values into blocks and writes them to disk
///
/// Also takes care of creating the block index.
///
/// Values must be written in ascending order of their internal key;
/// out-of-order input is an invariant violation and panics.
pub struct Writer {
    pub opts: Options,

    block_writer: BufWriter<File>,
    index_writer: IndexWriter,
    chunk: Vec<Value>,

    pub block_count: u32,
    pub item_count: usize,
    pub file_pos: u64,

    /// Size of the index block region, set on finish
    pub index_size: u64,

    /// Only takes user data into account
    pub uncompressed_size: u64,

    pub first_key: Option<UserKey>,
    pub last_key: Option<UserKey>,

    pub key_count: usize,
    pub tombstone_count: usize,
    pub chunk_size: usize,

    pub lowest_seqno: SeqNo,
    pub highest_seqno: SeqNo,

    last_internal_key: Option<ParsedInternalKey>,
}

impl Writer {
    /// Sets up a new writer at the given segment folder
    pub fn new(opts: Options) -> crate::Result<Self> {
        std::fs::create_dir_all(&opts.path)?;

        let block_writer = File::create(opts.path.join(BLOCKS_FILE))?;
        let block_writer = BufWriter::with_capacity(512_000, block_writer);

        let index_writer = IndexWriter::new(&opts.path, opts.block_size)?;

        Ok(Self {
            opts,

            block_writer,
            index_writer,
            chunk: Vec::with_capacity(1_000),

            block_count: 0,
            item_count: 0,
            file_pos: 0,
            index_size: 0,
            uncompressed_size: 0,

            first_key: None,
            last_key: None,
            key_count: 0,
            chunk_size: 0,
            tombstone_count: 0,

            lowest_seqno: SeqNo::MAX,
            highest_seqno: 0,

            last_internal_key: None,
        })
    }

    /// Writes a compressed block to disk
    ///
    /// This is triggered when a `Writer::write` causes the buffer to grow to the configured `block_size`
    fn write_block(&mut self) -> crate::Result<()> {
        debug_assert!(!self.chunk.is_empty());

        let uncompressed_chunk_size = self
            .chunk
            .iter()
            .map(|item| item.size() as u64)
            .sum::<u64>();

        self.uncompressed_size += uncompressed_chunk_size;

        let block = ValueBlock {
            crc: DiskBlock::create_crc(&self.chunk)?,
            items: std::mem::take(&mut self.chunk).into_boxed_slice(),
        };

        // Compress using LZ4
        let bytes = block.to_bytes_compressed()?;
        self.block_writer.write_all(&bytes)?;

        // NOTE: Blocks are never bigger than 4 GB anyway,
        // so it's fine to just truncate it
        #[allow(clippy::cast_possible_truncation)]
        let bytes_written = bytes.len() as u32;

        // Expect is fine, because the chunk is not empty
        #[allow(clippy::expect_used)]
        let first = block.items.first().expect("chunk should not be empty");

        self.index_writer
            .register_block(first.key.clone(), self.file_pos, bytes_written)?;

        log::trace!(
            "Written data block @ {} ({} bytes, uncompressed: {} bytes)",
            self.file_pos,
            bytes_written,
            uncompressed_chunk_size
        );

        self.item_count += block.items.len();
        self.block_count += 1;
        self.file_pos += u64::from(bytes_written);
        self.chunk = Vec::with_capacity(1_000);

        Ok(())
    }

    /// Writes an item
    ///
    /// # Panics
    ///
    /// Panics if the item's internal key is lower than the previously written one.
    pub fn write(&mut self, item: Value) -> crate::Result<()> {
        let internal_key = item.parsed_key();

        if let Some(last) = &self.last_internal_key {
            assert!(
                *last <= internal_key,
                "writer received out-of-order key: {last} > {internal_key}",
            );
        }
        self.last_internal_key = Some(internal_key);

        if item.is_tombstone() {
            if self.opts.evict_tombstones {
                return Ok(());
            }

            self.tombstone_count += 1;
        }

        let item_key = item.key.clone();
        let seqno = item.seqno;

        self.chunk_size += item.size();
        self.chunk.push(item);

        if self.chunk_size >= self.opts.block_size as usize {
            self.write_block()?;
            self.chunk_size = 0;
        }

        if self.last_key.as_ref() != Some(&item_key) {
            self.key_count += 1;
        }

        if self.first_key.is_none() {
            self.first_key = Some(item_key.clone());
        }
        self.last_key = Some(item_key);

        if self.lowest_seqno > seqno {
            self.lowest_seqno = seqno;
        }

        if self.highest_seqno < seqno {
            self.highest_seqno = seqno;
        }

        Ok(())
    }

    /// Finishes the segment, making sure all data is written durably
    ///
    /// If no items were written, the (empty) segment folder is removed instead.
    pub fn finish(&mut self) -> crate::Result<()> {
        if !self.chunk.is_empty() {
            self.write_block()?;
        }

        // No items written! Just delete segment folder and return nothing
        if self.item_count == 0 {
            log::debug!(
                "Deleting empty segment folder ({}) because no items were written",
                self.opts.path.display()
            );
            std::fs::remove_dir_all(&self.opts.path)?;
            return Ok(());
        }

        self.block_writer.flush()?;

        self.index_size = self.index_writer.finish(self.file_pos)?;

        self.block_writer.get_mut().sync_all()?;

        // fsync folder
        fsync_directory(&self.opts.path)?;

        log::debug!(
            "Written {} items in {} blocks into new segment file, written {} MB",
            self.item_count,
            self.block_count,
            self.file_pos / 1_024 / 1_024
        );

        Ok(())
    }
}

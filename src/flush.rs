// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    block_cache::BlockCache,
    descriptor_table::FileDescriptorTable,
    file::BLOCKS_FILE,
    memtable::MemTable,
    segment::{index::BlockIndex, meta::Metadata, writer::Options, writer::Writer, Segment, SegmentId},
};
use std::{path::PathBuf, sync::Arc};

/// Flush options
pub struct FlushOptions {
    /// [`MemTable`] to flush
    pub memtable: Arc<MemTable>,

    /// Unique segment ID
    pub segment_id: SegmentId,

    /// Base folder of segments
    ///
    /// The segment will be stored in `{folder}/{segment_id}`
    pub folder: PathBuf,

    /// Block size in bytes
    pub block_size: u32,

    /// Block cache
    pub block_cache: Arc<BlockCache>,

    /// Descriptor table
    pub descriptor_table: Arc<FileDescriptorTable>,
}

/// Flushes a memtable, creating a segment in the given folder
pub fn flush_to_segment(opts: FlushOptions) -> crate::Result<Segment> {
    let segment_folder = opts.folder.join(&*opts.segment_id);
    log::debug!("Flushing segment to {}", segment_folder.display());

    let mut segment_writer = Writer::new(Options {
        path: segment_folder.clone(),
        evict_tombstones: false,
        block_size: opts.block_size,
    })?;

    for value in opts.memtable.iter() {
        segment_writer.write(value)?;
    }

    segment_writer.finish()?;

    let metadata = Metadata::from_writer(opts.segment_id.clone(), &segment_writer);
    metadata.write_to_file()?;

    log::debug!("Finalized segment write at {}", segment_folder.display());

    opts.descriptor_table
        .insert(segment_folder.join(BLOCKS_FILE), opts.segment_id.clone());

    let block_index = BlockIndex::from_file(
        opts.segment_id,
        opts.descriptor_table.clone(),
        &segment_folder,
        opts.block_cache.clone(),
    )?;

    let created_segment = Segment {
        metadata,
        block_index: Arc::new(block_index),
        block_cache: opts.block_cache,
        descriptor_table: opts.descriptor_table,
    };

    log::debug!("Flushed segment to {}", segment_folder.display());

    Ok(created_segment)
}

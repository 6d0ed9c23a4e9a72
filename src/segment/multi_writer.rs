// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::meta::Metadata;
use super::writer::{Options, Writer};
use super::SegmentId;
use crate::id::generate_segment_id;
use crate::value::Value;

/// Like [`Writer`] but will rotate to a new segment, once a segment grows larger than `target_size`
///
/// This results in a sorted "run" of segments
pub struct MultiWriter {
    /// Target size of segments in bytes
    ///
    /// If a segment reaches the target size, a new one is started,
    /// resulting in a sorted "run" of segments
    pub target_size: u64,

    pub opts: Options,
    created_items: Vec<Metadata>,

    pub current_segment_id: SegmentId,
    pub writer: Writer,
}

impl MultiWriter {
    /// Sets up a new `MultiWriter` at the given segments folder
    pub fn new(target_size: u64, opts: Options) -> crate::Result<Self> {
        let segment_id = generate_segment_id();

        let writer = Writer::new(Options {
            path: opts.path.join(&*segment_id),
            evict_tombstones: opts.evict_tombstones,
            block_size: opts.block_size,
        })?;

        Ok(Self {
            target_size,
            created_items: Vec::with_capacity(10),
            opts,
            current_segment_id: segment_id,
            writer,
        })
    }

    /// Flushes the current writer, stores its metadata, and sets up a new writer for the next segment
    fn rotate(&mut self) -> crate::Result<()> {
        log::debug!("Rotating segment writer");

        // Flush segment, and start new one
        self.writer.finish()?;

        let new_segment_id = generate_segment_id();

        let new_writer = Writer::new(Options {
            path: self.opts.path.join(&*new_segment_id),
            evict_tombstones: self.opts.evict_tombstones,
            block_size: self.opts.block_size,
        })?;

        let old_writer = std::mem::replace(&mut self.writer, new_writer);
        let old_segment_id = std::mem::replace(&mut self.current_segment_id, new_segment_id);

        if old_writer.item_count > 0 {
            let metadata = Metadata::from_writer(old_segment_id, &old_writer);
            self.created_items.push(metadata);
        }

        Ok(())
    }

    /// Writes an item
    pub fn write(&mut self, item: Value) -> crate::Result<()> {
        self.writer.write(item)?;

        if self.writer.file_pos >= self.target_size {
            self.rotate()?;
        }

        Ok(())
    }

    /// Finishes the last segment, making sure all data is written durably
    ///
    /// Returns the metadata of created segments
    pub fn finish(mut self) -> crate::Result<Vec<Metadata>> {
        // Finish writer and consume it
        // Don't use `rotate` because that will start a new writer, creating unneeded, empty segments
        self.writer.finish()?;

        if self.writer.item_count > 0 {
            let metadata = Metadata::from_writer(self.current_segment_id.clone(), &self.writer);
            self.created_items.push(metadata);
        }

        Ok(self.created_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;
    use test_log::test;

    #[test]
    fn multi_writer_rotates() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;

        let mut writer = MultiWriter::new(
            10 * 1_024,
            Options {
                path: folder.path().into(),
                evict_tombstones: false,
                block_size: 1_024,
            },
        )?;

        for i in 0u64..10_000 {
            writer.write(Value::new(
                i.to_be_bytes(),
                *b"12345678",
                0,
                ValueType::Value,
            ))?;
        }

        let created = writer.finish()?;

        assert!(created.len() > 1);
        assert_eq!(10_000, created.iter().map(|meta| meta.item_count).sum::<u64>());

        // Segments form a sorted, disjoint run
        for window in created.windows(2) {
            assert!(window[0].key_range.max() < window[1].key_range.min());
        }

        Ok(())
    }
}

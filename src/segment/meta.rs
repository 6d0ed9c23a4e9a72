// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::writer::Writer;
use crate::{
    file::{fsync_directory, rewrite_atomic, SEGMENT_METADATA_FILE},
    key_range::KeyRange,
    segment::SegmentId,
    time::unix_timestamp,
    value::SeqNo,
    version::Version,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Compression algorithm used to compress the blocks of a segment
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    /// LZ4 block compression
    Lz4,
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lz4")
    }
}

/// Segment metadata, stored as `meta.json` inside the segment folder
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Data format version
    pub version: Version,

    /// Segment ID
    pub id: SegmentId,

    /// Path of the segment folder
    pub path: PathBuf,

    /// Creation time as unix timestamp (in µs)
    pub created_at: u128,

    /// Number of KV-pairs in the segment
    ///
    /// This may include tombstones and multiple versions of the same key
    pub item_count: u64,

    /// Number of unique keys in the segment
    ///
    /// This may include tombstones
    pub key_count: u64,

    /// Block size (uncompressed)
    pub block_size: u32,

    /// Number of written data blocks
    pub block_count: u32,

    /// What type of compression is used
    pub compression: CompressionType,

    /// Compressed size in bytes (on disk)
    pub file_size: u64,

    /// True size in bytes (if no compression were used)
    pub uncompressed_size: u64,

    /// Key range
    pub key_range: KeyRange,

    /// Sequence number range
    pub seqnos: (SeqNo, SeqNo),

    /// Number of tombstones
    pub tombstone_count: u64,
}

impl Metadata {
    /// Consumes a writer and its metadata to create the segment metadata
    ///
    /// The writer should not be empty.
    pub fn from_writer(id: SegmentId, writer: &Writer) -> Self {
        Self {
            id,
            version: Version::V0,
            path: writer.opts.path.clone(),

            // NOTE: Using seconds is not granular enough
            // But because millis already returns u128, might as well use micros :)
            created_at: unix_timestamp().as_micros(),

            block_count: writer.block_count,
            block_size: writer.opts.block_size,
            compression: CompressionType::Lz4,
            file_size: writer.file_pos + writer.index_size,
            uncompressed_size: writer.uncompressed_size,
            item_count: writer.item_count as u64,
            key_count: writer.key_count as u64,

            // NOTE: from_writer is never called on an empty writer
            #[allow(clippy::expect_used)]
            key_range: KeyRange::new((
                writer
                    .first_key
                    .clone()
                    .expect("should have written at least 1 item"),
                writer
                    .last_key
                    .clone()
                    .expect("should have written at least 1 item"),
            )),

            seqnos: (writer.lowest_seqno, writer.highest_seqno),

            tombstone_count: writer.tombstone_count as u64,
        }
    }

    /// Returns `true` if the key is (possibly) contained in the segment's key range
    #[must_use]
    pub fn key_range_contains(&self, key: &[u8]) -> bool {
        self.key_range.contains_key(key)
    }

    /// Writes the metadata to the segment folder, atomically
    pub fn write_to_file(&self) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        rewrite_atomic(self.path.join(SEGMENT_METADATA_FILE), json.as_bytes())?;

        fsync_directory(&self.path)?;

        Ok(())
    }

    /// Reads and parses a segment metadata file
    pub fn from_disk<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file_content = std::fs::read(path)?;
        let metadata = serde_json::from_slice(&file_content)?;
        Ok(metadata)
    }
}

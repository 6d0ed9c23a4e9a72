// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod level;

pub use level::Level;

use crate::{
    file::rewrite_atomic,
    segment::{Segment, SegmentId},
};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

pub type HiddenSet = HashSet<SegmentId>;

/// Represents the levels of a log-structured merge tree
pub struct Levels {
    path: PathBuf,

    /// Resolves segment IDs to segment objects
    segments: crate::HashMap<SegmentId, Arc<Segment>>,

    #[doc(hidden)]
    pub levels: Vec<Level>,

    /// Set of segment IDs that are masked
    ///
    /// While consuming segments (because of compaction) they will not appear in the list of segments
    /// as to not cause conflicts between multiple compaction threads (compacting the same segments)
    hidden_set: HiddenSet,
}

impl Levels {
    pub(crate) fn create_new<P: AsRef<Path>>(level_count: u8, path: P) -> crate::Result<Self> {
        assert!(level_count > 0, "level_count should be >= 1");

        let levels = (0..level_count).map(|_| Level::default()).collect();

        let mut manifest = Self {
            path: path.as_ref().to_path_buf(),
            segments: crate::HashMap::default(),
            levels,
            hidden_set: HashSet::with_capacity(10),
        };
        manifest.write_to_disk()?;

        Ok(manifest)
    }

    pub(crate) fn is_compacting(&self) -> bool {
        !self.hidden_set.is_empty()
    }

    /// Reads the level manifest, returning all segment IDs in it
    pub(crate) fn recover_ids<P: AsRef<Path>>(path: P) -> crate::Result<Vec<SegmentId>> {
        let manifest = std::fs::read(path)?;
        let levels: Vec<Level> = serde_json::from_slice(&manifest)?;

        Ok(levels.into_iter().flat_map(|level| level.0).collect())
    }

    pub(crate) fn recover<P: AsRef<Path>>(
        path: P,
        segments: Vec<Arc<Segment>>,
    ) -> crate::Result<Self> {
        let manifest = std::fs::read(&path)?;
        let levels: Vec<Level> = serde_json::from_slice(&manifest)?;

        let segments = segments
            .into_iter()
            .map(|segment| (segment.metadata.id.clone(), segment))
            .collect();

        Ok(Self {
            segments,
            levels,
            hidden_set: HashSet::with_capacity(10),
            path: path.as_ref().to_path_buf(),
        })
    }

    pub(crate) fn write_to_disk(&mut self) -> crate::Result<()> {
        log::trace!("Writing level manifest to {:?}", self.path);

        let serialized = serde_json::to_string_pretty(&self.levels)?;

        // NOTE: Compaction threads don't have concurrent access to the level manifest
        // because it is behind a write lock
        // *However*, the file still needs to be rewritten atomically, because
        // the system could crash at any moment, so
        //
        // a) truncating is not an option, because for a short moment, the file is empty
        // b) just overwriting corrupts the file content
        rewrite_atomic(&self.path, serialized.as_bytes())?;

        Ok(())
    }

    /// Adds a segment to level 0
    pub(crate) fn add(&mut self, segment: Arc<Segment>) {
        self.insert_into_level(0, segment);
    }

    /// Sorts all levels from newest to oldest
    ///
    /// This will make segments with highest seqno get checked first,
    /// so if there are two versions of an item, the fresher one is seen first:
    ///
    /// segment a   segment b
    /// [key:asd:2] [key:asd:1]
    ///
    /// point read ----------->
    pub(crate) fn sort_levels(&mut self) {
        let segments = &self.segments;

        for level in &mut self.levels {
            level.0.sort_by(|a, b| {
                let seqno_a = segments.get(a).map_or(0, |x| x.get_highest_seqno());
                let seqno_b = segments.get(b).map_or(0, |x| x.get_highest_seqno());
                seqno_b.cmp(&seqno_a)
            });
        }
    }

    pub(crate) fn insert_into_level(&mut self, level_no: u8, segment: Arc<Segment>) {
        let last_level_index = self.last_level_index();
        let index = level_no.clamp(0, last_level_index);

        #[allow(clippy::expect_used)]
        let level = self
            .levels
            .get_mut(usize::from(index))
            .expect("level should exist");

        level.insert(segment.metadata.id.clone());
        self.segments.insert(segment.metadata.id.clone(), segment);

        self.sort_levels();
    }

    pub(crate) fn remove(&mut self, segment_id: &str) {
        for level in &mut self.levels {
            level.remove(segment_id);
        }

        self.segments.remove(segment_id);
    }

    /// Returns `true` if there are no segments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the amount of levels in the tree
    #[must_use]
    pub fn depth(&self) -> u8 {
        // NOTE: Level count is u8
        #[allow(clippy::cast_possible_truncation)]
        let len = self.levels.len() as u8;
        len
    }

    #[must_use]
    pub fn last_level_index(&self) -> u8 {
        self.depth() - 1
    }

    /// Returns the amount of segments in the first (shallowest) level
    #[must_use]
    pub fn first_level_segment_count(&self) -> usize {
        self.levels.first().map_or(0, |level| level.len())
    }

    /// Returns the amount of segments, summed over all levels
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.iter().map(|level| level.len()).sum()
    }

    /// Returns the (compressed) size of all segments
    #[must_use]
    pub fn size(&self) -> u64 {
        self.segments
            .values()
            .map(|segment| segment.metadata.file_size)
            .sum()
    }

    /// Returns `true` if the manifest contains the given segment ID
    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.levels.iter().any(|level| level.contains_id(id))
    }

    #[must_use]
    pub fn list_ids(&self) -> Vec<SegmentId> {
        self.levels
            .iter()
            .flat_map(|level| level.ids().iter().cloned())
            .collect()
    }

    pub(crate) fn get_segment(&self, id: &str) -> Option<Arc<Segment>> {
        self.segments.get(id).cloned()
    }

    /// Returns a view into the levels, resolved to segment objects,
    /// hiding all segments that currently are being compacted
    #[must_use]
    pub fn resolved_view(&self) -> Vec<Vec<Arc<Segment>>> {
        let mut output = Vec::with_capacity(self.levels.len());

        for level in &self.levels {
            output.push(
                level
                    .ids()
                    .iter()
                    .filter(|id| !self.hidden_set.contains(*id))
                    .filter_map(|id| self.segments.get(id).cloned())
                    .collect(),
            );
        }

        output
    }

    /// Returns a view into the levels, resolved to segment objects,
    /// including hidden segments
    ///
    /// Used by the read path: segments being compacted remain readable
    /// until the compaction commits.
    #[must_use]
    pub fn full_view(&self) -> Vec<Vec<Arc<Segment>>> {
        let mut output = Vec::with_capacity(self.levels.len());

        for level in &self.levels {
            output.push(
                level
                    .ids()
                    .iter()
                    .filter_map(|id| self.segments.get(id).cloned())
                    .collect(),
            );
        }

        output
    }

    #[doc(hidden)]
    #[must_use]
    pub fn get_all_segments_flattened(&self) -> Vec<Arc<Segment>> {
        self.levels
            .iter()
            .flat_map(|level| level.ids())
            .filter_map(|id| self.segments.get(id).cloned())
            .collect()
    }

    pub(crate) fn show_segments(&mut self, keys: &[SegmentId]) {
        for key in keys {
            self.hidden_set.remove(key);
        }
    }

    pub(crate) fn hide_segments(&mut self, keys: &[SegmentId]) {
        for key in keys {
            self.hidden_set.insert(key.clone());
        }
    }
}

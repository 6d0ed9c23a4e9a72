// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    file::{BLOCKS_FILE, SEGMENTS_FOLDER},
    merge::{BoxedIterator, MergeIterator},
    segment::{
        index::BlockIndex, meta::Metadata, multi_writer::MultiWriter, writer::Options, Segment,
        SegmentId,
    },
    Tree,
};
use std::sync::Arc;

/// Rebuilds the given segments into fewer, larger segments in the target level
///
/// The input segments are hidden (so no other compaction consumes them), but
/// stay readable until the new segments are swapped in; the swap is persisted
/// by atomically rewriting the level manifest. Only then are the input
/// segment folders deleted.
struct CompactionPayload {
    segment_ids: Vec<SegmentId>,
    target_size: u64,
    dest_level: u8,
}

/// Major compaction: rebuild *all* segments into the last level
///
/// Old versions are dropped; tombstones are dropped too, unless an open
/// snapshot may still need them.
pub fn major_compaction(tree: &Tree, target_size: u64) -> crate::Result<()> {
    log::info!("Starting major compaction");

    let payload = {
        let mut levels = tree.levels.write().expect("lock is poisoned");

        // Only segments that are not already being compacted are candidates
        let segment_ids: Vec<SegmentId> = levels
            .resolved_view()
            .iter()
            .flatten()
            .map(|segment| segment.metadata.id.clone())
            .collect();

        levels.hide_segments(&segment_ids);

        CompactionPayload {
            segment_ids,
            target_size,
            dest_level: levels.last_level_index(),
        }
    };

    if payload.segment_ids.is_empty() {
        log::debug!("Nothing to compact");
        return Ok(());
    }

    let result = do_compaction(tree, &payload);

    if result.is_err() {
        // Leave the tree as it was
        let mut levels = tree.levels.write().expect("lock is poisoned");
        levels.show_segments(&payload.segment_ids);
    }

    result
}

fn do_compaction(tree: &Tree, payload: &CompactionPayload) -> crate::Result<()> {
    let segments = {
        let levels = tree.levels.read().expect("lock is poisoned");

        payload
            .segment_ids
            .iter()
            .filter_map(|id| levels.get_segment(id))
            .collect::<Vec<_>>()
    };

    log::debug!(
        "Compacting {} segments into level {}",
        segments.len(),
        payload.dest_level
    );

    // Old versions and tombstones can only be dropped
    // if no snapshot may still need them
    let gc_allowed = !tree.open_snapshots.has_open_snapshots();
    let evict_tombstones = gc_allowed;

    let iters: Vec<BoxedIterator<'_>> = segments
        .iter()
        .map(|segment| Box::new(segment.iter()) as BoxedIterator<'_>)
        .collect();

    let merged = MergeIterator::new(iters).evict_old_versions(gc_allowed);

    let mut writer = MultiWriter::new(
        payload.target_size,
        Options {
            path: tree.config.path.join(SEGMENTS_FOLDER),
            evict_tombstones,
            block_size: tree.config.block_size,
        },
    )?;

    for item in merged {
        writer.write(item?)?;
    }

    let created_metadata = writer.finish()?;

    let mut created_segments = Vec::with_capacity(created_metadata.len());

    for metadata in created_metadata {
        metadata.write_to_file()?;

        created_segments.push(Arc::new(recover_created_segment(tree, metadata)?));
    }

    // Swap the new segments in
    {
        let mut levels = tree.levels.write().expect("lock is poisoned");

        for segment in created_segments {
            levels.insert_into_level(payload.dest_level, segment);
        }

        for id in &payload.segment_ids {
            levels.remove(id);
        }

        levels.show_segments(&payload.segment_ids);

        levels.write_to_disk()?;
    }

    // The manifest no longer references the old segments,
    // their files can go now
    for id in &payload.segment_ids {
        tree.descriptor_table.remove(id);

        let folder = tree.config.path.join(SEGMENTS_FOLDER).join(&**id);

        if let Err(e) = std::fs::remove_dir_all(&folder) {
            log::error!("Failed to remove old segment folder {}: {e}", folder.display());
        }
    }

    log::info!("Major compaction done");

    Ok(())
}

fn recover_created_segment(tree: &Tree, metadata: Metadata) -> crate::Result<Segment> {
    tree.descriptor_table
        .insert(metadata.path.join(BLOCKS_FILE), metadata.id.clone());

    let block_index = BlockIndex::from_file(
        metadata.id.clone(),
        tree.descriptor_table.clone(),
        &metadata.path,
        tree.block_cache.clone(),
    )?;

    Ok(Segment {
        metadata,
        block_index: Arc::new(block_index),
        block_cache: tree.block_cache.clone(),
        descriptor_table: tree.descriptor_table.clone(),
    })
}

// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    block_cache::BlockCache,
    config::{Config, PersistedConfig},
    descriptor_table::FileDescriptorTable,
    file::LEVELS_MANIFEST_FILE,
    levels::Levels,
    memtable::MemTable,
    segment::SegmentId,
    seqno::SequenceNumberCounter,
    snapshot::SnapshotCounter,
    stop_signal::StopSignal,
    wal::Wal,
};
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

/// Frozen memtables, keyed by the segment ID they will be flushed to
pub type SealedMemtables = BTreeMap<SegmentId, Arc<MemTable>>;

pub struct TreeInner {
    /// Active memtable that is being written to
    pub(crate) active_memtable: Arc<RwLock<MemTable>>,

    /// Frozen memtables that are being flushed
    pub(crate) sealed_memtables: Arc<RwLock<SealedMemtables>>,

    /// Level manifest
    #[doc(hidden)]
    pub levels: Arc<RwLock<Levels>>,

    /// Write-ahead log
    pub(crate) wal: Arc<Wal>,

    /// Tree configuration
    pub config: PersistedConfig,

    /// Block cache
    pub block_cache: Arc<BlockCache>,

    /// File descriptor cache table
    pub descriptor_table: Arc<FileDescriptorTable>,

    /// Sequence number counter that orders all writes
    pub seqno: SequenceNumberCounter,

    /// Keeps track of open snapshots
    pub(crate) open_snapshots: SnapshotCounter,

    /// Setting the signal to `true` stops the WAL sync thread.
    pub(crate) stop_signal: StopSignal,
}

impl TreeInner {
    pub(crate) fn create_new(config: Config, wal: Wal) -> crate::Result<Self> {
        let levels = Levels::create_new(
            config.inner.level_count,
            config.inner.path.join(LEVELS_MANIFEST_FILE),
        )?;

        Ok(Self {
            config: config.inner,
            block_cache: config.block_cache,
            descriptor_table: config.descriptor_table,
            active_memtable: Arc::default(),
            sealed_memtables: Arc::default(),
            levels: Arc::new(RwLock::new(levels)),
            wal: Arc::new(wal),
            seqno: SequenceNumberCounter::default(),
            open_snapshots: SnapshotCounter::default(),
            stop_signal: StopSignal::default(),
        })
    }
}

impl Drop for TreeInner {
    fn drop(&mut self) {
        log::debug!("Dropping TreeInner");

        log::trace!("Sending stop signal to WAL sync thread");
        self.stop_signal.send();
    }
}

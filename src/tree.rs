// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    compaction,
    config::{Config, PersistedConfig},
    descriptor_table::FileDescriptorTable,
    file::{
        fsync_directory, BLOCKS_FILE, CONFIG_FILE, LEVELS_MANIFEST_FILE, LSM_MARKER,
        SEGMENTS_FOLDER,
    },
    flush::{flush_to_segment, FlushOptions},
    id::generate_segment_id,
    levels::Levels,
    memtable::MemTable,
    prefix::Prefix,
    range::{MemTableGuard, Range},
    segment::{Segment, SegmentId},
    seqno::SequenceNumberCounter,
    snapshot::Snapshot,
    tree_inner::TreeInner,
    value::{SeqNo, UserKey, UserValue, Value, ValueType},
    version::Version,
    wal::Wal,
    BlockCache,
};
use std::{
    ops::{Bound, RangeBounds},
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

/// How often the background thread fsyncs the WAL
const WAL_SYNC_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1_000);

fn ignore_tombstone_value(item: Value) -> Option<Value> {
    if item.is_tombstone() {
        None
    } else {
        Some(item)
    }
}

/// A log-structured merge tree (LSM-tree/LSMT)
///
/// The tree is internally synchronized (Send + Sync), so it does not need to be
/// wrapped in a lock nor an Arc.
///
/// To share the tree between threads, use `Arc::clone(&tree)` or `tree.clone()`.
#[doc(alias = "keyspace")]
#[doc(alias = "table")]
#[derive(Clone)]
pub struct Tree(Arc<TreeInner>);

impl std::ops::Deref for Tree {
    type Target = Arc<TreeInner>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Tree {
    /// Opens the tree at the given folder.
    ///
    /// Will create a new tree if the folder is not in use
    /// or recover a previous state if it exists.
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Tree::open(Config::new(&folder))?;
    /// // Same as
    /// let tree = Config::new(&folder).open()?;
    /// # Ok::<(), talus::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn open(config: Config) -> crate::Result<Self> {
        log::debug!("Opening LSM-tree at {}", config.inner.path.display());

        let tree = if config.inner.path.join(LSM_MARKER).try_exists()? {
            Self::recover(config)
        } else {
            Self::create_new(config)
        }?;

        tree.start_wal_sync_thread();

        Ok(tree)
    }

    /// Creates a new tree in a folder.
    fn create_new(config: Config) -> crate::Result<Self> {
        let path = config.inner.path.clone();
        log::trace!("Creating LSM-tree at {}", path.display());

        std::fs::create_dir_all(&path)?;
        std::fs::create_dir_all(path.join(SEGMENTS_FOLDER))?;

        let marker_path = path.join(LSM_MARKER);
        assert!(!marker_path.try_exists()?);

        let config_json = serde_json::to_string_pretty(&config.inner)?;
        std::fs::write(path.join(CONFIG_FILE), config_json)?;

        let (wal, _) = Wal::open(&path)?;

        let inner = TreeInner::create_new(config, wal)?;

        // NOTE: Lastly, fsync .lsm marker, which contains the version
        // -> the LSM is fully initialized
        let mut file = std::fs::File::create(marker_path)?;
        Version::V0.write_file_header(&mut file)?;
        file.sync_all()?;

        // fsync folder
        fsync_directory(&path)?;

        Ok(Self(Arc::new(inner)))
    }

    /// Tries to recover a tree from a folder.
    fn recover(config: Config) -> crate::Result<Self> {
        let path = config.inner.path.clone();
        log::info!("Recovering LSM-tree at {}", path.display());

        {
            let bytes = std::fs::read(path.join(LSM_MARKER))?;

            match Version::parse_file_header(&bytes) {
                Some(Version::V0) => {}
                None => {
                    return Err(crate::Error::InvalidVersion(None));
                }
            }
        }

        // Use the persisted config, but the given caches
        let persisted_config: PersistedConfig =
            serde_json::from_slice(&std::fs::read(path.join(CONFIG_FILE))?)?;

        let config = Config {
            inner: PersistedConfig {
                path: path.clone(),
                ..persisted_config
            },
            block_cache: config.block_cache,
            descriptor_table: config.descriptor_table,
        };

        log::info!("Restoring segments");
        let segments =
            Self::recover_segments(&path, &config.block_cache, &config.descriptor_table)?;

        log::debug!("Loading level manifest");
        let mut levels = Levels::recover(path.join(LEVELS_MANIFEST_FILE), segments)?;
        levels.sort_levels();

        log::info!("Restoring WAL + memtable");
        let (wal, memtable) = Wal::open(&path)?;

        // The next seqno is the successor of the highest persisted one
        let segment_seqno = levels
            .get_all_segments_flattened()
            .iter()
            .map(|segment| segment.get_highest_seqno())
            .max();

        let next_seqno = segment_seqno
            .into_iter()
            .chain(memtable.get_highest_seqno())
            .max()
            .map_or(0, |seqno| seqno + 1);

        let inner = TreeInner {
            active_memtable: Arc::new(RwLock::new(memtable)),
            sealed_memtables: Arc::default(),
            levels: Arc::new(RwLock::new(levels)),
            wal: Arc::new(wal),
            config: config.inner,
            block_cache: config.block_cache,
            descriptor_table: config.descriptor_table,
            seqno: SequenceNumberCounter::new(next_seqno),
            open_snapshots: crate::snapshot::SnapshotCounter::default(),
            stop_signal: crate::stop_signal::StopSignal::default(),
        };

        Ok(Self(Arc::new(inner)))
    }

    /// Recovers all segments that the level manifest claims exist.
    ///
    /// Segment folders that are not referenced by the manifest are
    /// incomplete (the result of a crashed flush or compaction) and
    /// are deleted.
    fn recover_segments<P: AsRef<Path>>(
        folder: &P,
        block_cache: &Arc<BlockCache>,
        descriptor_table: &Arc<FileDescriptorTable>,
    ) -> crate::Result<Vec<Arc<Segment>>> {
        let folder = folder.as_ref();

        let segment_ids_to_recover = Levels::recover_ids(folder.join(LEVELS_MANIFEST_FILE))?;

        let mut segments = vec![];

        for dirent in std::fs::read_dir(folder.join(SEGMENTS_FOLDER))? {
            let dirent = dirent?;
            let segment_path = dirent.path();

            assert!(segment_path.is_dir());

            #[allow(clippy::expect_used)]
            let segment_id: SegmentId = dirent
                .file_name()
                .to_str()
                .expect("invalid segment folder name")
                .into();

            log::debug!("Recovering segment from {}", segment_path.display());

            if segment_ids_to_recover.contains(&segment_id) {
                let segment = Segment::recover(
                    &segment_path,
                    block_cache.clone(),
                    descriptor_table.clone(),
                )?;

                descriptor_table.insert(segment_path.join(BLOCKS_FILE), segment_id);

                segments.push(Arc::new(segment));
                log::debug!("Recovered segment from {}", segment_path.display());
            } else {
                log::info!("Deleting unfinished segment: {}", segment_path.display());
                std::fs::remove_dir_all(segment_path)?;
            }
        }

        if segments.len() < segment_ids_to_recover.len() {
            for id in segment_ids_to_recover {
                if !segments.iter().any(|segment| segment.metadata.id == id) {
                    log::error!("Expected segment not found on disk: {id}");

                    return Err(crate::Error::MissingFile(
                        folder.join(SEGMENTS_FOLDER).join(&*id),
                    ));
                }
            }
        }

        Ok(segments)
    }

    fn start_wal_sync_thread(&self) {
        let wal = self.wal.clone();
        let stop_signal = self.stop_signal.clone();

        std::thread::spawn(move || {
            log::trace!("Starting WAL sync thread");

            while !stop_signal.is_stopped() {
                std::thread::sleep(WAL_SYNC_INTERVAL);

                if let Err(e) = wal.sync() {
                    log::error!("WAL sync error: {e}");
                }
            }

            log::trace!("WAL sync thread stopped");
        });
    }

    /// Appends an entry to the WAL, then inserts it into the active memtable.
    ///
    /// The WAL lock is held across both steps so the log and the
    /// memtable can never diverge.
    fn append_entry(&self, value: Value) -> crate::Result<(u32, u32)> {
        let mut shard = self.wal.lock_writer();
        crate::wal::write_entry(&mut *shard, &value)?;

        let memtable_lock = self.active_memtable.read().expect("lock is poisoned");
        let sizes = memtable_lock.insert(value);
        drop(memtable_lock);
        drop(shard);

        Ok(sizes)
    }

    /// Inserts a key-value pair into the tree.
    ///
    /// If the key already exists, the item will be overwritten.
    ///
    /// Returns the added item's size and the new approximate size of the memtable.
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(folder).open()?;
    /// tree.insert("a", "abc", tree.seqno.next())?;
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn insert<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        key: K,
        value: V,
        seqno: SeqNo,
    ) -> crate::Result<(u32, u32)> {
        let value = Value::new(
            key.as_ref(),
            value.as_ref(),
            seqno,
            ValueType::Value,
        );
        self.append_entry(value)
    }

    /// Deletes an item from the tree.
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(folder).open()?;
    /// tree.insert("a", "abc", tree.seqno.next())?;
    ///
    /// let item = tree.get("a")?.expect("should have item");
    /// assert_eq!("abc".as_bytes(), &*item);
    ///
    /// tree.remove("a", tree.seqno.next())?;
    ///
    /// let item = tree.get("a")?;
    /// assert_eq!(None, item);
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn remove<K: AsRef<[u8]>>(&self, key: K, seqno: SeqNo) -> crate::Result<(u32, u32)> {
        let value = Value::new_tombstone(key.as_ref(), seqno);
        self.append_entry(value)
    }

    #[doc(hidden)]
    pub fn get_internal_entry(
        &self,
        key: &[u8],
        evict_tombstone: bool,
        seqno: Option<SeqNo>,
    ) -> crate::Result<Option<Value>> {
        let memtable_lock = self.active_memtable.read().expect("lock is poisoned");

        if let Some(item) = memtable_lock.get(key, seqno) {
            if evict_tombstone {
                return Ok(ignore_tombstone_value(item));
            }
            return Ok(Some(item));
        }
        drop(memtable_lock);

        // Now look in sealed memtables
        let memtable_lock = self.sealed_memtables.read().expect("lock is poisoned");

        for (_, memtable) in memtable_lock.iter().rev() {
            if let Some(item) = memtable.get(key, seqno) {
                if evict_tombstone {
                    return Ok(ignore_tombstone_value(item));
                }
                return Ok(Some(item));
            }
        }
        drop(memtable_lock);

        // Now look in segments... this may involve disk I/O
        let levels_lock = self.levels.read().expect("lock is poisoned");

        for (idx, level) in levels_lock.full_view().into_iter().enumerate() {
            if idx == 0 {
                // Level 0 segments may overlap, scan them newest to oldest
                for segment in level {
                    if let Some(item) = segment.get(key, seqno)? {
                        if evict_tombstone {
                            return Ok(ignore_tombstone_value(item));
                        }
                        return Ok(Some(item));
                    }
                }
            } else {
                // Deeper levels are disjoint, so (at most) one candidate exists
                let Some(segment) = level
                    .into_iter()
                    .find(|segment| segment.key_range_contains(key))
                else {
                    continue;
                };

                if let Some(item) = segment.get(key, seqno)? {
                    if evict_tombstone {
                        return Ok(ignore_tombstone_value(item));
                    }
                    return Ok(Some(item));
                }
            }
        }

        Ok(None)
    }

    /// Retrieves an item from the tree.
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(folder).open()?;
    /// tree.insert("a", "my_value", tree.seqno.next())?;
    ///
    /// let item = tree.get("a")?;
    /// assert_eq!(Some("my_value".as_bytes().into()), item);
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn get<K: AsRef<[u8]>>(&self, key: K) -> crate::Result<Option<UserValue>> {
        Ok(self
            .get_internal_entry(key.as_ref(), true, None)?
            .map(|item| item.value))
    }

    /// Returns `true` if the tree contains the specified key.
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(folder).open()?;
    /// assert!(!tree.contains_key("a")?);
    ///
    /// tree.insert("a", "abc", tree.seqno.next())?;
    /// assert!(tree.contains_key("a")?);
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn contains_key<K: AsRef<[u8]>>(&self, key: K) -> crate::Result<bool> {
        self.get(key).map(|item| item.is_some())
    }

    pub(crate) fn create_iter(&self, seqno: Option<SeqNo>) -> Range<'_> {
        self.create_range::<UserKey, _>(.., seqno)
    }

    /// Returns an iterator that scans through the entire tree.
    ///
    /// Avoid using this function, or limit it as otherwise it may scan a lot of items.
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(folder).open()?;
    ///
    /// tree.insert("a", "abc", tree.seqno.next())?;
    /// tree.insert("f", "abc", tree.seqno.next())?;
    /// tree.insert("g", "abc", tree.seqno.next())?;
    ///
    /// let iter = tree.iter();
    /// assert_eq!(3, iter.into_iter().count());
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    #[must_use]
    #[allow(clippy::iter_without_into_iter)]
    pub fn iter(&self) -> Range<'_> {
        self.create_iter(None)
    }

    pub(crate) fn create_range<K: AsRef<[u8]>, R: RangeBounds<K>>(
        &self,
        range: R,
        seqno: Option<SeqNo>,
    ) -> Range<'_> {
        let lo: Bound<UserKey> = match range.start_bound() {
            Bound::Included(key) => Bound::Included(key.as_ref().into()),
            Bound::Excluded(key) => Bound::Excluded(key.as_ref().into()),
            Bound::Unbounded => Bound::Unbounded,
        };

        let hi: Bound<UserKey> = match range.end_bound() {
            Bound::Included(key) => Bound::Included(key.as_ref().into()),
            Bound::Excluded(key) => Bound::Excluded(key.as_ref().into()),
            Bound::Unbounded => Bound::Unbounded,
        };

        let bounds: (Bound<UserKey>, Bound<UserKey>) = (lo, hi);

        let lock = self.levels.read().expect("lock is poisoned");

        let bounds_borrowed = (
            bounds.0.as_ref().map(|key| &**key),
            bounds.1.as_ref().map(|key| &**key),
        );

        let segments = lock
            .get_all_segments_flattened()
            .into_iter()
            .filter(|segment| segment.check_key_range_overlap(&bounds_borrowed))
            .collect();

        Range::new(
            MemTableGuard {
                active: self.active_memtable.read().expect("lock is poisoned"),
                sealed: self.sealed_memtables.read().expect("lock is poisoned"),
            },
            bounds,
            segments,
            seqno,
        )
    }

    /// Returns an iterator over a range of items.
    ///
    /// Avoid using full or unbounded ranges as they may scan a lot of items (unless limited).
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(folder).open()?;
    ///
    /// tree.insert("a", "abc", tree.seqno.next())?;
    ///
    /// let range = tree.range("a"..="z");
    /// assert_eq!(1, range.into_iter().count());
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    pub fn range<K: AsRef<[u8]>, R: RangeBounds<K>>(&self, range: R) -> Range<'_> {
        self.create_range(range, None)
    }

    pub(crate) fn create_prefix(&self, prefix: &[u8], seqno: Option<SeqNo>) -> Prefix<'_> {
        let prefix: UserKey = prefix.into();

        let lock = self.levels.read().expect("lock is poisoned");

        let segments = lock
            .get_all_segments_flattened()
            .into_iter()
            .filter(|segment| segment.check_prefix_overlap(&prefix))
            .collect();

        Prefix::new(
            MemTableGuard {
                active: self.active_memtable.read().expect("lock is poisoned"),
                sealed: self.sealed_memtables.read().expect("lock is poisoned"),
            },
            prefix,
            segments,
            seqno,
        )
    }

    /// Returns an iterator over a prefixed set of items.
    ///
    /// Avoid using an empty prefix as it may scan a lot of items (unless limited).
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(folder).open()?;
    ///
    /// tree.insert("a", "abc", tree.seqno.next())?;
    /// tree.insert("ab", "abc", tree.seqno.next())?;
    /// tree.insert("abc", "abc", tree.seqno.next())?;
    ///
    /// let prefix = tree.prefix("ab");
    /// assert_eq!(2, prefix.into_iter().count());
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    pub fn prefix<K: AsRef<[u8]>>(&self, prefix: K) -> Prefix<'_> {
        self.create_prefix(prefix.as_ref(), None)
    }

    /// Returns the first key-value pair in the tree.
    /// The key in this pair is the minimum key in the tree.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn first_key_value(&self) -> crate::Result<Option<(UserKey, UserValue)>> {
        let iter = self.iter();
        let result = iter.into_iter().next().transpose();
        result
    }

    /// Returns the last key-value pair in the tree.
    /// The key in this pair is the maximum key in the tree.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn last_key_value(&self) -> crate::Result<Option<(UserKey, UserValue)>> {
        let iter = self.iter();
        let result = iter.into_iter().next_back().transpose();
        result
    }

    /// Scans the entire tree, returning the amount of items.
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(folder).open()?;
    /// assert_eq!(tree.len()?, 0);
    ///
    /// tree.insert("1", "abc", tree.seqno.next())?;
    /// tree.insert("3", "abc", tree.seqno.next())?;
    /// tree.insert("5", "abc", tree.seqno.next())?;
    /// assert_eq!(tree.len()?, 3);
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn len(&self) -> crate::Result<usize> {
        let iter = self.iter();
        let mut count = 0;

        for item in &iter {
            let _ = item?;
            count += 1;
        }

        Ok(count)
    }

    /// Returns `true` if the tree is empty.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn is_empty(&self) -> crate::Result<bool> {
        self.first_key_value().map(|item| item.is_none())
    }

    /// Approximates the amount of items in the tree.
    ///
    /// This metric is only reliable for insert-only (no updates or deletes) workloads.
    #[must_use]
    pub fn approximate_len(&self) -> u64 {
        let memtable_lock = self.active_memtable.read().expect("lock is poisoned");
        let levels_lock = self.levels.read().expect("lock is poisoned");

        let segment_count = levels_lock
            .get_all_segments_flattened()
            .iter()
            .map(|segment| segment.metadata.item_count)
            .sum::<u64>();

        memtable_lock.len() as u64 + segment_count
    }

    /// Sums the disk space usage of the tree (segments + WAL).
    #[must_use]
    pub fn disk_space(&self) -> u64 {
        let segment_size = self.levels.read().expect("lock is poisoned").size();
        let wal_size = self.wal.disk_space().unwrap_or_default();
        segment_size + wal_size
    }

    /// Returns the approximate size of the active memtable in bytes.
    ///
    /// May be used to flush the memtable if it grows too large.
    #[must_use]
    pub fn active_memtable_size(&self) -> u32 {
        self.active_memtable
            .read()
            .expect("lock is poisoned")
            .size()
    }

    /// Counts the amount of segments currently in the tree.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.levels.read().expect("lock is poisoned").len()
    }

    /// Counts the amount of segments in the first (shallowest) level.
    ///
    /// A large number indicates that write stalling may be needed
    /// to let compaction catch up.
    #[must_use]
    pub fn first_level_segment_count(&self) -> usize {
        self.levels
            .read()
            .expect("lock is poisoned")
            .first_level_segment_count()
    }

    /// Returns `true` if some segments are currently being compacted.
    #[doc(hidden)]
    #[must_use]
    pub fn is_compacting(&self) -> bool {
        self.levels.read().expect("lock is poisoned").is_compacting()
    }

    /// Opens a snapshot of this tree, bound to the given sequence number.
    #[must_use]
    pub fn snapshot(&self, seqno: SeqNo) -> Snapshot {
        Snapshot::new(self.clone(), seqno)
    }

    /// Sets the active memtable.
    ///
    /// May be used to restore the memtable state from some caller-managed log.
    pub fn set_active_memtable(&self, memtable: MemTable) {
        let mut memtable_lock = self.active_memtable.write().expect("lock is poisoned");
        *memtable_lock = memtable;
    }

    /// Seals the active memtable and places it into the sealed memtable map,
    /// leaving behind an empty active memtable.
    ///
    /// Returns the sealed memtable, keyed by the segment ID it will be
    /// flushed to, or `None` if the active memtable was empty.
    pub fn rotate_memtable(&self) -> Option<(SegmentId, Arc<MemTable>)> {
        log::trace!("rotate: acquiring active memtable write lock");
        let mut active_memtable = self.active_memtable.write().expect("lock is poisoned");

        if active_memtable.is_empty() {
            return None;
        }

        log::trace!("rotate: acquiring sealed memtables write lock");
        let mut sealed_memtables = self.sealed_memtables.write().expect("lock is poisoned");

        let yanked_memtable = std::mem::take(&mut *active_memtable);
        let yanked_memtable = Arc::new(yanked_memtable);

        let tmp_memtable_id = generate_segment_id();
        sealed_memtables.insert(tmp_memtable_id.clone(), yanked_memtable.clone());

        Some((tmp_memtable_id, yanked_memtable))
    }

    /// Registers new segments, making them visible to reads,
    /// and persists the level manifest.
    pub(crate) fn register_segments(&self, segments: &[Arc<Segment>]) -> crate::Result<()> {
        let mut levels = self.levels.write().expect("lock is poisoned");
        let mut sealed_memtables = self.sealed_memtables.write().expect("lock is poisoned");

        for segment in segments {
            levels.add(segment.clone());
        }

        levels.write_to_disk()?;

        for segment in segments {
            sealed_memtables.remove(&segment.metadata.id);
        }

        Ok(())
    }

    /// Flushes the active memtable to a disk segment.
    ///
    /// The function may not return a result, if, during concurrent workloads, the memtable
    /// ends up being empty before the flush is set up.
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(folder).open()?;
    ///
    /// tree.insert("a", "abc", tree.seqno.next())?;
    ///
    /// let segment_path = tree.flush_active_memtable()?.expect("should flush");
    /// assert_eq!(1, tree.segment_count());
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn flush_active_memtable(&self) -> crate::Result<Option<PathBuf>> {
        log::debug!("flush: flushing active memtable");

        let Some((segment_id, yanked_memtable)) = self.rotate_memtable() else {
            return Ok(None);
        };

        let segment_folder = self.config.path.join(SEGMENTS_FOLDER);
        log::debug!("flush: writing segment to {}", segment_folder.display());

        let segment = flush_to_segment(FlushOptions {
            memtable: yanked_memtable,
            segment_id,
            folder: segment_folder,
            block_size: self.config.block_size,
            block_cache: self.block_cache.clone(),
            descriptor_table: self.descriptor_table.clone(),
        })?;

        let segment_path = segment.metadata.path.clone();

        self.register_segments(&[Arc::new(segment)])?;

        // The flushed data is durable in the segment now,
        // the WAL only needs to carry whatever is still unflushed
        {
            let mut shard = self.wal.lock_writer();
            let memtable_lock = self.active_memtable.read().expect("lock is poisoned");
            Wal::truncate_locked(&mut shard, memtable_lock.iter())?;
        }

        Ok(Some(segment_path))
    }

    /// Synchronizes the WAL to disk, making sure all written data
    /// is persisted and crash-safe.
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?.keep();
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(&folder).open()?;
    /// tree.insert("a", "abc", tree.seqno.next())?;
    /// tree.wal_sync()?;
    ///
    /// drop(tree);
    ///
    /// let tree = Config::new(&folder).open()?;
    /// let item = tree.get("a")?;
    /// assert!(item.is_some());
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn wal_sync(&self) -> crate::Result<()> {
        self.wal.sync()
    }

    /// Rebuilds all segments into fewer, larger ones, in the last level.
    ///
    /// Old versions and (if no snapshot is open) tombstones are dropped
    /// in the process.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn major_compact(&self, target_size: u64) -> crate::Result<()> {
        compaction::major_compaction(self, target_size)
    }
}

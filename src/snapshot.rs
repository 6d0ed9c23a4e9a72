// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    prefix::Prefix,
    range::Range,
    value::{SeqNo, UserKey, UserValue},
    Tree,
};
use std::ops::RangeBounds;
use std::sync::{atomic::AtomicU32, Arc};

/// Counts open snapshots
///
/// While snapshots are open, old versions of items are not garbage collected
/// during compaction, so the snapshots stay consistent.
#[derive(Clone, Debug, Default)]
pub struct SnapshotCounter(Arc<AtomicU32>);

impl SnapshotCounter {
    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::Release)
    }

    pub fn decrement(&self) -> u32 {
        self.0.fetch_sub(1, std::sync::atomic::Ordering::Release)
    }

    #[must_use]
    pub fn has_open_snapshots(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Acquire) > 0
    }
}

/// A snapshot captures a read-only point-in-time view of the tree at the time the snapshot was created
///
/// As long as the snapshot is open, old versions of objects will not be evicted as to
/// keep the snapshot consistent. Thus, snapshots should only be kept around for as little as possible.
///
/// Snapshots do not persist across restarts.
pub struct Snapshot {
    tree: Tree,

    #[doc(hidden)]
    pub seqno: SeqNo,
}

impl Snapshot {
    /// Creates a snapshot
    pub(crate) fn new(tree: Tree, seqno: SeqNo) -> Self {
        tree.open_snapshots.increment();
        log::trace!("Opening snapshot with seqno: {seqno}");

        Self { tree, seqno }
    }

    /// Retrieves an item from the snapshot.
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use talus::{Config, Tree};
    ///
    /// let tree = Config::new(folder).open()?;
    /// let snapshot = tree.snapshot(0);
    ///
    /// tree.insert("a", "my_value", tree.seqno.next())?;
    ///
    /// let item = snapshot.get("a")?;
    /// assert_eq!(None, item);
    ///
    /// let snapshot = tree.snapshot(tree.seqno.get());
    ///
    /// let item = snapshot.get("a")?.expect("should exist");
    /// assert_eq!(b"my_value", &*item);
    /// #
    /// # Ok::<(), talus::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn get<K: AsRef<[u8]>>(&self, key: K) -> crate::Result<Option<UserValue>> {
        Ok(self
            .tree
            .get_internal_entry(key.as_ref(), true, Some(self.seqno))?
            .map(|item| item.value))
    }

    /// Returns `true` if the snapshot contains the specified key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn contains_key<K: AsRef<[u8]>>(&self, key: K) -> crate::Result<bool> {
        self.get(key).map(|item| item.is_some())
    }

    /// Returns an iterator that scans through the entire snapshot.
    ///
    /// Avoid using this function, or limit it as otherwise it may scan a lot of items.
    #[must_use]
    pub fn iter(&self) -> Range<'_> {
        self.tree.create_iter(Some(self.seqno))
    }

    /// Returns an iterator over a range of items in the snapshot.
    ///
    /// Avoid using full or unbounded ranges as they may scan a lot of items (unless limited).
    pub fn range<K: AsRef<[u8]>, R: RangeBounds<K>>(&self, range: R) -> Range<'_> {
        self.tree.create_range(range, Some(self.seqno))
    }

    /// Returns an iterator over a prefixed set of items in the snapshot.
    ///
    /// Avoid using an empty prefix as it may scan a lot of items (unless limited).
    pub fn prefix<K: AsRef<[u8]>>(&self, prefix: K) -> Prefix<'_> {
        self.tree.create_prefix(prefix.as_ref(), Some(self.seqno))
    }

    /// Returns the first key-value pair in the snapshot.
    /// The key in this pair is the minimum key in the snapshot.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn first_key_value(&self) -> crate::Result<Option<(UserKey, UserValue)>> {
        let iter = self.iter();
        let result = iter.into_iter().next().transpose();
        result
    }

    /// Returns the last key-value pair in the snapshot.
    /// The key in this pair is the maximum key in the snapshot.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn last_key_value(&self) -> crate::Result<Option<(UserKey, UserValue)>> {
        let iter = self.iter();
        let result = iter.into_iter().next_back().transpose();
        result
    }

    /// Scans the entire snapshot, returning the amount of items.
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

    /// Returns `true` if the snapshot is empty.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn is_empty(&self) -> crate::Result<bool> {
        self.first_key_value().map(|item| item.is_none())
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        log::trace!("Closing snapshot");
        self.tree.open_snapshots.decrement();
    }
}

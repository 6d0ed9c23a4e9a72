// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod lru;

use crate::{segment::SegmentId, HashMap};
use lru::LruList;
use std::{
    fs::File,
    io::BufReader,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize},
        Arc, Mutex, RwLock, RwLockWriteGuard,
    },
};

pub struct FileGuard(Arc<FileDescriptorWrapper>);

impl std::ops::Deref for FileGuard {
    type Target = Arc<FileDescriptorWrapper>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        self.0
            .is_used
            .store(false, std::sync::atomic::Ordering::Release);
    }
}

pub struct FileDescriptorWrapper {
    pub file: Mutex<BufReader<File>>,
    is_used: AtomicBool,
}

pub struct FileHandle {
    descriptors: RwLock<Vec<Arc<FileDescriptorWrapper>>>,
    path: PathBuf,
}

pub struct FileDescriptorTableInner {
    table: HashMap<SegmentId, FileHandle>,
    lru: Mutex<LruList<SegmentId>>,
    size: AtomicUsize,
}

/// The descriptor table caches file descriptors to avoid `fopen()` calls
///
/// See `TableCache` in `RocksDB`.
#[doc(alias("table cache"))]
#[allow(clippy::module_name_repetitions)]
pub struct FileDescriptorTable {
    inner: RwLock<FileDescriptorTableInner>,
    concurrency: usize,
    limit: usize,
}

impl FileDescriptorTable {
    /// Closes all file descriptors
    pub fn clear(&self) {
        let mut lock = self.inner.write().expect("lock is poisoned");
        lock.table.clear();
        lock.size.store(0, std::sync::atomic::Ordering::Release);
    }

    #[must_use]
    pub fn new(limit: usize, concurrency: usize) -> Self {
        assert!(concurrency > 0, "concurrency should be >= 1");

        Self {
            inner: RwLock::new(FileDescriptorTableInner {
                table: HashMap::with_capacity_and_hasher(
                    100,
                    xxhash_rust::xxh3::Xxh3Builder::new(),
                ),
                lru: Mutex::new(LruList::with_capacity(100)),
                size: AtomicUsize::default(),
            }),
            concurrency,
            limit,
        }
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock is poisoned").table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of open file descriptors
    pub fn size(&self) -> usize {
        self.inner
            .read()
            .expect("lock is poisoned")
            .size
            .load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn access(&self, id: &SegmentId) -> crate::Result<Option<FileGuard>> {
        let lock = self.inner.read().expect("lock is poisoned");

        let Some(item) = lock.table.get(id) else {
            return Ok(None);
        };

        let fd_array = item.descriptors.read().expect("lock is poisoned");

        if fd_array.is_empty() {
            drop(fd_array);
            drop(lock);

            let lock = self.inner.write().expect("lock is poisoned");
            let mut lru = lock.lru.lock().expect("lock is poisoned");
            lru.refresh(id.clone());

            let fd = {
                let Some(item) = lock.table.get(id) else {
                    // Someone removed the file while we were upgrading the lock
                    return Ok(None);
                };

                let mut fd_lock = item.descriptors.write().expect("lock is poisoned");

                // Another thread may have opened the descriptors already
                if let Some(fd) = claim_free_descriptor(&fd_lock) {
                    return Ok(Some(FileGuard(fd)));
                }

                for _ in 0..(self.concurrency - 1) {
                    let fd = Arc::new(FileDescriptorWrapper {
                        file: Mutex::new(BufReader::new(File::open(&item.path)?)),
                        is_used: AtomicBool::default(),
                    });
                    fd_lock.push(fd.clone());
                }

                let fd = Arc::new(FileDescriptorWrapper {
                    file: Mutex::new(BufReader::new(File::open(&item.path)?)),
                    is_used: AtomicBool::new(true),
                });
                fd_lock.push(fd.clone());

                fd
            };

            let mut size_now = lock
                .size
                .fetch_add(self.concurrency, std::sync::atomic::Ordering::AcqRel)
                + self.concurrency;

            // Evict least-recently-used files until we are below the limit again.
            // Bounded by the table size, so a lone over-limit file cannot spin forever.
            let mut attempts = lock.table.len();

            while size_now > self.limit && attempts > 0 {
                attempts -= 1;

                let Some(oldest) = lru.get_least_recently_used() else {
                    break;
                };

                if &oldest == id {
                    continue;
                }

                if let Some(item) = lock.table.get(&oldest) {
                    let mut oldest_lock = item.descriptors.write().expect("lock is poisoned");

                    lock.size
                        .fetch_sub(oldest_lock.len(), std::sync::atomic::Ordering::Release);
                    size_now -= oldest_lock.len();

                    oldest_lock.clear();
                }
            }

            Ok(Some(FileGuard(fd)))
        } else {
            loop {
                if let Some(fd) = claim_free_descriptor(&fd_array) {
                    return Ok(Some(FileGuard(fd)));
                }

                // All descriptors are currently in use, let another thread
                // release one before sweeping again
                std::thread::yield_now();
            }
        }
    }

    fn inner_insert(
        mut lock: RwLockWriteGuard<'_, FileDescriptorTableInner>,
        path: PathBuf,
        id: SegmentId,
    ) {
        lock.table.insert(
            id.clone(),
            FileHandle {
                descriptors: RwLock::new(vec![]),
                path,
            },
        );

        lock.lru.lock().expect("lock is poisoned").refresh(id);
    }

    pub fn insert<P: Into<PathBuf>>(&self, path: P, id: SegmentId) {
        let lock = self.inner.write().expect("lock is poisoned");
        Self::inner_insert(lock, path.into(), id);
    }

    pub fn remove(&self, id: &SegmentId) {
        let mut lock = self.inner.write().expect("lock is poisoned");

        if let Some(item) = lock.table.remove(id) {
            lock.size.fetch_sub(
                item.descriptors.read().expect("lock is poisoned").len(),
                std::sync::atomic::Ordering::Release,
            );
        }

        lock.lru.lock().expect("lock is poisoned").remove(id);
    }
}

fn claim_free_descriptor(
    fd_array: &[Arc<FileDescriptorWrapper>],
) -> Option<Arc<FileDescriptorWrapper>> {
    for shard in fd_array {
        if shard
            .is_used
            .compare_exchange(
                false,
                true,
                std::sync::atomic::Ordering::AcqRel,
                std::sync::atomic::Ordering::Acquire,
            )
            .is_ok()
        {
            return Some(shard.clone());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use test_log::test;

    fn id(s: &str) -> SegmentId {
        Arc::from(s)
    }

    #[test]
    fn descriptor_table_limit() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let path = folder.path();

        File::create(path.join("1"))?;
        File::create(path.join("2"))?;
        File::create(path.join("3"))?;

        let table = FileDescriptorTable::new(2, 1);

        assert_eq!(0, table.size());

        table.insert(path.join("1"), id("1"));
        assert_eq!(0, table.size());

        {
            let _ = table.access(&id("1"));
            assert_eq!(1, table.size());
        }

        table.insert(path.join("2"), id("2"));

        {
            assert_eq!(1, table.size());
            let _ = table.access(&id("1"));
        }

        {
            let _ = table.access(&id("2"));
            assert_eq!(2, table.size());
        }

        table.insert(path.join("3"), id("3"));
        assert_eq!(2, table.size());

        {
            let _ = table.access(&id("3"));
            assert_eq!(2, table.size());
        }

        table.remove(&id("3"));
        assert_eq!(1, table.size());

        table.remove(&id("2"));
        assert_eq!(0, table.size());

        let _ = table.access(&id("1"));
        assert_eq!(1, table.size());

        Ok(())
    }

    #[test]
    fn descriptor_table_concurrent_access() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let path = folder.path().join("file");
        std::fs::write(&path, b"hello")?;

        let table = Arc::new(FileDescriptorTable::new(8, 2));
        table.insert(&path, id("a"));

        let mut threads = vec![];

        for _ in 0..4 {
            let table = table.clone();

            threads.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let guard = table
                        .access(&id("a"))
                        .expect("should access")
                        .expect("file should exist");
                    let _file = guard.file.lock().expect("lock is poisoned");
                }
            }));
        }

        for thread in threads {
            thread.join().expect("should join");
        }

        // limit + concurrency is never exceeded
        assert!(table.size() <= 8 + 2);

        Ok(())
    }
}

// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    file::WAL_FILE,
    memtable::MemTable,
    value::{SeqNo, Value, ValueType},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

/// A single WAL record
///
/// Key and value are base64-encoded so arbitrary bytes survive the
/// line-delimited JSON framing.
#[derive(Debug, Deserialize, Serialize)]
struct WalEntry {
    k: String,
    v: String,
    s: SeqNo,
    t: u8,
}

impl WalEntry {
    fn from_value(value: &Value) -> Self {
        Self {
            k: BASE64.encode(&value.key),
            v: BASE64.encode(&value.value),
            s: value.seqno,
            t: u8::from(value.value_type),
        }
    }

    fn to_value(&self) -> Option<Value> {
        let key = BASE64.decode(&self.k).ok()?;
        let value = BASE64.decode(&self.v).ok()?;

        if key.is_empty() || key.len() > u16::MAX.into() {
            return None;
        }

        let value_type = ValueType::try_from(self.t).ok()?;

        Some(Value::new(key, value, self.s, value_type))
    }
}

/// The write-ahead log persists writes before they are applied
/// to the (volatile) memtable, so they are recoverable after a crash
///
/// Records are stored line-delimited, one JSON object per line.
/// A malformed line ends recovery; everything after it is truncated.
pub struct Wal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl Wal {
    /// Opens an existing WAL (replaying it into a fresh memtable), or creates a new one
    pub fn open<P: AsRef<Path>>(folder: P) -> crate::Result<(Self, MemTable)> {
        let path = folder.as_ref().join(WAL_FILE);

        let memtable = if path.try_exists()? {
            recover_wal(&path)?
        } else {
            MemTable::default()
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.seek(SeekFrom::End(0))?;

        let wal = Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        };

        Ok((wal, memtable))
    }

    /// Locks the log writer
    ///
    /// The tree's write path holds this lock while also inserting into the
    /// memtable, so the log and the memtable can never diverge.
    pub(crate) fn lock_writer(&self) -> std::sync::MutexGuard<'_, BufWriter<File>> {
        self.writer.lock().expect("lock is poisoned")
    }

    /// Appends a single value to the log
    ///
    /// The write is buffered; call [`Wal::sync`] to make it durable.
    pub fn write(&self, value: &Value) -> crate::Result<()> {
        let mut writer = self.lock_writer();
        write_entry(&mut *writer, value)
    }

    /// Flushes and fsyncs the log
    pub fn sync(&self) -> crate::Result<()> {
        let mut writer = self.writer.lock().expect("lock is poisoned");
        writer.flush()?;
        writer.get_mut().sync_all()?;
        Ok(())
    }

    /// Clears the log, then rewrites it with the given items
    ///
    /// Called after a successful flush; the items are whatever is still
    /// unflushed (the content of the active memtable), so the invariant
    /// "WAL contains exactly the unflushed suffix" is kept even for writes
    /// that raced the flush.
    pub fn truncate(&self, remaining_items: impl Iterator<Item = Value>) -> crate::Result<()> {
        let mut writer = self.lock_writer();
        Self::truncate_locked(&mut writer, remaining_items)
    }

    /// [`Wal::truncate`], for an already locked log writer
    pub(crate) fn truncate_locked(
        writer: &mut BufWriter<File>,
        remaining_items: impl Iterator<Item = Value>,
    ) -> crate::Result<()> {
        writer.flush()?;

        let file = writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;

        for item in remaining_items {
            write_entry(file, &item)?;
        }

        file.sync_all()?;

        Ok(())
    }

    /// Returns the size of the log file in bytes
    pub fn disk_space(&self) -> crate::Result<u64> {
        let metadata = std::fs::metadata(&self.path)?;
        Ok(metadata.len())
    }
}

pub(crate) fn write_entry<W: Write>(writer: &mut W, value: &Value) -> crate::Result<()> {
    let line = serde_json::to_string(&WalEntry::from_value(value))?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn recover_wal(path: &Path) -> crate::Result<MemTable> {
    log::info!("Recovering WAL from {path:?}");

    let memtable = MemTable::default();

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut valid_pos: u64 = 0;
    let mut truncate = false;
    let mut count = 0;
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;

        if bytes_read == 0 {
            break;
        }

        if line.trim().is_empty() {
            truncate = true;
            break;
        }

        let Some(value) = serde_json::from_str::<WalEntry>(line.trim_end())
            .ok()
            .and_then(|entry| entry.to_value())
        else {
            log::warn!("Truncating WAL at position {valid_pos} because of malformed content");
            truncate = true;
            break;
        };

        memtable.insert(value);
        valid_pos += bytes_read as u64;
        count += 1;
    }

    if truncate {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_pos)?;
        file.sync_all()?;
    }

    log::info!("Recovered {count} items from WAL");

    Ok(memtable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn wal_write_and_recover() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;

        {
            let (wal, memtable) = Wal::open(folder.path())?;
            assert!(memtable.is_empty());

            wal.write(&Value::new(*b"a", *b"1", 0, ValueType::Value))?;
            wal.write(&Value::new(*b"b", *b"2", 1, ValueType::Value))?;
            wal.write(&Value::new_tombstone(*b"a", 2))?;
            wal.sync()?;
        }

        let (_, memtable) = Wal::open(folder.path())?;
        assert_eq!(3, memtable.len());

        let item = memtable.get(b"a", None).expect("should exist");
        assert!(item.is_tombstone());

        let item = memtable.get(b"b", None).expect("should exist");
        assert_eq!(b"2", &*item.value);

        Ok(())
    }

    #[test]
    fn wal_recover_malformed_tail() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;

        {
            let (wal, _) = Wal::open(folder.path())?;
            wal.write(&Value::new(*b"a", *b"1", 0, ValueType::Value))?;
            wal.write(&Value::new(*b"b", *b"2", 1, ValueType::Value))?;
            wal.sync()?;
        }

        // Simulate a torn write
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(folder.path().join(WAL_FILE))?;
            file.write_all(b"{\"k\":\"trunca")?;
            file.sync_all()?;
        }

        let (_, memtable) = Wal::open(folder.path())?;
        assert_eq!(2, memtable.len());

        // The malformed tail is gone after recovery
        let content = std::fs::read_to_string(folder.path().join(WAL_FILE))?;
        assert_eq!(2, content.lines().count());
        assert!(content.ends_with('\n'));

        Ok(())
    }

    #[test]
    fn wal_truncate_keeps_remaining() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;

        let (wal, _) = Wal::open(folder.path())?;
        wal.write(&Value::new(*b"a", *b"1", 0, ValueType::Value))?;
        wal.write(&Value::new(*b"b", *b"2", 1, ValueType::Value))?;
        wal.sync()?;

        let survivor = Value::new(*b"c", *b"3", 2, ValueType::Value);
        wal.truncate(std::iter::once(survivor))?;
        drop(wal);

        let (_, memtable) = Wal::open(folder.path())?;
        assert_eq!(1, memtable.len());
        assert!(memtable.get(b"c", None).is_some());

        Ok(())
    }
}

// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embedded, persistent key-value storage engine based on
//! log-structured merge trees (LSM-trees/LSMTs).
//!
//! ##### About
//!
//! This crate exports a [`Tree`] that supports a subset of the `BTreeMap` API.
//!
//! LSM-trees are an alternative to B-trees to persist a sorted list of items (e.g. a database table)
//! on disk and perform fast lookup queries.
//! Instead of updating a disk-based data structure in-place,
//! deltas (inserts and deletes) are added into an in-memory write buffer (`MemTable`)
//! and appended to a write-ahead log for durability.
//! Data is then flushed to disk segments, as the write buffer reaches some threshold.
//!
//! Amassing many segments on disk will degrade read performance and waste disk space usage, so segments
//! can be periodically merged into larger segments in a process called `Compaction`.
//!
//! Because maintaining an efficient structure is deferred to the compaction process, writing to an LSMT
//! is very fast (O(1) complexity).
//!
//! Keys are limited to 65535 bytes, values are limited to 2^32 bytes. As is normal with any kind of storage
//! engine, larger keys and values have a bigger performance impact.
//!
//! # Example usage
//!
//! ```
//! use talus::{Config, Tree};
//! #
//! # let folder = tempfile::tempdir()?;
//!
//! // A tree is a single physical keyspace/index/...
//! // and supports a BTreeMap-like API
//! let tree = Config::new(&folder).open()?;
//!
//! // Note compared to the BTreeMap API, operations return a Result<T>
//! // So you can handle I/O errors if they occur
//! tree.insert("my_key", "my_value", tree.seqno.next())?;
//!
//! let item = tree.get("my_key")?;
//! assert_eq!(Some("my_value".as_bytes().into()), item);
//!
//! // Search by prefix
//! let prefix = tree.prefix("prefix");
//! for item in &prefix {
//!   // ...
//! }
//!
//! // Search by range
//! let range = tree.range("a"..="z");
//! for item in &range {
//!   // ...
//! }
//!
//! // Flush to secondary storage, clearing the memtable
//! // and persisting all in-memory data.
//! tree.flush_active_memtable()?;
//! assert_eq!(Some("my_value".as_bytes().into()), tree.get("my_key")?);
//! #
//! # Ok::<(), talus::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]

macro_rules! fail_iter {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        }
    };
}

mod block_cache;

#[doc(hidden)]
pub mod compaction;

mod config;

#[doc(hidden)]
pub mod descriptor_table;

mod disk_block;
mod either;
mod error;

#[doc(hidden)]
pub mod file;

mod flush;

#[doc(hidden)]
pub mod id;

mod key_range;

#[doc(hidden)]
pub mod levels;

mod memtable;

#[doc(hidden)]
pub mod merge;

#[doc(hidden)]
pub mod prefix;

#[doc(hidden)]
pub mod range;

#[doc(hidden)]
pub mod segment;

mod seqno;

#[doc(hidden)]
pub mod serde;

mod snapshot;

#[doc(hidden)]
pub mod stop_signal;

mod time;
mod tree;

#[doc(hidden)]
pub mod tree_inner;

mod value;
mod version;

#[doc(hidden)]
pub mod wal;

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, xxhash_rust::xxh3::Xxh3Builder>;

/// KV-tuple, typically returned by an iterator
pub type KvPair = (UserKey, UserValue);

#[doc(hidden)]
pub use value::{ParsedInternalKey, Value};

pub use {
    block_cache::BlockCache,
    config::{Config, PersistedConfig, TreeType},
    error::{Error, Result},
    memtable::MemTable,
    segment::{meta::CompressionType, Segment},
    seqno::SequenceNumberCounter,
    serde::{DeserializeError, SerializeError},
    snapshot::Snapshot,
    tree::Tree,
    value::{SeqNo, UserKey, UserValue, ValueType},
    version::Version,
};

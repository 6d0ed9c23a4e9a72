// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::value::{ParsedInternalKey, SeqNo, UserValue, Value, ValueType};
use crossbeam_skiplist::SkipMap;
use std::ops::RangeBounds;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// The `MemTable` serves as an intermediary storage for new items
///
/// When the `MemTable` exceeds some size, it should be flushed to a disk segment.
#[derive(Default)]
pub struct MemTable {
    /// The actual content, stored in a lock-free skiplist
    #[doc(hidden)]
    pub items: SkipMap<ParsedInternalKey, UserValue>,

    /// Approximate active memtable size
    ///
    /// If this grows too large, a flush is triggered
    pub(crate) approximate_size: AtomicU32,

    /// Highest encountered sequence number
    highest_seqno: AtomicU64,
}

impl MemTable {
    /// Creates an iterator over all items
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Value> + '_ {
        self.items.iter().map(|entry| {
            Value::from((entry.key().clone(), entry.value().clone()))
        })
    }

    /// Creates an iterator over a range of items
    pub fn range<'a, R: RangeBounds<ParsedInternalKey> + 'a>(
        &'a self,
        range: R,
    ) -> impl DoubleEndedIterator<Item = Value> + 'a {
        self.items.range(range).map(|entry| {
            Value::from((entry.key().clone(), entry.value().clone()))
        })
    }

    /// Returns the item by key if it exists
    ///
    /// The item with the highest seqno will be returned, if `seqno` is None,
    /// otherwise the newest item that is not visible to the given snapshot
    /// seqno is ignored.
    pub fn get(&self, key: &[u8], seqno: Option<SeqNo>) -> Option<Value> {
        if seqno == Some(0) {
            return None;
        }

        // NOTE: This range start deserves some explanation...
        // InternalKeys are multi-sorted by 2 categories: user_key and Reverse(seqno). (tombstone doesn't really matter)
        // We search for the lowest entry that is greater or equal the user's prefix key
        // and has the highest seqno (because the seqno is stored in reverse order)
        //
        // Example: We search for "abc"
        //
        // key -> seqno
        //
        // a   -> 7
        // abc -> 5 <<< This is the lowest key that matches the key with seqno=None
        // abc -> 4
        // abc -> 3 <<< If searching for abc and seqno=4, we would get this
        // abcdef -> 6
        // abcdef -> 5
        //
        let lower_bound = ParsedInternalKey::new(
            key,
            match seqno {
                Some(seqno) => seqno - 1,
                None => SeqNo::MAX,
            },
            ValueType::Value,
        );

        let mut iter = self
            .items
            .range(lower_bound..)
            .take_while(|entry| &*entry.key().user_key == key);

        iter.next().map(|entry| {
            Value::from((entry.key().clone(), entry.value().clone()))
        })
    }

    /// Gets approximate size of the memtable in bytes
    pub fn size(&self) -> u32 {
        self.approximate_size
            .load(std::sync::atomic::Ordering::Acquire)
    }

    /// Counts the number of items in the memtable
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the memtable is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts an item into the memtable
    ///
    /// Returns the added item size and the new approximate size of the memtable
    #[doc(hidden)]
    pub fn insert(&self, item: Value) -> (u32, u32) {
        // NOTE: Keys are limited to 16-bit length and values to 32-bit length,
        // so the sum can never overflow
        #[allow(clippy::cast_possible_truncation)]
        let item_size = (item.key.len() + item.value.len()) as u32;

        let size_before = self
            .approximate_size
            .fetch_add(item_size, std::sync::atomic::Ordering::AcqRel);

        self.highest_seqno
            .fetch_max(item.seqno, std::sync::atomic::Ordering::AcqRel);

        let key = ParsedInternalKey::new(item.key, item.seqno, item.value_type);
        self.items.insert(key, item.value);

        (item_size, size_before + item_size)
    }

    /// Returns the highest sequence number in the memtable
    pub fn get_highest_seqno(&self) -> Option<SeqNo> {
        if self.is_empty() {
            None
        } else {
            Some(
                self.highest_seqno
                    .load(std::sync::atomic::Ordering::Acquire),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn memtable_get() {
        let memtable = MemTable::default();

        let value = Value::new(b"abc".to_vec(), b"abc".to_vec(), 0, ValueType::Value);

        memtable.insert(value.clone());

        assert_eq!(Some(value), memtable.get(b"abc", None));
    }

    #[test]
    fn memtable_get_highest_seqno() {
        let memtable = MemTable::default();

        for seqno in 0..5 {
            memtable.insert(Value::new(
                b"abc".to_vec(),
                b"abc".to_vec(),
                seqno,
                ValueType::Value,
            ));
        }

        assert_eq!(
            Some(Value::new(
                b"abc".to_vec(),
                b"abc".to_vec(),
                4,
                ValueType::Value,
            )),
            memtable.get(b"abc", None)
        );

        assert_eq!(Some(4), memtable.get_highest_seqno());
    }

    #[test]
    fn memtable_get_prefix() {
        let memtable = MemTable::default();

        memtable.insert(Value::new(
            b"abc0".to_vec(),
            b"abc".to_vec(),
            0,
            ValueType::Value,
        ));
        memtable.insert(Value::new(
            b"abc".to_vec(),
            b"abc".to_vec(),
            255,
            ValueType::Value,
        ));

        assert_eq!(
            Some(Value::new(
                b"abc".to_vec(),
                b"abc".to_vec(),
                255,
                ValueType::Value,
            )),
            memtable.get(b"abc", None)
        );

        assert_eq!(
            Some(Value::new(
                b"abc0".to_vec(),
                b"abc".to_vec(),
                0,
                ValueType::Value,
            )),
            memtable.get(b"abc0", None)
        );
    }

    #[test]
    fn memtable_get_old_version() {
        let memtable = MemTable::default();

        memtable.insert(Value::new(
            b"abc".to_vec(),
            b"abc".to_vec(),
            0,
            ValueType::Value,
        ));
        memtable.insert(Value::new(
            b"abc".to_vec(),
            b"abc".to_vec(),
            99,
            ValueType::Value,
        ));
        memtable.insert(Value::new(
            b"abc".to_vec(),
            b"abc".to_vec(),
            255,
            ValueType::Value,
        ));

        assert_eq!(
            Some(Value::new(
                b"abc".to_vec(),
                b"abc".to_vec(),
                255,
                ValueType::Value,
            )),
            memtable.get(b"abc", None)
        );

        assert_eq!(
            Some(Value::new(
                b"abc".to_vec(),
                b"abc".to_vec(),
                99,
                ValueType::Value,
            )),
            memtable.get(b"abc", Some(100))
        );

        assert_eq!(
            Some(Value::new(
                b"abc".to_vec(),
                b"abc".to_vec(),
                0,
                ValueType::Value,
            )),
            memtable.get(b"abc", Some(50))
        );
    }

    #[test]
    fn memtable_mvcc_not_visible() {
        let memtable = MemTable::default();

        memtable.insert(Value::new(
            b"abc".to_vec(),
            b"abc".to_vec(),
            5,
            ValueType::Value,
        ));

        // Nothing was visible to a snapshot taken before the write
        assert_eq!(None, memtable.get(b"abc", Some(5)));
        assert_eq!(None, memtable.get(b"abc", Some(0)));

        // ... but the write is visible afterwards
        assert!(memtable.get(b"abc", Some(6)).is_some());
    }
}

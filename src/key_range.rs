// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::value::UserKey;
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// A key range in the format of [min, max] (inclusive on both sides)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange(UserKey, UserKey);

/// Computes the exclusive upper bound of all keys that start with `prefix`
///
/// Returns `None` if there is no upper bound (the prefix is all 0xFF bytes).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();

    while let Some(last) = end.last_mut() {
        if *last < 255 {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }

    None
}

impl KeyRange {
    #[must_use]
    pub fn new((min, max): (UserKey, UserKey)) -> Self {
        Self(min, max)
    }

    #[must_use]
    pub fn min(&self) -> &UserKey {
        &self.0
    }

    #[must_use]
    pub fn max(&self) -> &UserKey {
        &self.1
    }

    fn as_tuple(&self) -> (&UserKey, &UserKey) {
        (self.min(), self.max())
    }

    /// Returns `true` if the key falls within this key range
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        let (start, end) = self.as_tuple();
        key >= &**start && key <= &**end
    }

    /// Returns `true` if the range may contain keys starting with `prefix`
    #[must_use]
    pub fn contains_prefix(&self, prefix: &[u8]) -> bool {
        if prefix.is_empty() {
            return true;
        }

        if &**self.max() < prefix {
            return false;
        }

        match prefix_upper_bound(prefix) {
            Some(upper) => &**self.min() < &*upper,
            None => true,
        }
    }

    /// Returns `true` if the bounds overlap partially or fully with this range
    #[must_use]
    pub fn overlaps_with_bounds(&self, bounds: &(Bound<&[u8]>, Bound<&[u8]>)) -> bool {
        let (lo, hi) = bounds;
        let (my_lo, my_hi) = self.as_tuple();

        if *lo == Bound::Unbounded && *hi == Bound::Unbounded {
            return true;
        }

        if *hi == Bound::Unbounded {
            return match lo {
                Bound::Included(key) => key <= &&**my_hi,
                Bound::Excluded(key) => key < &&**my_hi,
                Bound::Unbounded => unreachable!(),
            };
        }

        if *lo == Bound::Unbounded {
            return match hi {
                Bound::Included(key) => key >= &&**my_lo,
                Bound::Excluded(key) => key > &&**my_lo,
                Bound::Unbounded => unreachable!(),
            };
        }

        let lo_included = match lo {
            Bound::Included(key) => key <= &&**my_hi,
            Bound::Excluded(key) => key < &&**my_hi,
            Bound::Unbounded => unreachable!(),
        };

        let hi_included = match hi {
            Bound::Included(key) => key >= &&**my_lo,
            Bound::Excluded(key) => key > &&**my_lo,
            Bound::Unbounded => unreachable!(),
        };

        lo_included && hi_included
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Bound::{Excluded, Included, Unbounded};
    use test_log::test;

    fn string_key_range(a: &str, b: &str) -> KeyRange {
        KeyRange::new((a.as_bytes().into(), b.as_bytes().into()))
    }

    #[test]
    fn key_range_contains() {
        let range = string_key_range("c", "k");
        assert!(range.contains_key(b"c"));
        assert!(range.contains_key(b"f"));
        assert!(range.contains_key(b"k"));
        assert!(!range.contains_key(b"a"));
        assert!(!range.contains_key(b"z"));
    }

    #[test]
    fn key_range_prefix_overlap() {
        let range = string_key_range("ab1", "ac1");
        assert!(range.contains_prefix(b"ab"));
        assert!(range.contains_prefix(b"ac"));
        assert!(range.contains_prefix(b""));
        assert!(!range.contains_prefix(b"aa"));
        assert!(!range.contains_prefix(b"b"));
    }

    #[test]
    fn key_range_prefix_upper_bound() {
        assert_eq!(Some(b"abd".to_vec()), prefix_upper_bound(b"abc"));
        assert_eq!(Some(b"b".to_vec()), prefix_upper_bound(b"a"));
        assert_eq!(Some(vec![0, 251]), prefix_upper_bound(&[0, 250]));
        assert_eq!(Some(vec![1]), prefix_upper_bound(&[0, 255]));
        assert_eq!(None, prefix_upper_bound(&[255, 255, 255]));
    }

    mod overlaps_with_bounds {
        use super::*;
        use test_log::test;

        #[test]
        fn inclusive() {
            let key_range = string_key_range("key1", "key5");
            let bounds = (Included(b"key1" as &[u8]), Included(b"key5" as &[u8]));
            assert!(key_range.overlaps_with_bounds(&bounds));
        }

        #[test]
        fn exclusive() {
            let key_range = string_key_range("key1", "key5");
            let bounds = (Excluded(b"key0" as &[u8]), Excluded(b"key6" as &[u8]));
            assert!(key_range.overlaps_with_bounds(&bounds));
        }

        #[test]
        fn no_overlap() {
            let key_range = string_key_range("key1", "key5");
            let bounds = (Excluded(b"key5" as &[u8]), Excluded(b"key6" as &[u8]));
            assert!(!key_range.overlaps_with_bounds(&bounds));
        }

        #[test]
        fn unbounded() {
            let key_range = string_key_range("key1", "key5");
            let bounds = (Unbounded, Unbounded);
            assert!(key_range.overlaps_with_bounds(&bounds));
        }
    }
}

// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use chrono::{Datelike, Timelike, Utc};
use rand::RngCore;
use std::sync::Arc;

const BASE_36_RADIX: u32 = 36;

fn to_base36(mut x: u32) -> String {
    let mut result = vec![];

    loop {
        let m = x % BASE_36_RADIX;
        x /= BASE_36_RADIX;

        #[allow(clippy::expect_used)]
        result.push(std::char::from_digit(m, BASE_36_RADIX).expect("should be base36 digit"));

        if x == 0 {
            break;
        }
    }

    result.into_iter().rev().collect()
}

/// Generates an ID for a segment
///
/// Like `Cassandra` or `ScyllaDB`'s SSTable identifiers, time-sortable
/// within nanosecond resolution, with a random tail to break ties.
#[allow(clippy::module_name_repetitions)]
#[doc(hidden)]
#[must_use]
pub fn generate_segment_id() -> Arc<str> {
    let now = Utc::now();

    let year = now.year().unsigned_abs();
    let month = now.month();
    let day = now.day0();

    let hour = now.hour();
    let min = now.minute();
    let sec = now.second();
    let nano = now.timestamp_subsec_nanos();

    let random = rand::rng().next_u32() & 0xFFFF;

    format!(
        "{:0>4}_{}{}{:0>2}{:0>2}_{:0>2}{:0>8}_{:0>4}",
        to_base36(year),
        to_base36(month),
        to_base36(day),
        to_base36(hour),
        to_base36(min),
        to_base36(sec),
        to_base36(nano),
        to_base36(random),
    )
    .into()
}

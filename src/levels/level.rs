// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::segment::SegmentId;
use serde::{Deserialize, Serialize};

/// A level of the LSM-tree, listing the IDs of its segments
///
/// The segment objects themselves are resolved through the
/// manifest's segment map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(pub Vec<SegmentId>);

impl std::ops::Deref for Level {
    type Target = Vec<SegmentId>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Level {
    pub fn insert(&mut self, id: SegmentId) {
        self.0.push(id);
    }

    pub fn remove(&mut self, id: &str) {
        self.0.retain(|x| &**x != id);
    }

    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.0.iter().any(|x| &**x == id)
    }

    #[must_use]
    pub fn ids(&self) -> &[SegmentId] {
        &self.0
    }
}

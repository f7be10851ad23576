// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Pool census: how much is waiting and how much is in transit.
//!
//! Built by walking the tree once; nothing here is cached between calls. The
//! census is the one reader that looks inside marker directories on purpose,
//! so claimed files are reported against the directory they were popped from.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::storage::logical_path::LogicalPath;

/// Counts for a single pool directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirCensus {
    /// Logical path of the directory, e.g. `/incoming`.
    pub dir: String,
    pub unclaimed: usize,
    pub unclaimed_bytes: u64,
    /// Files sitting in the marker directory, i.e. claimed but not yet removed.
    pub claimed: usize,
    pub claimed_bytes: u64,
}

/// Serializable snapshot of a [`PoolCensus`].
#[derive(Debug, Serialize)]
pub struct CensusReport {
    pub dirs: Vec<DirCensus>,
    pub totals: DirCensus,
}

/// Census of a subtree, one entry per directory in logical path order.
#[derive(Debug, Default)]
pub struct PoolCensus {
    dirs: BTreeMap<LogicalPath, DirCensus>,
}

impl PoolCensus {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, dir: &LogicalPath) -> &mut DirCensus {
        self.dirs.entry(dir.clone()).or_insert_with(|| DirCensus {
            dir: dir.to_string(),
            ..DirCensus::default()
        })
    }

    /// Register a directory even if it turns out to hold nothing.
    pub fn visit(&mut self, dir: &LogicalPath) {
        self.slot(dir);
    }

    pub fn record_unclaimed(&mut self, dir: &LogicalPath, len: u64) {
        let slot = self.slot(dir);
        slot.unclaimed += 1;
        slot.unclaimed_bytes += len;
    }

    pub fn record_claimed(&mut self, dir: &LogicalPath, len: u64) {
        let slot = self.slot(dir);
        slot.claimed += 1;
        slot.claimed_bytes += len;
    }

    /// Per-directory counts in logical path order.
    pub fn dirs(&self) -> impl Iterator<Item = &DirCensus> {
        self.dirs.values()
    }

    pub fn get(&self, dir: &LogicalPath) -> Option<&DirCensus> {
        self.dirs.get(dir)
    }

    /// Sum over every directory; `dir` of the result is the empty string.
    pub fn totals(&self) -> DirCensus {
        self.dirs.values().fold(DirCensus::default(), |mut acc, d| {
            acc.unclaimed += d.unclaimed;
            acc.unclaimed_bytes += d.unclaimed_bytes;
            acc.claimed += d.claimed;
            acc.claimed_bytes += d.claimed_bytes;
            acc
        })
    }

    pub fn report(&self) -> CensusReport {
        CensusReport { dirs: self.dirs().cloned().collect(), totals: self.totals() }
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

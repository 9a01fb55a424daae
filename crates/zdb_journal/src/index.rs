//! Sparse offset index.
//!
//! Maps a subset of log indexes to the byte position of their record frame
//! within a segment, so readers can seek without scanning from the start of
//! a segment.

use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A log index together with the position of its frame in its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexInfo {
    /// Logical log index.
    pub index: u64,
    /// Byte offset of the record frame within its segment.
    pub position: usize,
}

/// Lookup structure shared by all segments of a journal.
///
/// The journal supplies an implementation to every segment at load time.
/// Segments feed it while scanning and consult it when seeking.
///
/// # Invariants
///
/// - `lookup` returns the greatest indexed entry at or below the requested index
/// - Positions are only meaningful within the segment holding that index
pub trait JournalIndex: Send + Sync {
    /// Offers a record's position to the index. Implementations may drop it.
    fn index(&self, info: IndexInfo);

    /// Offers the first record of a segment to the index.
    fn index_segment_start(&self, info: IndexInfo) {
        self.index(info);
    }

    /// Returns the closest indexed entry at or below `index`.
    fn lookup(&self, index: u64) -> Option<IndexInfo>;

    /// Removes every entry.
    fn clear(&self);
}

/// A [`JournalIndex`] that keeps every `density`-th record.
///
/// The first record of each segment is always kept so that a lookup never
/// falls back into the previous segment for an index the current one holds.
#[derive(Debug)]
pub struct SparseJournalIndex {
    density: u64,
    positions: RwLock<BTreeMap<u64, usize>>,
    segment_starts: RwLock<BTreeMap<u64, usize>>,
}

impl SparseJournalIndex {
    /// Creates an index keeping one entry per `density` records.
    #[must_use]
    pub fn new(density: u64) -> Self {
        Self {
            density: density.max(1),
            positions: RwLock::new(BTreeMap::new()),
            segment_starts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.read().len() + self.segment_starts.read().len()
    }

    /// Returns true if no entry is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JournalIndex for SparseJournalIndex {
    fn index(&self, info: IndexInfo) {
        if info.index % self.density == 0 {
            self.positions.write().insert(info.index, info.position);
        }
    }

    fn index_segment_start(&self, info: IndexInfo) {
        self.segment_starts.write().insert(info.index, info.position);
    }

    fn lookup(&self, index: u64) -> Option<IndexInfo> {
        let floor = |map: &BTreeMap<u64, usize>| {
            map.range(..=index)
                .next_back()
                .map(|(&index, &position)| IndexInfo { index, position })
        };

        let sparse = floor(&self.positions.read());
        let start = floor(&self.segment_starts.read());
        match (sparse, start) {
            (Some(a), Some(b)) => Some(if a.index >= b.index { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    fn clear(&self) {
        self.positions.write().clear();
        self.segment_starts.write().clear();
    }
}

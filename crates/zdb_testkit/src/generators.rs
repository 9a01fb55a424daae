//! Property-based test generators using proptest.
//!
//! Strategies produce journal layouts that a well-behaved writer could
//! have left on disk.

use crate::fixtures::{JournalFixture, SegmentFileBuilder};
use proptest::prelude::*;
use zdb_journal::ASQN_IGNORE;

/// Shape of one generated segment.
#[derive(Debug, Clone)]
pub struct SegmentShape {
    /// Records held by the segment, as `(asqn present, payload)`.
    pub records: Vec<(bool, Vec<u8>)>,
}

/// Strategy for record payloads.
pub fn record_data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for one segment holding at least `min_records` records.
pub fn segment_shape_strategy(min_records: usize) -> impl Strategy<Value = SegmentShape> {
    prop::collection::vec((prop::bool::weighted(0.8), record_data_strategy()), min_records..24)
        .prop_map(|records| SegmentShape { records })
}

/// Strategy for a journal layout of 1 to `max_segments` segments.
///
/// Every segment but the last holds at least one record, so segment start
/// indexes are distinct.
pub fn journal_layout_strategy(max_segments: usize) -> impl Strategy<Value = Vec<SegmentShape>> {
    (
        prop::collection::vec(segment_shape_strategy(1), 0..max_segments.max(1)),
        segment_shape_strategy(0),
    )
        .prop_map(|(mut segments, last)| {
            segments.push(last);
            segments
        })
}

/// Strategy for the first index of a journal whose head was compacted away.
pub fn first_index_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![Just(1u64), 2u64..10_000]
}

/// Writes `layout` into `fixture`, starting at `first_index`.
///
/// Records flagged with an ASQN receive strictly increasing ASQNs; the
/// others carry [`ASQN_IGNORE`].
pub fn write_layout(fixture: &mut JournalFixture, first_index: u64, layout: &[SegmentShape]) {
    let mut asqn = fixture.next_asqn();
    let mut index = first_index.max(fixture.next_index());
    for (offset, shape) in layout.iter().enumerate() {
        let mut builder = SegmentFileBuilder::new(offset as u64 + 1, index);
        for (has_asqn, data) in &shape.records {
            let record_asqn = if *has_asqn {
                asqn += 1;
                asqn
            } else {
                ASQN_IGNORE
            };
            builder = builder.record(record_asqn, data.clone());
        }
        index = builder.next_index();
        fixture.write_segment(&builder);
    }
}

/// Configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 500,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    ///
    /// Every case writes files to disk, so this is the default choice.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 24,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

//! Sequential reader over the records of one segment.

use crate::error::JournalResult;
use crate::record::JournalRecord;
use crate::segment::Segment;
use std::sync::Arc;

/// Reads the records of a single segment in index order.
///
/// The reader holds its segment alive. Once the segment is closed, further
/// reads fail with [`JournalError::InvalidState`](crate::JournalError::InvalidState).
#[derive(Debug)]
pub struct SegmentReader {
    segment: Arc<Segment>,
    position: usize,
    next_index: u64,
}

impl SegmentReader {
    pub(crate) fn new(segment: Arc<Segment>) -> Self {
        let position = segment.first_position();
        let next_index = segment.index();
        Self {
            segment,
            position,
            next_index,
        }
    }

    /// Returns the segment being read.
    #[must_use]
    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// Returns the index of the record the next read returns.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Returns true if another record remains in this segment.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.next_index <= self.segment.last_index()
    }

    /// Moves back to the first record of the segment.
    pub fn reset(&mut self) {
        self.position = self.segment.first_position();
        self.next_index = self.segment.index();
    }

    /// Positions the reader so the next read returns `index`.
    ///
    /// Indexes below the segment start position the reader at the first
    /// record; indexes past the last record position it at the end.
    /// Returns the index the next read will return.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment is closed or a record is corrupted.
    pub fn seek(&mut self, index: u64) -> JournalResult<u64> {
        self.reset();
        if let Some(info) = self.segment.lookup(index) {
            self.position = info.position;
            self.next_index = info.index;
        }

        while self.next_index < index {
            if self.next_record()?.is_none() {
                break;
            }
        }
        Ok(self.next_index)
    }

    /// Reads the next record, or `None` at the end of the segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment is closed or the record is corrupted.
    pub fn next_record(&mut self) -> JournalResult<Option<JournalRecord>> {
        if !self.has_next() {
            return Ok(None);
        }

        match self.segment.read_record_at(self.position)? {
            Some((record, next_position)) => {
                self.position = next_position;
                self.next_index = record.index + 1;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

impl Iterator for SegmentReader {
    type Item = JournalResult<JournalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SegmentDescriptor;
    use crate::index::SparseJournalIndex;
    use crate::record::ASQN_IGNORE;
    use std::io::Write;

    fn segment_with(records: u64, density: u64) -> (tempfile::TempDir, Arc<Segment>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log-1.log");
        let mut data = SegmentDescriptor::new(1, 10, 4096).encode();
        for i in 0..records {
            let index = 10 + i;
            data.extend_from_slice(&JournalRecord::new(index, index as i64, vec![i as u8; 3]).encode());
        }
        data.resize(4096, 0);
        std::fs::File::create(&path).unwrap().write_all(&data).unwrap();

        let index = Arc::new(SparseJournalIndex::new(density));
        let segment = Segment::load(&path, 4096, ASQN_IGNORE, index).unwrap();
        (dir, Arc::new(segment))
    }

    #[test]
    fn iterates_all_records() {
        let (_dir, segment) = segment_with(5, 100);
        let indexes: Vec<u64> = segment.reader().map(|r| r.unwrap().index).collect();
        assert_eq!(indexes, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn seek_with_sparse_index() {
        let (_dir, segment) = segment_with(20, 4);
        let mut reader = segment.reader();

        assert_eq!(reader.seek(17).unwrap(), 17);
        assert_eq!(reader.next_record().unwrap().unwrap().index, 17);

        assert_eq!(reader.seek(3).unwrap(), 10);
        assert_eq!(reader.next_record().unwrap().unwrap().index, 10);

        assert_eq!(reader.seek(100).unwrap(), 30);
        assert!(!reader.has_next());
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn empty_segment_has_nothing() {
        let (_dir, segment) = segment_with(0, 1);
        let mut reader = segment.reader();
        assert!(!reader.has_next());
        assert!(reader.next().is_none());
    }

    #[test]
    fn reading_closed_segment_fails() {
        let (_dir, segment) = segment_with(2, 1);
        let mut reader = segment.reader();
        segment.close();
        assert!(reader.next().unwrap().is_err());
    }
}

//! Read-only segmented journal.
//!
//! [`SegmentedJournal`] ties the sparse index and the segments manager
//! together; [`JournalReader`] walks records across segment boundaries.

use crate::config::JournalConfig;
use crate::error::{JournalError, JournalResult};
use crate::index::{JournalIndex, SparseJournalIndex};
use crate::record::{JournalRecord, ASQN_IGNORE};
use crate::segment::{Segment, SegmentReader, SegmentsManager};
use std::sync::Arc;

/// A journal opened for reading.
///
/// # Example
///
/// ```rust,ignore
/// use zdb_journal::{JournalConfig, SegmentedJournal};
///
/// let journal = SegmentedJournal::open(JournalConfig::new("data/1", "raft-partition-partition-1"))?;
/// for record in journal.reader() {
///     let record = record?;
///     println!("{} {}", record.index, record.asqn);
/// }
/// journal.close();
/// ```
#[derive(Debug)]
pub struct SegmentedJournal {
    config: JournalConfig,
    index: Arc<SparseJournalIndex>,
    segments: Arc<SegmentsManager>,
}

impl SegmentedJournal {
    /// Opens the journal described by `config`.
    ///
    /// # Errors
    ///
    /// Returns any error raised by [`SegmentsManager::open`].
    pub fn open(config: JournalConfig) -> JournalResult<Self> {
        let index = Arc::new(SparseJournalIndex::new(config.index_density));
        let shared: Arc<dyn JournalIndex> = Arc::clone(&index) as _;
        let segments = Arc::new(SegmentsManager::new(&config, shared));
        segments.open()?;

        Ok(Self {
            config,
            index,
            segments,
        })
    }

    /// Returns the configuration the journal was opened with.
    #[must_use]
    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// Returns the sparse index.
    #[must_use]
    pub fn index(&self) -> &SparseJournalIndex {
        &self.index
    }

    /// Returns the segments manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<SegmentsManager> {
        &self.segments
    }

    /// Returns the first index of the journal, or 0 once closed.
    #[must_use]
    pub fn first_index(&self) -> u64 {
        self.segments
            .get_first_segment()
            .map_or(0, |segment| segment.index())
    }

    /// Returns the index of the last record, or `first_index() - 1` if
    /// the journal holds no record.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.segments
            .get_current_segment()
            .map_or(0, |segment| segment.last_index())
    }

    /// Returns true if the journal holds no record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_index() < self.first_index()
    }

    /// Returns the highest ASQN written in the journal.
    #[must_use]
    pub fn last_written_asqn(&self) -> i64 {
        self.segments
            .get_current_segment()
            .map_or(ASQN_IGNORE, |segment| segment.last_written_asqn())
    }

    /// Returns a snapshot of all segments in index order.
    #[must_use]
    pub fn segments(&self) -> Vec<Arc<Segment>> {
        self.segments.segments()
    }

    /// Creates a reader positioned at the first record.
    #[must_use]
    pub fn reader(&self) -> JournalReader {
        JournalReader::new(Arc::clone(&self.segments))
    }

    /// Returns true until the journal is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.segments.is_open()
    }

    /// Closes the journal and unmaps every segment.
    ///
    /// Readers created earlier fail on their next read.
    pub fn close(&self) {
        self.segments.close();
    }
}

/// Reads records in index order across all segments of a journal.
#[derive(Debug)]
pub struct JournalReader {
    segments: Arc<SegmentsManager>,
    current: Option<SegmentReader>,
}

impl JournalReader {
    fn new(segments: Arc<SegmentsManager>) -> Self {
        let current = segments.get_first_segment().map(|segment| segment.reader());
        Self { segments, current }
    }

    /// Returns the index of the record the next read returns, or 0 if the
    /// journal is closed.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.current.as_ref().map_or(0, SegmentReader::next_index)
    }

    /// Positions the reader on the first record of the journal.
    pub fn seek_to_first(&mut self) {
        self.current = self
            .segments
            .get_first_segment()
            .map(|segment| segment.reader());
    }

    /// Positions the reader so the next read returns `index`.
    ///
    /// Indexes below the first record position the reader on the first
    /// record; indexes past the last record position it at the end.
    /// Returns the index the next read will return.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidState`] if the journal is closed, or
    /// any error raised while reading records.
    pub fn seek(&mut self, index: u64) -> JournalResult<u64> {
        let Some(segment) = self.segments.get_segment(index) else {
            return Err(JournalError::invalid_state("journal is closed"));
        };

        let mut reader = segment.reader();
        let next_index = reader.seek(index)?;
        self.current = Some(reader);
        Ok(next_index)
    }

    /// Positions the reader on the last record of the journal.
    ///
    /// The tail segment may hold no record yet, in which case the last
    /// record lives in an earlier segment. An empty journal positions the
    /// reader on its first index.
    ///
    /// # Errors
    ///
    /// See [`seek`](Self::seek).
    pub fn seek_to_last(&mut self) -> JournalResult<u64> {
        let (Some(first), Some(current)) = (
            self.segments.get_first_segment(),
            self.segments.get_current_segment(),
        ) else {
            return Err(JournalError::invalid_state("journal is closed"));
        };

        let last_index = current.last_index();
        if last_index < first.index() {
            return self.seek(first.index());
        }
        self.seek(last_index)
    }

    /// Positions the reader on the last record whose ASQN is at most `asqn`.
    ///
    /// Records without an ASQN are skipped. If no record qualifies, the
    /// reader is positioned on the first record.
    ///
    /// # Errors
    ///
    /// See [`seek`](Self::seek).
    pub fn seek_to_asqn(&mut self, asqn: i64) -> JournalResult<u64> {
        self.seek_to_first();
        if self.current.is_none() {
            return Err(JournalError::invalid_state("journal is closed"));
        }

        let mut found = None;
        while let Some(record) = self.next().transpose()? {
            if !record.has_asqn() {
                continue;
            }
            if record.asqn > asqn {
                break;
            }
            found = Some(record.index);
        }

        match found {
            Some(index) => self.seek(index),
            None => {
                self.seek_to_first();
                Ok(self.next_index())
            }
        }
    }
}

impl Iterator for JournalReader {
    type Item = JournalResult<JournalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.current.as_mut()?;
            match reader.next_record() {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }

            let start = reader.segment().index();
            let next = self.segments.get_next_segment(start)?;
            self.current = Some(next.reader());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SegmentDescriptor;
    use crate::segment::segment_file_name;
    use std::io::Write;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    const NAME: &str = "raft-partition-partition-1";

    /// Writes segment `id` holding `(index, asqn)` records.
    fn write_segment(dir: &Path, id: u64, first: u64, records: &[(u64, i64)]) {
        let mut data = SegmentDescriptor::new(id, first, 2048).encode();
        for &(index, asqn) in records {
            data.extend_from_slice(&JournalRecord::new(index, asqn, index.to_le_bytes().to_vec()).encode());
        }
        data.resize(2048, 0);
        let path = dir.join(segment_file_name(NAME, id));
        std::fs::File::create(path).unwrap().write_all(&data).unwrap();
    }

    fn journal() -> (TempDir, SegmentedJournal) {
        let dir = tempdir().unwrap();
        write_segment(dir.path(), 1, 1, &[(1, 10), (2, -1), (3, 12)]);
        write_segment(dir.path(), 2, 4, &[(4, 13), (5, 20)]);
        write_segment(dir.path(), 3, 6, &[(6, -1), (7, 30)]);
        let config = JournalConfig::new(dir.path(), NAME).index_density(2);
        let journal = SegmentedJournal::open(config).unwrap();
        (dir, journal)
    }

    fn indexes(reader: &mut JournalReader) -> Vec<u64> {
        reader.map(|r| r.unwrap().index).collect()
    }

    #[test]
    fn bounds() {
        let (_dir, journal) = journal();
        assert_eq!(journal.first_index(), 1);
        assert_eq!(journal.last_index(), 7);
        assert_eq!(journal.last_written_asqn(), 30);
        assert_eq!(journal.segments().len(), 3);
        assert!(!journal.is_empty());
    }

    #[test]
    fn reads_across_segments() {
        let (_dir, journal) = journal();
        assert_eq!(indexes(&mut journal.reader()), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn seek() {
        let (_dir, journal) = journal();
        let mut reader = journal.reader();

        assert_eq!(reader.seek(5).unwrap(), 5);
        assert_eq!(indexes(&mut reader), vec![5, 6, 7]);

        assert_eq!(reader.seek(0).unwrap(), 1);
        assert_eq!(reader.next().unwrap().unwrap().index, 1);

        assert_eq!(reader.seek(99).unwrap(), 8);
        assert!(reader.next().is_none());
    }

    #[test]
    fn seek_to_last() {
        let (_dir, journal) = journal();
        let mut reader = journal.reader();
        assert_eq!(reader.seek_to_last().unwrap(), 7);
        assert_eq!(indexes(&mut reader), vec![7]);
    }

    #[test]
    fn seek_to_last_skips_empty_tail_segment() {
        let dir = tempdir().unwrap();
        write_segment(dir.path(), 1, 1, &[(1, 1), (2, 2), (3, 3)]);
        write_segment(dir.path(), 2, 4, &[]);
        let journal = SegmentedJournal::open(JournalConfig::new(dir.path(), NAME)).unwrap();

        assert_eq!(journal.last_index(), 3);
        let mut reader = journal.reader();
        assert_eq!(reader.seek_to_last().unwrap(), 3);
        assert_eq!(indexes(&mut reader), vec![3]);
    }

    #[test]
    fn seek_to_asqn() {
        let (_dir, journal) = journal();
        let mut reader = journal.reader();

        assert_eq!(reader.seek_to_asqn(19).unwrap(), 4);
        assert_eq!(reader.seek_to_asqn(20).unwrap(), 5);
        assert_eq!(reader.seek_to_asqn(1000).unwrap(), 7);
        assert_eq!(reader.seek_to_asqn(5).unwrap(), 1);
    }

    #[test]
    fn empty_journal() {
        let dir = tempdir().unwrap();
        write_segment(dir.path(), 1, 1, &[]);
        let journal = SegmentedJournal::open(JournalConfig::new(dir.path(), NAME)).unwrap();

        assert!(journal.is_empty());
        assert_eq!(journal.last_written_asqn(), ASQN_IGNORE);
        let mut reader = journal.reader();
        assert_eq!(reader.seek_to_last().unwrap(), 1);
        assert!(reader.next().is_none());
    }

    #[test]
    fn reader_fails_after_close() {
        let (_dir, journal) = journal();
        let mut reader = journal.reader();
        journal.close();

        assert!(!journal.is_open());
        assert!(reader.next().unwrap().is_err());
        assert!(matches!(
            reader.seek(1),
            Err(JournalError::InvalidState { .. })
        ));
        assert_eq!(journal.first_index(), 0);
    }
}

//! Segment registry of a journal directory.
//!
//! The manager discovers the segment files of one log, loads them in id
//! order, and answers "which segment holds index N" for readers. Segments
//! are kept in a map keyed by their first index; the segment with the
//! highest first index is also published as the current segment so the
//! common case of reading the tail skips the map.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --open--> Open --close--> Closed
//!       |                                   ^
//!       +----------- failed open -----------+
//! ```
//!
//! Closing an uninitialized manager leaves it uninitialized. A closed
//! manager can't be reopened; create a new one instead.

use crate::config::JournalConfig;
use crate::error::{JournalError, JournalResult};
use crate::index::JournalIndex;
use crate::record::ASQN_IGNORE;
use crate::segment::file::list_segment_files;
use crate::segment::Segment;
use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagerState {
    Uninitialized,
    Open,
    Closed,
}

/// Loads and tracks the segments of one journal.
pub struct SegmentsManager {
    directory: PathBuf,
    name: String,
    create_if_missing: bool,
    journal_index: Arc<dyn JournalIndex>,
    segments: RwLock<BTreeMap<u64, Arc<Segment>>>,
    current_segment: ArcSwapOption<Segment>,
    state: Mutex<ManagerState>,
}

impl SegmentsManager {
    /// Creates a manager for the journal described by `config`.
    ///
    /// Nothing is read until [`open`](Self::open) is called.
    #[must_use]
    pub fn new(config: &JournalConfig, journal_index: Arc<dyn JournalIndex>) -> Self {
        Self {
            directory: config.directory.clone(),
            name: config.name.clone(),
            create_if_missing: config.create_if_missing,
            journal_index,
            segments: RwLock::new(BTreeMap::new()),
            current_segment: ArcSwapOption::empty(),
            state: Mutex::new(ManagerState::Uninitialized),
        }
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the log name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the index shared by all segments.
    #[must_use]
    pub fn journal_index(&self) -> &Arc<dyn JournalIndex> {
        &self.journal_index
    }

    /// Returns true between a successful [`open`](Self::open) and [`close`](Self::close).
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.state.lock() == ManagerState::Open
    }

    /// Loads every existing segment of the journal.
    ///
    /// Segments are loaded in ascending id order. Each is seeded with the
    /// last ASQN written by its predecessor, and must start right after the
    /// predecessor's last index.
    ///
    /// # Errors
    ///
    /// - [`JournalError::InvalidState`] if the manager was already opened
    /// - [`JournalError::DirectoryUnreadable`] if the directory can't be listed
    /// - [`JournalError::NoSegments`] if no segment file exists
    /// - Any error raised while loading a segment
    ///
    /// After a failed open the manager is closed and holds no segments.
    pub fn open(&self) -> JournalResult<()> {
        let mut state = self.state.lock();
        match *state {
            ManagerState::Uninitialized => {}
            ManagerState::Open => {
                return Err(JournalError::invalid_state("segments are already open"));
            }
            ManagerState::Closed => {
                return Err(JournalError::invalid_state("segments manager is closed"));
            }
        }

        match self.load_segments() {
            Ok(loaded) => {
                let current = loaded.values().next_back().cloned();
                let count = loaded.len();
                *self.segments.write() = loaded;
                self.current_segment.store(current.clone());
                *state = ManagerState::Open;

                if let Some(current) = current {
                    info!(
                        dir = %self.directory.display(),
                        name = %self.name,
                        segments = count,
                        first_index = self.get_first_segment().map_or(0, |s| s.index()),
                        last_index = current.last_index(),
                        "Opened journal segments"
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.journal_index.clear();
                *state = ManagerState::Closed;
                Err(e)
            }
        }
    }

    fn load_segments(&self) -> JournalResult<BTreeMap<u64, Arc<Segment>>> {
        if self.create_if_missing {
            fs::create_dir_all(&self.directory).map_err(|source| {
                JournalError::DirectoryUnreadable {
                    path: self.directory.clone(),
                    source,
                }
            })?;
        }

        let files = list_segment_files(&self.directory, &self.name)?;
        if files.is_empty() {
            return Err(JournalError::NoSegments {
                path: self.directory.clone(),
            });
        }

        let mut loaded: BTreeMap<u64, Arc<Segment>> = BTreeMap::new();
        let mut previous: Option<Arc<Segment>> = None;
        for file in files {
            let last_written_asqn = previous
                .as_ref()
                .map_or(ASQN_IGNORE, |segment| segment.last_written_asqn());
            let segment = Segment::load(
                &file.path,
                file.size,
                last_written_asqn,
                Arc::clone(&self.journal_index),
            )?;

            if let Some(previous) = &previous {
                let expected = previous.last_index() + 1;
                if segment.index() != expected {
                    let reason = format!(
                        "segment starts at index {}, but '{}' ends at index {}",
                        segment.index(),
                        previous.file_name(),
                        previous.last_index()
                    );
                    return Err(JournalError::corrupted(segment.file_name(), reason));
                }
            }
            if let Some(existing) = loaded.get(&segment.index()) {
                let reason = format!(
                    "segment starts at index {}, as does '{}'",
                    segment.index(),
                    existing.file_name()
                );
                return Err(JournalError::corrupted(segment.file_name(), reason));
            }

            debug!(
                segment = %segment.file_name(),
                id = segment.id(),
                index = segment.index(),
                last_index = segment.last_index(),
                "Loaded segment"
            );

            let segment = Arc::new(segment);
            loaded.insert(segment.index(), Arc::clone(&segment));
            previous = Some(segment);
        }

        Ok(loaded)
    }

    /// Returns the segment that holds `index`.
    ///
    /// Indexes past the last segment resolve to the current segment. Indexes
    /// below the first segment resolve to the first segment. Returns `None`
    /// only when no segment is loaded.
    #[must_use]
    pub fn get_segment(&self, index: u64) -> Option<Arc<Segment>> {
        if let Some(current) = self.current_segment.load_full() {
            if index > current.index() {
                return Some(current);
            }
        }

        let segments = self.segments.read();
        segments
            .range(..=index)
            .next_back()
            .or_else(|| segments.iter().next())
            .map(|(_, segment)| Arc::clone(segment))
    }

    /// Returns the segment with the lowest first index.
    #[must_use]
    pub fn get_first_segment(&self) -> Option<Arc<Segment>> {
        self.segments.read().values().next().cloned()
    }

    /// Returns the segment with the highest first index.
    #[must_use]
    pub fn get_last_segment(&self) -> Option<Arc<Segment>> {
        self.segments.read().values().next_back().cloned()
    }

    /// Returns the segment following the one that starts at `index`.
    #[must_use]
    pub fn get_next_segment(&self, index: u64) -> Option<Arc<Segment>> {
        self.segments
            .read()
            .range((Bound::Excluded(index), Bound::Unbounded))
            .next()
            .map(|(_, segment)| Arc::clone(segment))
    }

    /// Returns the current (last) segment.
    #[must_use]
    pub fn get_current_segment(&self) -> Option<Arc<Segment>> {
        self.current_segment.load_full()
    }

    /// Returns a snapshot of all segments in index order.
    #[must_use]
    pub fn segments(&self) -> Vec<Arc<Segment>> {
        self.segments.read().values().cloned().collect()
    }

    /// Returns the number of loaded segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Closes every segment and forgets them.
    ///
    /// Closing is idempotent. Closing a manager that never opened does
    /// nothing, so it can still be opened afterwards.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if *state != ManagerState::Open {
            return;
        }

        self.current_segment.store(None);
        let segments = std::mem::take(&mut *self.segments.write());
        for segment in segments.values() {
            debug!(segment = %segment.file_name(), "Closing segment");
            segment.close();
        }
        self.journal_index.clear();
        *state = ManagerState::Closed;
    }
}

impl Drop for SegmentsManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SegmentsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentsManager")
            .field("directory", &self.directory)
            .field("name", &self.name)
            .field("state", &*self.state.lock())
            .field("segments", &self.segment_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SegmentDescriptor;
    use crate::index::SparseJournalIndex;
    use crate::record::JournalRecord;
    use crate::segment::file::segment_file_name;
    use std::io::Write;
    use tempfile::{tempdir, TempDir};

    const NAME: &str = "journal";

    /// Writes segment `id` holding records `first..first + count`.
    fn write_segment(dir: &Path, id: u64, first: u64, count: u64) {
        let mut data = SegmentDescriptor::new(id, first, 1024).encode();
        for index in first..first + count {
            data.extend_from_slice(&JournalRecord::new(index, index as i64, vec![1, 2]).encode());
        }
        data.resize(1024, 0);
        let path = dir.join(segment_file_name(NAME, id));
        fs::File::create(path).unwrap().write_all(&data).unwrap();
    }

    fn manager(dir: &TempDir) -> SegmentsManager {
        let config = JournalConfig::new(dir.path(), NAME).create_if_missing(false);
        SegmentsManager::new(&config, Arc::new(SparseJournalIndex::new(1)))
    }

    fn three_segments() -> (TempDir, SegmentsManager) {
        let dir = tempdir().unwrap();
        write_segment(dir.path(), 1, 1, 5);
        write_segment(dir.path(), 2, 6, 5);
        write_segment(dir.path(), 10, 11, 5);
        let manager = manager(&dir);
        manager.open().unwrap();
        (dir, manager)
    }

    #[test]
    fn open_loads_in_id_order() {
        let (_dir, manager) = three_segments();
        let starts: Vec<u64> = manager.segments().iter().map(|s| s.index()).collect();
        assert_eq!(starts, vec![1, 6, 11]);
        assert_eq!(manager.get_current_segment().unwrap().id(), 10);
        assert!(manager.is_open());
    }

    #[test]
    fn get_segment_resolves_ranges() {
        let (_dir, manager) = three_segments();
        assert_eq!(manager.get_segment(1).unwrap().index(), 1);
        assert_eq!(manager.get_segment(5).unwrap().index(), 1);
        assert_eq!(manager.get_segment(6).unwrap().index(), 6);
        assert_eq!(manager.get_segment(11).unwrap().index(), 11);
        assert_eq!(manager.get_segment(1000).unwrap().index(), 11);
    }

    #[test]
    fn get_segment_below_first_returns_first() {
        let dir = tempdir().unwrap();
        write_segment(dir.path(), 1, 50, 3);
        let manager = manager(&dir);
        manager.open().unwrap();
        assert_eq!(manager.get_segment(3).unwrap().index(), 50);
    }

    #[test]
    fn next_segment() {
        let (_dir, manager) = three_segments();
        assert_eq!(manager.get_next_segment(1).unwrap().index(), 6);
        assert_eq!(manager.get_next_segment(6).unwrap().index(), 11);
        assert!(manager.get_next_segment(11).is_none());
    }

    #[test]
    fn asqn_is_carried_across_segments() {
        let (_dir, manager) = three_segments();
        let segments = manager.segments();
        assert_eq!(segments[0].initial_asqn(), ASQN_IGNORE);
        assert_eq!(segments[1].initial_asqn(), 5);
        assert_eq!(segments[2].initial_asqn(), 10);
    }

    #[test]
    fn empty_directory_fails() {
        let dir = tempdir().unwrap();
        let manager = manager(&dir);
        let err = manager.open().unwrap_err();
        assert!(matches!(err, JournalError::NoSegments { .. }));
        assert!(!manager.is_open());
    }

    #[test]
    fn missing_directory_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("log");
        let config = JournalConfig::new(&path, NAME);
        let manager = SegmentsManager::new(&config, Arc::new(SparseJournalIndex::new(1)));
        assert!(matches!(
            manager.open().unwrap_err(),
            JournalError::NoSegments { .. }
        ));
        assert!(path.is_dir());
    }

    #[test]
    fn gap_between_segments_is_corruption() {
        let dir = tempdir().unwrap();
        write_segment(dir.path(), 1, 1, 5);
        write_segment(dir.path(), 2, 8, 5);
        let manager = manager(&dir);
        assert!(manager.open().unwrap_err().is_corruption());
        assert_eq!(manager.segment_count(), 0);
        assert!(manager.open().is_err());
    }

    #[test]
    fn empty_segment_followed_by_same_start_is_corruption() {
        let dir = tempdir().unwrap();
        write_segment(dir.path(), 1, 1, 0);
        write_segment(dir.path(), 2, 1, 3);
        let manager = manager(&dir);
        assert!(manager.open().unwrap_err().is_corruption());
    }

    #[test]
    fn open_twice_fails() {
        let (_dir, manager) = three_segments();
        assert!(matches!(
            manager.open().unwrap_err(),
            JournalError::InvalidState { .. }
        ));
    }

    #[test]
    fn close_before_open_keeps_manager_openable() {
        let dir = tempdir().unwrap();
        write_segment(dir.path(), 1, 1, 3);
        let manager = manager(&dir);

        manager.close();
        manager.open().unwrap();
        assert_eq!(manager.segment_count(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let (_dir, manager) = three_segments();
        let segment = manager.get_first_segment().unwrap();

        manager.close();
        manager.close();

        assert!(!manager.is_open());
        assert!(!segment.is_open());
        assert!(manager.get_current_segment().is_none());
        assert!(manager.get_segment(1).is_none());
        assert_eq!(manager.segment_count(), 0);
        assert!(manager.journal_index().lookup(1).is_none());
    }
}

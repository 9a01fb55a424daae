//! A single memory-mapped segment.

use crate::descriptor::{file_name_of, read_version, SegmentDescriptor};
use crate::error::{JournalError, JournalResult};
use crate::index::{IndexInfo, JournalIndex};
use crate::record::{read_frame, Frame, JournalRecord};
use crate::segment::reader::SegmentReader;
use memmap2::{MmapMut, MmapOptions};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// One segment file of a journal, mapped read/write into memory.
///
/// A segment is created once while the journal is opened and never changes
/// afterwards. The mapping is released by [`Segment::close`]; reads after
/// that fail instead of touching unmapped memory.
pub struct Segment {
    path: PathBuf,
    file_name: String,
    descriptor: SegmentDescriptor,
    file_size: u64,
    mapped_len: usize,
    buffer: RwLock<Option<MmapMut>>,
    initial_asqn: i64,
    last_written_asqn: i64,
    last_index: u64,
    last_position: Option<usize>,
    record_count: u64,
    index: Arc<dyn JournalIndex>,
}

/// Summary of the records found while loading a segment.
struct Scan {
    last_written_asqn: i64,
    last_index: u64,
    last_position: Option<usize>,
    record_count: u64,
}

impl Segment {
    /// Opens and maps an existing segment file.
    ///
    /// # Arguments
    ///
    /// * `path` - The segment file
    /// * `file_size` - Size of the file when it was discovered
    /// * `last_written_asqn` - Last ASQN written before this segment
    /// * `index` - Sparse index shared by all segments of the journal
    ///
    /// If the descriptor declares a capacity larger than `file_size`, the
    /// file is grown to that capacity and mapped again at full size.
    ///
    /// # Errors
    ///
    /// - [`JournalError::SegmentIo`] if the file can't be opened, grown, or mapped
    /// - [`JournalError::Corrupted`] if the descriptor or a record is invalid
    /// - [`JournalError::NothingRead`] if the version byte couldn't be read
    pub fn load(
        path: &Path,
        file_size: u64,
        last_written_asqn: i64,
        index: Arc<dyn JournalIndex>,
    ) -> JournalResult<Self> {
        let file_name = file_name_of(path);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| JournalError::segment_io(path, e))?;

        read_version(&mut file, path)?;

        let mut buffer = map_segment(&file, file_size, path)?;
        let descriptor = SegmentDescriptor::read_from(&buffer, &file_name)?;

        let max_segment_size = u64::from(descriptor.max_segment_size);
        if max_segment_size > file_size {
            debug!(
                segment = %file_name,
                file_size,
                max_segment_size,
                "Remapping segment with its declared size"
            );
            drop(buffer);
            file.set_len(max_segment_size)
                .map_err(|e| JournalError::segment_io(path, e))?;
            buffer = map_segment(&file, max_segment_size, path)?;
        }

        let scan = scan_records(
            &buffer,
            &descriptor,
            &file_name,
            last_written_asqn,
            index.as_ref(),
        )?;

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            descriptor,
            file_size,
            mapped_len: buffer.len(),
            buffer: RwLock::new(Some(buffer)),
            initial_asqn: last_written_asqn,
            last_written_asqn: scan.last_written_asqn,
            last_index: scan.last_index,
            last_position: scan.last_position,
            record_count: scan.record_count,
            index,
        })
    }

    /// Returns the first log index of this segment.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.descriptor.index
    }

    /// Returns the segment id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.descriptor.id
    }

    /// Returns the segment descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &SegmentDescriptor {
        &self.descriptor
    }

    /// Returns the path of the segment file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name of the segment file.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the file size at discovery time.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns the length of the mapped region.
    #[must_use]
    pub fn mapped_len(&self) -> usize {
        self.mapped_len
    }

    /// Returns the last ASQN written before this segment.
    #[must_use]
    pub fn initial_asqn(&self) -> i64 {
        self.initial_asqn
    }

    /// Returns the highest ASQN written in or before this segment.
    #[must_use]
    pub fn last_written_asqn(&self) -> i64 {
        self.last_written_asqn
    }

    /// Returns the index of the last record, or `index() - 1` if empty.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    /// Returns the position of the last record frame, if any.
    #[must_use]
    pub fn last_position(&self) -> Option<usize> {
        self.last_position
    }

    /// Returns the number of records in this segment.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Returns true if this segment holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Returns true until the segment is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.buffer.read().is_some()
    }

    /// Returns the position of the first record frame.
    #[must_use]
    pub fn first_position(&self) -> usize {
        self.descriptor.encoded_len()
    }

    /// Looks up the closest indexed position at or below `index` within this segment.
    #[must_use]
    pub fn lookup(&self, index: u64) -> Option<IndexInfo> {
        self.index
            .lookup(index.min(self.last_index))
            .filter(|info| info.index >= self.index() && info.index <= self.last_index)
    }

    /// Reads the record frame at `position`.
    ///
    /// Returns the record and the position of the following frame, or
    /// `None` if there is no complete record at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidState`] if the segment is closed, or
    /// [`JournalError::Corrupted`] if the frame is invalid.
    pub fn read_record_at(&self, position: usize) -> JournalResult<Option<(JournalRecord, usize)>> {
        let buffer = self.buffer.read();
        let Some(buffer) = buffer.as_ref() else {
            return Err(JournalError::invalid_state(format!(
                "segment '{}' is closed",
                self.file_name
            )));
        };

        match read_frame(buffer, position, &self.file_name)? {
            Frame::Record {
                record,
                next_position,
            } => Ok(Some((record, next_position))),
            Frame::End | Frame::Torn { .. } => Ok(None),
        }
    }

    /// Creates a reader positioned at the first record of this segment.
    #[must_use]
    pub fn reader(self: &Arc<Self>) -> SegmentReader {
        SegmentReader::new(Arc::clone(self))
    }

    /// Unmaps the segment. Calling this more than once has no effect.
    pub fn close(&self) {
        if let Some(buffer) = self.buffer.write().take() {
            drop(buffer);
            debug!(segment = %self.file_name, "Unmapped segment");
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("file_name", &self.file_name)
            .field("descriptor", &self.descriptor)
            .field("last_index", &self.last_index)
            .field("last_written_asqn", &self.last_written_asqn)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

fn map_segment(file: &File, len: u64, path: &Path) -> JournalResult<MmapMut> {
    let len = usize::try_from(len).map_err(|_| {
        JournalError::segment_io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("segment size {len} exceeds the address space"),
            ),
        )
    })?;

    // SAFETY: the file is opened read/write and at least `len` bytes long.
    // Journal files are only written by a separate writer process that
    // appends into zero-filled space; readers validate every frame before
    // use, so concurrent appends can at worst be observed as a torn tail.
    #[allow(unsafe_code)]
    let buffer = unsafe { MmapOptions::new().len(len).map_mut(file) };
    buffer.map_err(|e| JournalError::segment_io(path, e))
}

fn scan_records(
    buffer: &[u8],
    descriptor: &SegmentDescriptor,
    segment: &str,
    mut last_written_asqn: i64,
    index: &dyn JournalIndex,
) -> JournalResult<Scan> {
    let mut position = descriptor.encoded_len();
    let mut expected_index = descriptor.index;
    let mut last_position = None;
    let mut record_count = 0;

    loop {
        let (record, next_position) = match read_frame(buffer, position, segment)? {
            Frame::Record {
                record,
                next_position,
            } => (record, next_position),
            Frame::End => break,
            Frame::Torn { reason } => {
                warn!(segment, position, reason = %reason, "Ignoring partially written record");
                break;
            }
        };

        if record.index != expected_index {
            return Err(JournalError::corrupted(
                segment,
                format!(
                    "expected record with index {expected_index} at position {position}, but found {}",
                    record.index
                ),
            ));
        }

        if record.has_asqn() {
            if record.asqn <= last_written_asqn {
                return Err(JournalError::corrupted(
                    segment,
                    format!(
                        "record {} has ASQN {}, but ASQN {last_written_asqn} was already written",
                        record.index, record.asqn
                    ),
                ));
            }
            last_written_asqn = record.asqn;
        }

        let info = IndexInfo {
            index: record.index,
            position,
        };
        if record_count == 0 {
            index.index_segment_start(info);
        } else {
            index.index(info);
        }

        last_position = Some(position);
        record_count += 1;
        expected_index += 1;
        position = next_position;
    }

    Ok(Scan {
        last_written_asqn,
        last_index: expected_index - 1,
        last_position,
        record_count,
    })
}

//! On-disk journal fixtures.
//!
//! Lays out segment files the way the raft writer would, so journals can be
//! opened and inspected from tests without a running broker.

use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zdb_journal::{
    segment_file_name, JournalConfig, JournalRecord, JournalResult, MetaStoreRecord,
    RaftConfiguration, SegmentDescriptor, SegmentedJournal, ASQN_IGNORE, CONFIG_EXTENSION,
    META_EXTENSION, VERSION_1,
};

/// Log name used by fixtures unless told otherwise.
pub const DEFAULT_LOG_NAME: &str = "raft-partition-partition-1";

/// Declared capacity of fixture segments unless told otherwise.
pub const DEFAULT_SEGMENT_SIZE: u32 = 64 * 1024;

/// Builds the bytes of one segment file.
#[derive(Debug, Clone)]
pub struct SegmentFileBuilder {
    descriptor: SegmentDescriptor,
    records: Vec<JournalRecord>,
    file_len: Option<u64>,
}

impl SegmentFileBuilder {
    /// Starts a segment with the given id and first index.
    #[must_use]
    pub fn new(id: u64, index: u64) -> Self {
        Self {
            descriptor: SegmentDescriptor::new(id, index, DEFAULT_SEGMENT_SIZE),
            records: Vec::new(),
            file_len: None,
        }
    }

    /// Writes a version 1 descriptor instead of the current version.
    #[must_use]
    pub fn legacy_descriptor(mut self) -> Self {
        self.descriptor.version = VERSION_1;
        self
    }

    /// Sets the declared capacity.
    #[must_use]
    pub fn max_segment_size(mut self, size: u32) -> Self {
        self.descriptor.max_segment_size = size;
        self
    }

    /// Sets the size of the file on disk. Defaults to the declared capacity.
    ///
    /// A length below the declared capacity simulates a pre-created segment
    /// that hasn't been widened yet.
    #[must_use]
    pub fn file_len(mut self, len: u64) -> Self {
        self.file_len = Some(len);
        self
    }

    /// Appends a record carrying the next index.
    #[must_use]
    pub fn record(mut self, asqn: i64, data: impl Into<Vec<u8>>) -> Self {
        let index = self.next_index();
        self.records.push(JournalRecord::new(index, asqn, data.into()));
        self
    }

    /// Appends `count` records with ASQNs counting up from `first_asqn`.
    #[must_use]
    pub fn records(mut self, count: usize, first_asqn: i64) -> Self {
        for i in 0..count {
            let asqn = first_asqn + i as i64;
            let index = self.next_index();
            self.records
                .push(JournalRecord::new(index, asqn, format!("entry-{index}").into_bytes()));
        }
        self
    }

    /// Returns the descriptor that will be written.
    #[must_use]
    pub fn descriptor(&self) -> &SegmentDescriptor {
        &self.descriptor
    }

    /// Returns the records that will be written.
    #[must_use]
    pub fn record_list(&self) -> &[JournalRecord] {
        &self.records
    }

    /// Returns the index the next appended record would carry.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.descriptor.index + self.records.len() as u64
    }

    /// Returns the highest ASQN among the records, if any has one.
    #[must_use]
    pub fn last_asqn(&self) -> Option<i64> {
        self.records
            .iter()
            .filter(|r| r.has_asqn())
            .map(|r| r.asqn)
            .max()
    }

    /// Encodes the segment file.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        let mut data = self.descriptor.encode();
        for record in &self.records {
            data.extend_from_slice(&record.encode());
        }
        let len = self
            .file_len
            .unwrap_or_else(|| u64::from(self.descriptor.max_segment_size));
        let len = usize::try_from(len).expect("file length fits in memory");
        if len > data.len() {
            data.resize(len, 0);
        }
        data
    }

    /// Writes the segment file to `path`.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.bytes())
    }
}

/// A journal directory in a temporary location.
///
/// Segments added through the fixture are contiguous: each starts after the
/// last index of the previous one and continues its ASQNs.
#[derive(Debug)]
pub struct JournalFixture {
    dir: TempDir,
    name: String,
    next_id: u64,
    next_index: u64,
    next_asqn: i64,
}

impl JournalFixture {
    /// Creates an empty journal directory using [`DEFAULT_LOG_NAME`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_name(DEFAULT_LOG_NAME)
    }

    /// Creates an empty journal directory for the log `name`.
    #[must_use]
    pub fn with_name(name: &str) -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            name: name.to_string(),
            next_id: 1,
            next_index: 1,
            next_asqn: 1,
        }
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the log name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a configuration for this journal that never creates directories.
    #[must_use]
    pub fn config(&self) -> JournalConfig {
        JournalConfig::new(self.path(), self.name.as_str())
            .index_density(4)
            .create_if_missing(false)
    }

    /// Opens the journal.
    pub fn open(&self) -> JournalResult<SegmentedJournal> {
        SegmentedJournal::open(self.config())
    }

    /// Returns the path of segment `id`.
    #[must_use]
    pub fn segment_path(&self, id: u64) -> PathBuf {
        self.path().join(segment_file_name(&self.name, id))
    }

    /// Returns a builder for the next contiguous segment.
    #[must_use]
    pub fn next_segment(&self) -> SegmentFileBuilder {
        SegmentFileBuilder::new(self.next_id, self.next_index)
    }

    /// Adds a segment holding `records` entries with fresh ASQNs.
    pub fn add_segment(&mut self, records: usize) -> PathBuf {
        let builder = self.next_segment().records(records, self.next_asqn);
        self.write_segment(&builder)
    }

    /// Writes `builder` as segment `builder.descriptor().id` and advances
    /// the fixture past it.
    pub fn write_segment(&mut self, builder: &SegmentFileBuilder) -> PathBuf {
        let descriptor = builder.descriptor();
        let path = self.segment_path(descriptor.id);
        builder.write_to(&path).expect("Failed to write segment");

        self.next_id = self.next_id.max(descriptor.id + 1);
        self.next_index = self.next_index.max(builder.next_index());
        if let Some(asqn) = builder.last_asqn() {
            self.next_asqn = self.next_asqn.max(asqn + 1);
        }
        path
    }

    /// Returns the ASQN the next added record receives.
    #[must_use]
    pub fn next_asqn(&self) -> i64 {
        self.next_asqn
    }

    /// Returns the highest ASQN written so far, or [`ASQN_IGNORE`].
    #[must_use]
    pub fn last_asqn(&self) -> i64 {
        if self.next_asqn > 1 {
            self.next_asqn - 1
        } else {
            ASQN_IGNORE
        }
    }

    /// Returns the index the next added record receives.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Writes an arbitrary file into the journal directory.
    pub fn write_file(&self, file_name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path().join(file_name);
        fs::write(&path, contents).expect("Failed to write file");
        path
    }

    /// Writes the raft meta store of this log.
    pub fn write_meta(&self, record: &MetaStoreRecord) -> PathBuf {
        self.write_file(&format!("{}.{META_EXTENSION}", self.name), &record.encode())
    }

    /// Writes the raft member configuration of this log.
    pub fn write_config(&self, config: &RaftConfiguration) -> PathBuf {
        self.write_file(&format!("{}.{CONFIG_EXTENSION}", self.name), &config.encode())
    }

    /// Truncates segment `id` to `len` bytes.
    pub fn truncate(&self, id: u64, len: u64) {
        OpenOptions::new()
            .write(true)
            .open(self.segment_path(id))
            .and_then(|file| file.set_len(len))
            .expect("Failed to truncate segment");
    }

    /// Overwrites the byte at `offset` in segment `id`.
    pub fn overwrite(&self, id: u64, offset: u64, value: u8) {
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.segment_path(id))
            .expect("Failed to open segment");
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(&[value]))
            .expect("Failed to overwrite segment byte");
    }
}

impl Default for JournalFixture {
    fn default() -> Self {
        Self::new()
    }
}

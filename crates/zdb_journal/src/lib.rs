//! # ZDB Journal
//!
//! Read-only loader for segmented raft journals.
//!
//! A journal is a directory of segment files named `<name>-<id>.log`. Each
//! file starts with a [`SegmentDescriptor`] followed by record frames. This
//! crate discovers those files, validates and memory-maps them, indexes their
//! records, and offers ordered navigation across segment boundaries.
//!
//! The raft meta store and member configuration kept beside the segments
//! are read by [`MetaStoreReader`].
//!
//! ## Design Principles
//!
//! - Nothing is ever written to a segment; files are produced by a separate writer
//! - Corruption is fatal to [`SegmentsManager::open`]; there is no partial open
//! - Mappings are released on [`SegmentsManager::close`], not on drop of a reader
//! - Errors carry an [`ErrorKind`] so callers branch on kind, not on variant
//!
//! ## Example
//!
//! ```rust,ignore
//! use zdb_journal::{JournalConfig, SegmentedJournal};
//!
//! let config = JournalConfig::new("data/partitions/1", "raft-partition-partition-1");
//! let journal = SegmentedJournal::open(config)?;
//!
//! let mut reader = journal.reader();
//! reader.seek(42)?;
//! if let Some(record) = reader.next() {
//!     println!("{:?}", record?);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod descriptor;
mod error;
mod index;
mod journal;
mod raft;
mod record;
mod segment;

pub use config::{JournalConfig, DEFAULT_INDEX_DENSITY};
pub use descriptor::{
    read_version, SegmentDescriptor, VERSION_1, VERSION_1_LENGTH, VERSION_2, VERSION_2_LENGTH,
};
pub use error::{ErrorKind, JournalError, JournalResult};
pub use index::{IndexInfo, JournalIndex, SparseJournalIndex};
pub use journal::{JournalReader, SegmentedJournal};
pub use raft::{
    MemberType, MetaStoreReader, MetaStoreRecord, RaftConfiguration, RaftMember, RaftStatus,
    CONFIG_EXTENSION, METADATA_VERSION, META_EXTENSION,
};
pub use record::{
    JournalRecord, ASQN_IGNORE, FRAME_HEADER_LENGTH, FRAME_UNWRITTEN, FRAME_VALID,
    RECORD_HEADER_LENGTH,
};
pub use segment::{
    is_segment_file, list_segment_files, segment_file_name, segment_id_from_name, Segment,
    SegmentFile, SegmentReader, SegmentsManager, SEGMENT_EXTENSION,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

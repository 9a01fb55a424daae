//! Error types for journal loading and navigation.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Coarse classification of a [`JournalError`].
///
/// Callers branch on the kind rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A read produced no data or an I/O call failed. Retrying at a higher
    /// layer may succeed; the journal never retries on its own.
    Transient,
    /// On-disk data is truncated or unrecognizable. Never retried or repaired.
    Corruption,
    /// The directory or the manager is not in a usable state.
    InvariantViolation,
}

/// Errors that can occur while loading or reading a segmented journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// A read returned nothing where data was expected.
    #[error("expected to read {what} of segment '{segment}', but nothing was read")]
    NothingRead {
        /// What was being read (e.g. "the version byte").
        what: &'static str,
        /// File name of the segment.
        segment: String,
    },

    /// Opening, sizing, or mapping a segment file failed.
    #[error("failed to load existing segment {}: {source}", path.display())]
    SegmentIo {
        /// Path of the segment file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A segment file is truncated or its contents are unrecognizable.
    #[error("segment '{segment}' is corrupted: {reason}")]
    Corrupted {
        /// File name of the segment.
        segment: String,
        /// What was found to be wrong.
        reason: String,
    },

    /// The journal directory could not be listed.
    #[error(
        "could not list files in directory '{}'; either the path doesn't point to a directory or an I/O error occurred: {source}",
        path.display()
    )]
    DirectoryUnreadable {
        /// Path of the journal directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The journal directory contains no segment files.
    #[error("expected to read segments in '{}', but there was nothing to read", path.display())]
    NoSegments {
        /// Path of the journal directory.
        path: PathBuf,
    },

    /// Reading a raft metadata file failed.
    #[error("failed to read raft metadata {}: {source}", path.display())]
    MetadataIo {
        /// Path of the metadata file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A raft metadata file is truncated or its contents are unrecognizable.
    #[error("raft metadata '{}' is corrupted: {reason}", path.display())]
    MetadataCorrupted {
        /// Path of the metadata file.
        path: PathBuf,
        /// What was found to be wrong.
        reason: String,
    },

    /// Operation not permitted in the current lifecycle state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl JournalError {
    /// Creates a corruption error for the named segment.
    pub fn corrupted(segment: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            segment: segment.into(),
            reason: reason.into(),
        }
    }

    /// Creates a "nothing was read" error for the named segment.
    pub fn nothing_read(what: &'static str, segment: impl Into<String>) -> Self {
        Self::NothingRead {
            what,
            segment: segment.into(),
        }
    }

    /// Wraps an I/O error raised while loading the segment at `path`.
    pub fn segment_io(path: &Path, source: io::Error) -> Self {
        Self::SegmentIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Wraps an I/O error raised while reading the metadata file at `path`.
    pub fn metadata_io(path: &Path, source: io::Error) -> Self {
        Self::MetadataIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Creates a corruption error for the metadata file at `path`.
    pub fn metadata_corrupted(path: &Path, reason: impl Into<String>) -> Self {
        Self::MetadataCorrupted {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NothingRead { .. } | Self::SegmentIo { .. } | Self::MetadataIo { .. } => {
                ErrorKind::Transient
            }
            Self::Corrupted { .. } | Self::MetadataCorrupted { .. } => ErrorKind::Corruption,
            Self::DirectoryUnreadable { .. } | Self::NoSegments { .. } | Self::InvalidState { .. } => {
                ErrorKind::InvariantViolation
            }
        }
    }

    /// Returns true if this error reports corrupted on-disk data.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::Corruption
    }

    /// Returns true if this error reports a transient read or I/O fault.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            JournalError::nothing_read("the version byte", "log-1.log").kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            JournalError::corrupted("log-1.log", "unknown version 9").kind(),
            ErrorKind::Corruption
        );
        assert_eq!(
            JournalError::NoSegments {
                path: PathBuf::from("/tmp/log")
            }
            .kind(),
            ErrorKind::InvariantViolation
        );
    }

    #[test]
    fn segment_io_keeps_path() {
        let err = JournalError::segment_io(
            Path::new("/data/raft-1.log"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/data/raft-1.log"));
        assert!(message.contains("denied"));
        assert!(err.is_transient());
    }

    #[test]
    fn metadata_errors() {
        let path = Path::new("/data/1/raft-partition-partition-1.meta");
        let missing = JournalError::metadata_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(missing.is_transient());
        assert!(missing.to_string().contains("raft-partition-partition-1.meta"));

        let truncated = JournalError::metadata_corrupted(path, "file ends early");
        assert_eq!(truncated.kind(), ErrorKind::Corruption);
    }

    #[test]
    fn corrupted_names_segment() {
        let err = JournalError::corrupted("raft-3.log", "got EOF instead");
        assert!(err.to_string().contains("raft-3.log"));
        assert!(err.is_corruption());
        assert!(!err.is_transient());
    }
}

//! Segment descriptor codec.
//!
//! Every segment file starts with a descriptor identifying its format
//! version, its id, the first log index it holds, and its full capacity.
//!
//! ## Layout
//!
//! ```text
//! version 1: | version (1) | id (8) | index (8) | max_segment_size (4) |
//! version 2: | version (1) | id (8) | index (8) | max_segment_size (4) |
//!            | last_index (8) | last_position (8) | checksum (4) |
//! ```
//!
//! All integers are little-endian. The version 2 checksum is a CRC32 over
//! every preceding descriptor byte.
//!
//! ## Failure classification
//!
//! - Nothing to read at all → [`ErrorKind::Transient`](crate::ErrorKind::Transient)
//! - EOF before the version byte, unknown version, truncated or invalid
//!   fields → [`ErrorKind::Corruption`](crate::ErrorKind::Corruption)

use crate::error::{JournalError, JournalResult};
use serde::Serialize;
use std::io::{self, Read};
use std::path::Path;

/// Legacy descriptor without last-entry bookkeeping.
pub const VERSION_1: u8 = 1;

/// Current descriptor version.
pub const VERSION_2: u8 = 2;

/// Encoded length of a version 1 descriptor.
pub const VERSION_1_LENGTH: usize = 1 + 8 + 8 + 4;

/// Encoded length of a version 2 descriptor.
pub const VERSION_2_LENGTH: usize = VERSION_1_LENGTH + 8 + 8 + 4;

const CHECKSUM_OFFSET: usize = VERSION_2_LENGTH - 4;

/// Immutable header at the start of a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentDescriptor {
    /// Format version.
    pub version: u8,
    /// Monotonic segment identifier.
    pub id: u64,
    /// First log index held by the segment.
    pub index: u64,
    /// Declared capacity of the segment file in bytes.
    pub max_segment_size: u32,
    /// Index of the last record, as recorded by the writer (0 if unknown).
    pub last_index: u64,
    /// Byte offset of the last record frame (0 if unknown).
    pub last_position: u64,
}

impl SegmentDescriptor {
    /// Creates a current-version descriptor without last-entry bookkeeping.
    #[must_use]
    pub const fn new(id: u64, index: u64, max_segment_size: u32) -> Self {
        Self {
            version: VERSION_2,
            id,
            index,
            max_segment_size,
            last_index: 0,
            last_position: 0,
        }
    }

    /// Returns true if `version` is a descriptor version this codec understands.
    #[must_use]
    pub const fn is_supported_version(version: u8) -> bool {
        matches!(version, VERSION_1 | VERSION_2)
    }

    /// Returns the encoded length of a descriptor of the given version.
    #[must_use]
    pub const fn encoded_len_of(version: u8) -> Option<usize> {
        match version {
            VERSION_1 => Some(VERSION_1_LENGTH),
            VERSION_2 => Some(VERSION_2_LENGTH),
            _ => None,
        }
    }

    /// Returns the encoded length of this descriptor.
    ///
    /// Records start at this offset within the segment.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        match self.version {
            VERSION_1 => VERSION_1_LENGTH,
            _ => VERSION_2_LENGTH,
        }
    }

    /// Parses a descriptor from the start of `buf`.
    ///
    /// `segment` names the file in error messages.
    ///
    /// # Errors
    ///
    /// - [`JournalError::NothingRead`] if `buf` is empty
    /// - [`JournalError::Corrupted`] if the version is unknown, the buffer is
    ///   shorter than the version's layout, or a field fails validation
    pub fn read_from(buf: &[u8], segment: &str) -> JournalResult<Self> {
        let Some(&version) = buf.first() else {
            return Err(JournalError::nothing_read("the descriptor", segment));
        };

        let Some(length) = Self::encoded_len_of(version) else {
            return Err(JournalError::corrupted(
                segment,
                format!("couldn't read or recognize version {version}"),
            ));
        };

        if buf.len() < length {
            return Err(JournalError::corrupted(
                segment,
                format!(
                    "descriptor version {version} needs {length} bytes, but only {} are present",
                    buf.len()
                ),
            ));
        }

        let descriptor = Self {
            version,
            id: read_u64(buf, 1),
            index: read_u64(buf, 9),
            max_segment_size: read_u32(buf, 17),
            last_index: if version == VERSION_2 { read_u64(buf, 21) } else { 0 },
            last_position: if version == VERSION_2 { read_u64(buf, 29) } else { 0 },
        };

        if version == VERSION_2 {
            let stored = read_u32(buf, CHECKSUM_OFFSET);
            let computed = crc32fast::hash(&buf[..CHECKSUM_OFFSET]);
            if stored != computed {
                return Err(JournalError::corrupted(
                    segment,
                    format!("descriptor checksum mismatch: expected {stored:08x}, got {computed:08x}"),
                ));
            }
        }

        descriptor.validate(segment)?;
        Ok(descriptor)
    }

    fn validate(&self, segment: &str) -> JournalResult<()> {
        if self.id == 0 {
            return Err(JournalError::corrupted(segment, "descriptor id must be at least 1"));
        }
        if self.index == 0 {
            return Err(JournalError::corrupted(segment, "descriptor index must be at least 1"));
        }
        let length = self.encoded_len();
        if (self.max_segment_size as usize) < length {
            return Err(JournalError::corrupted(
                segment,
                format!(
                    "max segment size {} cannot hold a {length} byte descriptor",
                    self.max_segment_size
                ),
            ));
        }
        if self.last_position != 0
            && (self.last_position < length as u64
                || self.last_position >= u64::from(self.max_segment_size))
        {
            return Err(JournalError::corrupted(
                segment,
                format!(
                    "last position {} lies outside the segment (descriptor {length}, capacity {})",
                    self.last_position, self.max_segment_size
                ),
            ));
        }
        if self.last_index != 0 && self.last_index.saturating_add(1) < self.index {
            return Err(JournalError::corrupted(
                segment,
                format!(
                    "last index {} precedes first index {}",
                    self.last_index, self.index
                ),
            ));
        }
        Ok(())
    }

    /// Encodes the descriptor in its version's layout.
    ///
    /// The journal never writes descriptors; this exists for fixtures and
    /// tooling that lay out segment files.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.version);
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&self.max_segment_size.to_le_bytes());

        if self.version != VERSION_1 {
            buf.extend_from_slice(&self.last_index.to_le_bytes());
            buf.extend_from_slice(&self.last_position.to_le_bytes());
            let checksum = crc32fast::hash(&buf);
            buf.extend_from_slice(&checksum.to_le_bytes());
        }

        buf
    }
}

/// Reads the version byte from the start of a segment.
///
/// # Errors
///
/// - [`JournalError::Corrupted`] if the source is at EOF
/// - [`JournalError::NothingRead`] if the read produced nothing without EOF
/// - [`JournalError::Corrupted`] if the version is not supported
/// - [`JournalError::SegmentIo`] for any other I/O failure
pub fn read_version(source: &mut impl Read, path: &Path) -> JournalResult<u8> {
    let segment = file_name_of(path);
    let segment = segment.as_str();
    let mut byte = [0u8; 1];
    match source.read(&mut byte) {
        Ok(0) => Err(JournalError::corrupted(
            segment,
            "expected to read the version byte but got EOF instead",
        )),
        Ok(_) if SegmentDescriptor::is_supported_version(byte[0]) => Ok(byte[0]),
        Ok(_) => Err(JournalError::corrupted(
            segment,
            format!("couldn't read or recognize version {}", byte[0]),
        )),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Err(JournalError::nothing_read("the version byte", segment))
        }
        Err(e) => Err(JournalError::segment_io(path, e)),
    }
}

/// Returns the file name of `path` for use in error messages.
pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

pub(crate) fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const NAME: &str = "raft-1.log";

    #[test]
    fn decode_version_2() {
        let descriptor = SegmentDescriptor::new(3, 200, 4096);
        let decoded = SegmentDescriptor::read_from(&descriptor.encode(), NAME).unwrap();
        assert_eq!(decoded, descriptor);
        assert_eq!(decoded.encoded_len(), VERSION_2_LENGTH);
    }

    #[test]
    fn decode_version_1() {
        let descriptor = SegmentDescriptor {
            version: VERSION_1,
            ..SegmentDescriptor::new(1, 1, 1024)
        };
        let encoded = descriptor.encode();
        assert_eq!(encoded.len(), VERSION_1_LENGTH);

        let decoded = SegmentDescriptor::read_from(&encoded, NAME).unwrap();
        assert_eq!(decoded.version, VERSION_1);
        assert_eq!(decoded.max_segment_size, 1024);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut buf = SegmentDescriptor::new(1, 1, 1024).encode();
        buf.extend_from_slice(&[0xAB; 64]);
        assert!(SegmentDescriptor::read_from(&buf, NAME).is_ok());
    }

    #[test]
    fn empty_buffer_is_transient() {
        let err = SegmentDescriptor::read_from(&[], NAME).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn unknown_version_is_corruption() {
        let mut buf = SegmentDescriptor::new(1, 1, 1024).encode();
        buf[0] = 42;
        let err = SegmentDescriptor::read_from(&buf, NAME).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn truncated_descriptor_is_corruption() {
        let buf = SegmentDescriptor::new(1, 1, 1024).encode();
        let err = SegmentDescriptor::read_from(&buf[..10], NAME).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn checksum_mismatch_is_corruption() {
        let mut buf = SegmentDescriptor::new(1, 1, 1024).encode();
        buf[5] ^= 0xFF;
        let err = SegmentDescriptor::read_from(&buf, NAME).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn invalid_fields_are_corruption() {
        let zero_index = SegmentDescriptor::new(1, 0, 1024).encode();
        assert!(SegmentDescriptor::read_from(&zero_index, NAME)
            .unwrap_err()
            .is_corruption());

        let too_small = SegmentDescriptor::new(1, 1, 8).encode();
        assert!(SegmentDescriptor::read_from(&too_small, NAME)
            .unwrap_err()
            .is_corruption());

        let bad_position = SegmentDescriptor {
            last_position: 4096,
            ..SegmentDescriptor::new(1, 1, 1024)
        }
        .encode();
        assert!(SegmentDescriptor::read_from(&bad_position, NAME)
            .unwrap_err()
            .is_corruption());
    }

    #[test]
    fn read_version_classifies_eof() {
        let mut empty: &[u8] = &[];
        let err = read_version(&mut empty, Path::new(NAME)).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("EOF"));

        let mut valid: &[u8] = &[VERSION_2, 0, 0];
        assert_eq!(read_version(&mut valid, Path::new(NAME)).unwrap(), VERSION_2);
    }

    #[test]
    fn read_version_without_data_is_transient() {
        struct Pending;

        impl Read for Pending {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
        }

        let err = read_version(&mut Pending, Path::new(NAME)).unwrap_err();
        assert!(err.is_transient());
    }
}

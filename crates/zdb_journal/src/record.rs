//! Journal record frames.
//!
//! Records follow the segment descriptor back to back:
//!
//! ```text
//! | frame (1) | checksum (4) | length (4) | index (8) | asqn (8) | data (N) |
//! ```
//!
//! `length` covers `index`, `asqn` and `data`; `checksum` is a CRC32 over
//! those same bytes. A zero frame byte marks space the writer has not
//! reached yet.

use crate::descriptor::{read_u32, read_u64};
use crate::error::{JournalError, JournalResult};
use serde::Serialize;

/// ASQN carried by records that don't take part in ASQN ordering.
pub const ASQN_IGNORE: i64 = -1;

/// Frame byte of space that holds no record.
pub const FRAME_UNWRITTEN: u8 = 0;

/// Frame byte of a complete record.
pub const FRAME_VALID: u8 = 1;

/// frame (1) + checksum (4) + length (4)
pub const FRAME_HEADER_LENGTH: usize = 9;

/// index (8) + asqn (8)
pub const RECORD_HEADER_LENGTH: usize = 16;

/// A record read from a journal segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalRecord {
    /// Logical log index.
    pub index: u64,
    /// Application sequence number, or [`ASQN_IGNORE`].
    pub asqn: i64,
    /// CRC32 over index, asqn and data.
    pub checksum: u32,
    /// Application payload.
    pub data: Vec<u8>,
}

impl JournalRecord {
    /// Creates a record and computes its checksum.
    #[must_use]
    pub fn new(index: u64, asqn: i64, data: Vec<u8>) -> Self {
        let checksum = crc32fast::hash(&body(index, asqn, &data));
        Self {
            index,
            asqn,
            checksum,
            data,
        }
    }

    /// Returns true if this record takes part in ASQN ordering.
    #[must_use]
    pub const fn has_asqn(&self) -> bool {
        self.asqn != ASQN_IGNORE
    }

    /// Returns the number of bytes this record occupies in a segment.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_LENGTH + RECORD_HEADER_LENGTH + self.data.len()
    }

    /// Encodes the record as a frame.
    ///
    /// Used by fixtures; the journal itself only reads frames.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let body = body(self.index, self.asqn, &self.data);
        let mut buf = Vec::with_capacity(FRAME_HEADER_LENGTH + body.len());
        buf.push(FRAME_VALID);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        buf
    }
}

fn body(index: u64, asqn: i64, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(RECORD_HEADER_LENGTH + data.len());
    body.extend_from_slice(&index.to_le_bytes());
    body.extend_from_slice(&asqn.to_le_bytes());
    body.extend_from_slice(data);
    body
}

/// Outcome of reading one frame.
#[derive(Debug)]
pub(crate) enum Frame {
    /// No record at this position.
    End,
    /// A complete record and the position of the frame after it.
    Record {
        record: JournalRecord,
        next_position: usize,
    },
    /// An incomplete write at the tail of the segment.
    Torn { reason: String },
}

/// Reads the frame starting at `position` in `buf`.
///
/// # Errors
///
/// Returns [`JournalError::Corrupted`] for an unknown frame byte, an
/// impossible length, or a checksum mismatch that is followed by more data.
pub(crate) fn read_frame(buf: &[u8], position: usize, segment: &str) -> JournalResult<Frame> {
    let Some(&frame) = buf.get(position) else {
        return Ok(Frame::End);
    };

    match frame {
        FRAME_UNWRITTEN => return Ok(Frame::End),
        FRAME_VALID => {}
        other => {
            return Err(JournalError::corrupted(
                segment,
                format!("unknown frame version {other} at position {position}"),
            ));
        }
    }

    if position + FRAME_HEADER_LENGTH > buf.len() {
        return Ok(Frame::Torn {
            reason: format!("frame header at position {position} is incomplete"),
        });
    }

    let checksum = read_u32(buf, position + 1);
    let length = read_u32(buf, position + 5) as usize;
    if length < RECORD_HEADER_LENGTH {
        return Err(JournalError::corrupted(
            segment,
            format!("record at position {position} declares length {length}"),
        ));
    }

    let start = position + FRAME_HEADER_LENGTH;
    let end = start + length;
    if end > buf.len() {
        return Ok(Frame::Torn {
            reason: format!(
                "record at position {position} declares {length} bytes, only {} remain",
                buf.len() - start
            ),
        });
    }

    let computed = crc32fast::hash(&buf[start..end]);
    if computed != checksum {
        let is_tail = buf.get(end).map_or(true, |&next| next == FRAME_UNWRITTEN);
        if is_tail {
            return Ok(Frame::Torn {
                reason: format!("checksum mismatch in last record at position {position}"),
            });
        }
        return Err(JournalError::corrupted(
            segment,
            format!(
                "checksum mismatch at position {position}: expected {checksum:08x}, got {computed:08x}"
            ),
        ));
    }

    let record = JournalRecord {
        index: read_u64(buf, start),
        asqn: read_u64(buf, start + 8) as i64,
        checksum,
        data: buf[start + RECORD_HEADER_LENGTH..end].to_vec(),
    };

    Ok(Frame::Record {
        record,
        next_position: end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = "raft-1.log";

    fn expect_record(frame: Frame) -> (JournalRecord, usize) {
        match frame {
            Frame::Record {
                record,
                next_position,
            } => (record, next_position),
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[test]
    fn read_back_to_back_frames() {
        let first = JournalRecord::new(1, 10, b"one".to_vec());
        let second = JournalRecord::new(2, ASQN_IGNORE, Vec::new());
        let mut buf = first.encode();
        buf.extend_from_slice(&second.encode());
        buf.extend_from_slice(&[0u8; 32]);

        let (record, next) = expect_record(read_frame(&buf, 0, NAME).unwrap());
        assert_eq!(record, first);
        assert_eq!(next, first.frame_len());

        let (record, next) = expect_record(read_frame(&buf, next, NAME).unwrap());
        assert_eq!(record, second);
        assert!(!record.has_asqn());

        assert!(matches!(read_frame(&buf, next, NAME).unwrap(), Frame::End));
    }

    #[test]
    fn end_of_buffer_is_end() {
        assert!(matches!(read_frame(&[], 0, NAME).unwrap(), Frame::End));
    }

    #[test]
    fn unknown_frame_is_corruption() {
        let mut buf = JournalRecord::new(1, 1, vec![1, 2, 3]).encode();
        buf[0] = 7;
        assert!(read_frame(&buf, 0, NAME).unwrap_err().is_corruption());
    }

    #[test]
    fn truncated_tail_is_torn() {
        let buf = JournalRecord::new(1, 1, vec![9; 20]).encode();
        assert!(matches!(
            read_frame(&buf[..buf.len() - 5], 0, NAME).unwrap(),
            Frame::Torn { .. }
        ));
        assert!(matches!(
            read_frame(&buf[..4], 0, NAME).unwrap(),
            Frame::Torn { .. }
        ));
    }

    #[test]
    fn checksum_mismatch_at_tail_is_torn() {
        let mut buf = JournalRecord::new(1, 1, vec![9; 20]).encode();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert!(matches!(
            read_frame(&buf, 0, NAME).unwrap(),
            Frame::Torn { .. }
        ));
    }

    #[test]
    fn checksum_mismatch_before_more_records_is_corruption() {
        let mut buf = JournalRecord::new(1, 1, vec![9; 20]).encode();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        buf.extend_from_slice(&JournalRecord::new(2, 2, vec![1]).encode());
        assert!(read_frame(&buf, 0, NAME).unwrap_err().is_corruption());
    }

    #[test]
    fn short_length_is_corruption() {
        let mut buf = JournalRecord::new(1, 1, Vec::new()).encode();
        buf[5..9].copy_from_slice(&4u32.to_le_bytes());
        assert!(read_frame(&buf, 0, NAME).unwrap_err().is_corruption());
    }
}

//! Journal segments.
//!
//! A journal is a directory of segment files, each mapped into memory once
//! at open time:
//!
//! ```text
//! | descriptor | record | record | ... | 0 0 0 0 ... (unwritten) |
//! ```
//!
//! The descriptor layout lives in [`crate::descriptor`], the record frame
//! layout in [`crate::record`].

mod file;
mod manager;
mod mapped;
mod reader;

pub use file::{
    is_segment_file, list_segment_files, segment_file_name, segment_id_from_name, SegmentFile,
    SEGMENT_EXTENSION,
};
pub use manager::SegmentsManager;
pub use mapped::Segment;
pub use reader::SegmentReader;

//! Segment file naming and discovery.
//!
//! Segment files are named `<name>-<id>.log`. The id is the ordering key;
//! it is not zero-padded, so lexical file name order is meaningless.

use crate::error::{JournalError, JournalResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extension of segment files.
pub const SEGMENT_EXTENSION: &str = "log";

/// A segment file found in a journal directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// Segment id parsed from the file name.
    pub id: u64,
    /// File size at discovery time.
    pub size: u64,
}

/// Builds the file name of segment `id` of the log `name`.
///
/// Format: `raft-partition-partition-1-7.log`
#[must_use]
pub fn segment_file_name(name: &str, id: u64) -> String {
    format!("{name}-{id}.{SEGMENT_EXTENSION}")
}

/// Returns true if `file_name` names a segment of the log `name`.
#[must_use]
pub fn is_segment_file(name: &str, file_name: &str) -> bool {
    file_name
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_suffix(SEGMENT_EXTENSION))
        .and_then(|rest| rest.strip_suffix('.'))
        .is_some_and(is_segment_id)
}

/// Extracts the segment id from a segment file name.
///
/// The id is the text between the last `-` and the extension. Returns
/// `None` if there is no such text or it isn't a base-10 number.
#[must_use]
pub fn segment_id_from_name(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
    let (_, id) = stem.rsplit_once('-')?;
    if !is_segment_id(id) {
        return None;
    }
    id.parse().ok()
}

fn is_segment_id(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

/// Lists the segment files of log `name` in `directory`, sorted by id.
///
/// Only regular files (symlinks are followed) matching the naming
/// convention are returned; everything else is ignored. A matching file
/// whose id overflows `u64` is skipped with a warning.
///
/// # Errors
///
/// Returns [`JournalError::DirectoryUnreadable`] if the directory can't be
/// listed.
pub fn list_segment_files(directory: &Path, name: &str) -> JournalResult<Vec<SegmentFile>> {
    let unreadable = |source: std::io::Error| JournalError::DirectoryUnreadable {
        path: directory.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(directory).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !is_segment_file(name, file_name) {
            continue;
        }

        let path = entry.path();
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        let Some(id) = segment_id_from_name(file_name) else {
            warn!(
                file = %file_name,
                dir = %directory.display(),
                "Skipping segment file whose id doesn't fit in 64 bits"
            );
            continue;
        };
        files.push(SegmentFile {
            path,
            id,
            size: metadata.len(),
        });
    }

    files.sort_by_key(|file| file.id);

    debug!(
        count = files.len(),
        dir = %directory.display(),
        "Discovered segment files"
    );

    Ok(files)
}

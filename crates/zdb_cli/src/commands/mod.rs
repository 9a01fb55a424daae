//! CLI command implementations.

pub mod entries;
pub mod inspect;
pub mod raft;
pub mod segments;

use std::path::Path;
use zdb_journal::JournalConfig;

/// Prefix of the raft log name; the partition id is appended.
const LOG_NAME_PREFIX: &str = "raft-partition-partition-";

/// Derives the log name of the partition stored in `path`.
///
/// Partition directories are named after the partition id, e.g.
/// `data/raft-partition/partitions/1` holds `raft-partition-partition-1`.
pub fn default_log_name(path: &Path) -> String {
    let partition = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{LOG_NAME_PREFIX}{partition}")
}

/// Builds the journal configuration for a partition directory.
///
/// Inspection never creates directories.
pub fn journal_config(path: &Path, name: Option<&str>, index_density: u64) -> JournalConfig {
    let name = name.map_or_else(|| default_log_name(path), str::to_string);
    JournalConfig::new(path, name)
        .index_density(index_density)
        .create_if_missing(false)
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_name_from_partition_dir() {
        assert_eq!(
            default_log_name(Path::new("/usr/local/zeebe/data/raft-partition/partitions/3")),
            "raft-partition-partition-3"
        );
    }

    #[test]
    fn explicit_name_wins() {
        let config = journal_config(Path::new("/data/1"), Some("journal"), 10);
        assert_eq!(config.name, "journal");
        assert_eq!(config.index_density, 10);
        assert!(!config.create_if_missing);
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512");
        assert_eq!(format_size(64 * 1024), "64.0 KB");
        assert_eq!(format_size(64 * 1024 * 1024), "64.0 MB");
    }
}

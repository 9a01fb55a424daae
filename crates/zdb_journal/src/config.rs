//! Journal configuration.

use std::path::{Path, PathBuf};

/// Default number of records between two sparse index entries.
pub const DEFAULT_INDEX_DENSITY: u64 = 100;

/// Configuration for opening a segmented journal.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory holding the segment files.
    pub directory: PathBuf,

    /// Log name; segment files are named `<name>-<id>.log`.
    pub name: String,

    /// Every `index_density`-th record is kept in the sparse index.
    pub index_density: u64,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            name: String::from("journal"),
            index_density: DEFAULT_INDEX_DENSITY,
            create_if_missing: true,
        }
    }
}

impl JournalConfig {
    /// Creates a configuration for the log `name` in `directory`.
    #[must_use]
    pub fn new(directory: impl AsRef<Path>, name: impl Into<String>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the sparse index density. Zero is treated as one.
    #[must_use]
    pub const fn index_density(mut self, density: u64) -> Self {
        self.index_density = if density == 0 { 1 } else { density };
        self
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = JournalConfig::default();
        assert!(config.create_if_missing);
        assert_eq!(config.index_density, DEFAULT_INDEX_DENSITY);
    }

    #[test]
    fn builder_pattern() {
        let config = JournalConfig::new("/data/1", "raft-partition-partition-1")
            .index_density(0)
            .create_if_missing(false);

        assert_eq!(config.directory, PathBuf::from("/data/1"));
        assert_eq!(config.name, "raft-partition-partition-1");
        assert_eq!(config.index_density, 1);
        assert!(!config.create_if_missing);
    }
}

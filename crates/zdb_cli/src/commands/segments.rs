//! Segments command implementation.

use serde::Serialize;
use zdb_journal::{JournalConfig, Segment, SegmentedJournal};

/// One row of the segment listing.
#[derive(Debug, Serialize)]
pub struct SegmentInfo {
    /// Segment id.
    pub id: u64,
    /// File name.
    pub file: String,
    /// Descriptor version.
    pub version: u8,
    /// First index held by the segment.
    pub first_index: u64,
    /// Index of the last record, `first_index - 1` if empty.
    pub last_index: u64,
    /// Number of records.
    pub record_count: u64,
    /// Last ASQN written before the segment.
    pub initial_asqn: i64,
    /// Highest ASQN written in or before the segment.
    pub last_written_asqn: i64,
    /// File size before loading.
    pub file_size: u64,
    /// Declared capacity.
    pub max_segment_size: u32,
}

impl From<&Segment> for SegmentInfo {
    fn from(segment: &Segment) -> Self {
        Self {
            id: segment.id(),
            file: segment.file_name().to_string(),
            version: segment.descriptor().version,
            first_index: segment.index(),
            last_index: segment.last_index(),
            record_count: segment.record_count(),
            initial_asqn: segment.initial_asqn(),
            last_written_asqn: segment.last_written_asqn(),
            file_size: segment.file_size(),
            max_segment_size: segment.descriptor().max_segment_size,
        }
    }
}

/// Opens the journal and lists its segments.
pub fn list(config: JournalConfig) -> Result<Vec<SegmentInfo>, Box<dyn std::error::Error>> {
    let journal = SegmentedJournal::open(config)?;
    let rows = journal
        .segments()
        .iter()
        .map(|segment| SegmentInfo::from(segment.as_ref()))
        .collect();
    journal.close();
    Ok(rows)
}

/// Runs the segments command.
pub fn run(config: JournalConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rows = list(config)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            print_text_output(&rows);
        }
    }

    Ok(())
}

fn print_text_output(rows: &[SegmentInfo]) {
    println!("Segments ({} total)", rows.len());
    println!("================");
    println!();

    for row in rows {
        println!(
            "[{:>6}] {}  v{}  index {}..={}  records={}  asqn {}..{}  size={} / {}",
            row.id,
            row.file,
            row.version,
            row.first_index,
            row.last_index,
            row.record_count,
            row.initial_asqn,
            row.last_written_asqn,
            super::format_size(row.file_size),
            super::format_size(u64::from(row.max_segment_size)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zdb_testkit::JournalFixture;

    #[test]
    fn lists_segments_in_order() {
        let mut fixture = JournalFixture::new();
        fixture.add_segment(2);
        let small = fixture.next_segment().file_len(1024).records(4, 3);
        fixture.write_segment(&small);

        let rows = list(fixture.config()).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].file, "raft-partition-partition-1-1.log");
        assert_eq!(rows[0].last_index, 2);
        assert_eq!(rows[0].last_written_asqn, 2);

        assert_eq!(rows[1].first_index, 3);
        assert_eq!(rows[1].record_count, 4);
        assert_eq!(rows[1].initial_asqn, 2);
        assert_eq!(rows[1].file_size, 1024);
        assert_eq!(rows[1].max_segment_size, 64 * 1024);
    }
}

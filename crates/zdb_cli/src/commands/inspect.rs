//! Inspect command implementation.

use serde::Serialize;
use zdb_journal::{JournalConfig, SegmentedJournal};

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Partition directory.
    pub path: String,
    /// Log name.
    pub name: String,
    /// Number of segments.
    pub segment_count: usize,
    /// First index of the journal.
    pub first_index: u64,
    /// Index of the last record.
    pub last_index: u64,
    /// Number of records.
    pub record_count: u64,
    /// Highest ASQN written, -1 if none.
    pub last_written_asqn: i64,
    /// Sum of the segment file sizes before loading.
    pub total_file_size: u64,
    /// Sum of the mapped segment sizes.
    pub total_mapped_size: u64,
}

/// Opens the journal and summarizes it.
pub fn inspect(config: JournalConfig) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let journal = SegmentedJournal::open(config)?;
    let segments = journal.segments();

    let result = InspectResult {
        path: journal.config().directory.display().to_string(),
        name: journal.config().name.clone(),
        segment_count: segments.len(),
        first_index: journal.first_index(),
        last_index: journal.last_index(),
        record_count: segments.iter().map(|s| s.record_count()).sum(),
        last_written_asqn: journal.last_written_asqn(),
        total_file_size: segments.iter().map(|s| s.file_size()).sum(),
        total_mapped_size: segments.iter().map(|s| s.mapped_len() as u64).sum(),
    };

    journal.close();
    Ok(result)
}

/// Runs the inspect command.
pub fn run(config: JournalConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(config)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Journal Inspection");
    println!("==================");
    println!();
    println!("Path: {}", result.path);
    println!("Name: {}", result.name);
    println!();
    println!("Segments:");
    println!("  Count:         {}", result.segment_count);
    println!("  File size:     {}", super::format_size(result.total_file_size));
    println!("  Mapped size:   {}", super::format_size(result.total_mapped_size));
    println!();
    println!("Records:");
    println!("  First index:   {}", result.first_index);
    println!("  Last index:    {}", result.last_index);
    println!("  Count:         {}", result.record_count);
    println!("  Last ASQN:     {}", result.last_written_asqn);
}

#[cfg(test)]
mod tests {
    use super::*;
    use zdb_testkit::JournalFixture;

    #[test]
    fn summarizes_journal() {
        let mut fixture = JournalFixture::new();
        fixture.add_segment(5);
        fixture.add_segment(3);

        let result = inspect(fixture.config()).unwrap();
        assert_eq!(result.segment_count, 2);
        assert_eq!(result.first_index, 1);
        assert_eq!(result.last_index, 8);
        assert_eq!(result.record_count, 8);
        assert_eq!(result.last_written_asqn, 8);
        assert_eq!(result.total_mapped_size, 2 * 64 * 1024);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["segment_count"], 2);
    }

    #[test]
    fn missing_journal_fails() {
        let fixture = JournalFixture::new();
        assert!(inspect(fixture.config()).is_err());
    }
}

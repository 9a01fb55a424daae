//! Entries command implementation.

use serde::Serialize;
use zdb_journal::{JournalConfig, JournalRecord, SegmentedJournal};

/// Number of payload bytes shown in the preview.
const PREVIEW_BYTES: usize = 16;

/// Where the dump starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Start {
    /// The first record of the journal.
    First,
    /// The record with this index.
    Index(u64),
    /// The last record with an ASQN at or below this one.
    Asqn(i64),
}

/// Journal record representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Record index.
    pub index: u64,
    /// ASQN, absent for records that don't carry one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asqn: Option<i64>,
    /// Record checksum, hex-encoded.
    pub checksum: String,
    /// Payload size in bytes.
    pub data_length: usize,
    /// Leading payload bytes, hex-encoded.
    pub preview: String,
}

impl From<&JournalRecord> for EntryInfo {
    fn from(record: &JournalRecord) -> Self {
        let shown = &record.data[..record.data.len().min(PREVIEW_BYTES)];
        let mut preview = hex_encode(shown);
        if record.data.len() > PREVIEW_BYTES {
            preview.push_str("...");
        }

        Self {
            index: record.index,
            asqn: record.has_asqn().then_some(record.asqn),
            checksum: format!("{:08x}", record.checksum),
            data_length: record.data.len(),
            preview,
        }
    }
}

/// Opens the journal and reads up to `limit` records from `start`.
pub fn read_entries(
    config: JournalConfig,
    start: Start,
    limit: Option<usize>,
) -> Result<Vec<EntryInfo>, Box<dyn std::error::Error>> {
    let journal = SegmentedJournal::open(config)?;
    let mut reader = journal.reader();
    match start {
        Start::First => reader.seek_to_first(),
        Start::Index(index) => {
            reader.seek(index)?;
        }
        Start::Asqn(asqn) => {
            reader.seek_to_asqn(asqn)?;
        }
    }

    let mut entries = Vec::new();
    for record in reader.take(limit.unwrap_or(usize::MAX)) {
        entries.push(EntryInfo::from(&record?));
    }

    journal.close();
    Ok(entries)
}

/// Runs the entries command.
pub fn run(
    config: JournalConfig,
    start: Start,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = read_entries(config, start, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(&entries);
        }
    }

    Ok(())
}

fn print_text_output(entries: &[EntryInfo]) {
    println!("Journal Records ({} total)", entries.len());
    println!("================");
    println!();

    for entry in entries {
        print!("[{:010}]", entry.index);

        if let Some(asqn) = entry.asqn {
            print!(" asqn={}", asqn);
        }
        print!(" crc={}", entry.checksum);
        print!(" data={} bytes", entry.data_length);
        if !entry.preview.is_empty() {
            print!(" {}", entry.preview);
        }

        println!();
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use zdb_journal::ASQN_IGNORE;
    use zdb_testkit::JournalFixture;

    fn fixture() -> JournalFixture {
        let mut fixture = JournalFixture::new();
        fixture.add_segment(5);
        let mixed = fixture
            .next_segment()
            .record(ASQN_IGNORE, vec![0xAB; 20])
            .record(6, b"x".to_vec());
        fixture.write_segment(&mixed);
        fixture
    }

    fn indexes(entries: &[EntryInfo]) -> Vec<u64> {
        entries.iter().map(|e| e.index).collect()
    }

    #[test]
    fn dumps_from_start() {
        let fixture = fixture();
        let entries = read_entries(fixture.config(), Start::First, Some(3)).unwrap();
        assert_eq!(indexes(&entries), vec![1, 2, 3]);
        assert_eq!(entries[0].asqn, Some(1));
        assert_eq!(entries[0].preview, hex_encode(b"entry-1"));
    }

    #[test]
    fn dumps_from_index() {
        let fixture = fixture();
        let entries = read_entries(fixture.config(), Start::Index(5), None).unwrap();
        assert_eq!(indexes(&entries), vec![5, 6, 7]);

        let config_entry = &entries[1];
        assert_eq!(config_entry.asqn, None);
        assert_eq!(config_entry.data_length, 20);
        assert!(config_entry.preview.ends_with("..."));
        assert_eq!(config_entry.preview.len(), PREVIEW_BYTES * 2 + 3);
    }

    #[test]
    fn dumps_from_asqn() {
        let fixture = fixture();
        let entries = read_entries(fixture.config(), Start::Asqn(3), Some(2)).unwrap();
        assert_eq!(indexes(&entries), vec![3, 4]);
    }

    #[test]
    fn json_omits_missing_asqn() {
        let fixture = fixture();
        let entries = read_entries(fixture.config(), Start::Index(6), Some(1)).unwrap();
        let json = serde_json::to_value(&entries).unwrap();
        assert!(json[0].get("asqn").is_none());
        assert_eq!(json[0]["index"], 6);
    }
}

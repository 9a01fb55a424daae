//! Raft metadata stored next to the journal.
//!
//! A partition directory holds two small files beside its segments:
//!
//! - `<name>.meta`: the meta store (term, flushed and commit index, vote)
//! - `<name>.conf`: the last persisted member configuration
//!
//! Both are rewritten in place by the raft server and only ever read here.
//!
//! ## Layout
//!
//! ```text
//! file:    | version (1) | message header (8) | root block | var data |
//! header:  | block_length (2) | template_id (2) | schema_id (2) | schema_version (2) |
//!
//! meta block:   | term (8) | last_flushed_index (8) | commit_index (8) |
//! meta var:     | voted_for (string) |
//!
//! config block: | index (8) | term (8) | time (8) | force (1) |
//! config var:   | new_members (group) | old_members (group) |
//! group:        | block_length (2) | count (2) | count * (member block, id string) |
//! member block: | type (1) | last_updated (8) |
//!
//! string:       | length (4) | utf-8 bytes |
//! ```
//!
//! All integers are little-endian; timestamps are Unix milliseconds. Blocks
//! may be longer than the fields listed here; readers skip what they don't
//! know.

use crate::error::{JournalError, JournalResult};
use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version byte of both metadata files.
pub const METADATA_VERSION: u8 = 1;

/// File extension of the meta store.
pub const META_EXTENSION: &str = "meta";

/// File extension of the member configuration.
pub const CONFIG_EXTENSION: &str = "conf";

const SCHEMA_ID: u16 = 0;
const SCHEMA_VERSION: u16 = 1;
const META_TEMPLATE_ID: u16 = 1;
const CONFIG_TEMPLATE_ID: u16 = 2;

const META_BLOCK_LENGTH: u16 = 24;
const CONFIG_BLOCK_LENGTH: u16 = 25;
const MEMBER_BLOCK_LENGTH: u16 = 9;

/// Persisted raft server state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaStoreRecord {
    /// Current term.
    pub term: u64,
    /// Highest journal index known to be flushed.
    pub last_flushed_index: u64,
    /// Highest committed journal index.
    pub commit_index: u64,
    /// Member voted for in `term`, empty if none.
    pub voted_for: String,
}

impl MetaStoreRecord {
    /// Decodes a meta store file read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::MetadataCorrupted`] if the version, template
    /// or block length is unexpected, or the file ends early.
    pub fn decode(buf: &[u8], path: &Path) -> JournalResult<Self> {
        let mut decoder = Decoder::new(buf, path);
        let mut block = decoder.message(META_TEMPLATE_ID, META_BLOCK_LENGTH)?;

        Ok(Self {
            term: block.u64("term")?,
            last_flushed_index: block.u64("last flushed index")?,
            commit_index: block.u64("commit index")?,
            voted_for: decoder.string("voted for")?,
        })
    }

    /// Encodes the record in the meta store layout.
    ///
    /// The journal never writes metadata; this exists for fixtures and
    /// tooling.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = message_header(META_TEMPLATE_ID, META_BLOCK_LENGTH);
        buf.extend_from_slice(&self.term.to_le_bytes());
        buf.extend_from_slice(&self.last_flushed_index.to_le_bytes());
        buf.extend_from_slice(&self.commit_index.to_le_bytes());
        put_string(&mut buf, &self.voted_for);
        buf
    }
}

/// Role of a member in a raft configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    /// Not part of the replication set.
    Inactive,
    /// Receives entries but never votes.
    Passive,
    /// Catching up before being promoted to active.
    Promotable,
    /// Full voting member.
    Active,
}

impl MemberType {
    /// Returns the upper-case name used in reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Passive => "PASSIVE",
            Self::Promotable => "PROMOTABLE",
            Self::Active => "ACTIVE",
        }
    }

    const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Inactive),
            1 => Some(Self::Passive),
            2 => Some(Self::Promotable),
            3 => Some(Self::Active),
            _ => None,
        }
    }

    const fn code(self) -> u8 {
        match self {
            Self::Inactive => 0,
            Self::Passive => 1,
            Self::Promotable => 2,
            Self::Active => 3,
        }
    }
}

/// One member of a raft configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftMember {
    /// Member id.
    pub id: String,
    /// Role of the member.
    pub member_type: MemberType,
    /// When the member's role last changed.
    pub last_updated: DateTime<Utc>,
}

impl RaftMember {
    /// Returns the member hash raft uses to order members.
    ///
    /// This is the 31-multiplier hash over the UTF-16 units of the id.
    #[must_use]
    pub fn hash(&self) -> i32 {
        self.id
            .encode_utf16()
            .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
    }
}

/// The last persisted member configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftConfiguration {
    /// Journal index at which the configuration was written.
    pub index: u64,
    /// Term in which the configuration was written.
    pub term: u64,
    /// Creation time in Unix milliseconds.
    pub time: i64,
    /// True if the configuration was forced without consensus.
    pub force: bool,
    /// Members of the new configuration.
    pub new_members: Vec<RaftMember>,
    /// Members of the previous configuration during a joint change.
    pub old_members: Vec<RaftMember>,
}

impl RaftConfiguration {
    /// Returns true while old and new members must both agree.
    #[must_use]
    pub fn requires_joint_consensus(&self) -> bool {
        !self.old_members.is_empty()
    }

    /// Decodes a configuration file read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::MetadataCorrupted`] if the version, template
    /// or block lengths are unexpected, a member type or timestamp is out of
    /// range, or the file ends early.
    pub fn decode(buf: &[u8], path: &Path) -> JournalResult<Self> {
        let mut decoder = Decoder::new(buf, path);
        let mut block = decoder.message(CONFIG_TEMPLATE_ID, CONFIG_BLOCK_LENGTH)?;

        let index = block.u64("configuration index")?;
        let term = block.u64("configuration term")?;
        let time = block.i64("configuration time")?;
        let force = match block.u8("force flag")? {
            0 => false,
            1 => true,
            other => return Err(block.corrupted(format!("force flag must be 0 or 1, got {other}"))),
        };

        Ok(Self {
            index,
            term,
            time,
            force,
            new_members: decoder.members("new members")?,
            old_members: decoder.members("old members")?,
        })
    }

    /// Encodes the configuration in the `.conf` layout.
    ///
    /// Groups hold at most `u16::MAX` members; extra members are dropped.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = message_header(CONFIG_TEMPLATE_ID, CONFIG_BLOCK_LENGTH);
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&self.term.to_le_bytes());
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.push(u8::from(self.force));
        put_members(&mut buf, &self.new_members);
        put_members(&mut buf, &self.old_members);
        buf
    }
}

/// Meta store and configuration of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftStatus {
    /// Persisted server state.
    pub meta: MetaStoreRecord,
    /// Persisted member configuration.
    pub config: RaftConfiguration,
}

/// Reads the raft metadata files of a partition.
#[derive(Debug, Clone)]
pub struct MetaStoreReader {
    meta_path: PathBuf,
    config_path: PathBuf,
}

impl MetaStoreReader {
    /// Creates a reader for explicit file paths.
    #[must_use]
    pub fn new(meta_path: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            meta_path: meta_path.into(),
            config_path: config_path.into(),
        }
    }

    /// Creates a reader for `<name>.meta` and `<name>.conf` in `directory`.
    #[must_use]
    pub fn for_partition(directory: &Path, name: &str) -> Self {
        Self::new(
            directory.join(format!("{name}.{META_EXTENSION}")),
            directory.join(format!("{name}.{CONFIG_EXTENSION}")),
        )
    }

    /// Returns the path of the meta store.
    #[must_use]
    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    /// Returns the path of the configuration.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Reads the meta store.
    ///
    /// # Errors
    ///
    /// - [`JournalError::MetadataIo`] if the file can't be read
    /// - [`JournalError::MetadataCorrupted`] if it can't be decoded
    pub fn read_meta_store(&self) -> JournalResult<MetaStoreRecord> {
        let buf = read_file(&self.meta_path)?;
        let record = MetaStoreRecord::decode(&buf, &self.meta_path)?;
        debug!(
            path = %self.meta_path.display(),
            term = record.term,
            commit_index = record.commit_index,
            "Read meta store"
        );
        Ok(record)
    }

    /// Reads the member configuration.
    ///
    /// # Errors
    ///
    /// - [`JournalError::MetadataIo`] if the file can't be read
    /// - [`JournalError::MetadataCorrupted`] if it can't be decoded
    pub fn read_config(&self) -> JournalResult<RaftConfiguration> {
        let buf = read_file(&self.config_path)?;
        let config = RaftConfiguration::decode(&buf, &self.config_path)?;
        debug!(
            path = %self.config_path.display(),
            index = config.index,
            members = config.new_members.len(),
            "Read raft configuration"
        );
        Ok(config)
    }

    /// Reads both files.
    ///
    /// # Errors
    ///
    /// See [`read_meta_store`](Self::read_meta_store) and
    /// [`read_config`](Self::read_config).
    pub fn status(&self) -> JournalResult<RaftStatus> {
        Ok(RaftStatus {
            meta: self.read_meta_store()?,
            config: self.read_config()?,
        })
    }
}

fn read_file(path: &Path) -> JournalResult<Vec<u8>> {
    fs::read(path).map_err(|source| JournalError::metadata_io(path, source))
}

fn message_header(template_id: u16, block_length: u16) -> Vec<u8> {
    let mut buf = vec![METADATA_VERSION];
    buf.extend_from_slice(&block_length.to_le_bytes());
    buf.extend_from_slice(&template_id.to_le_bytes());
    buf.extend_from_slice(&SCHEMA_ID.to_le_bytes());
    buf.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    buf
}

fn put_string(buf: &mut Vec<u8>, value: &str) {
    let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&value.as_bytes()[..len as usize]);
}

fn put_members(buf: &mut Vec<u8>, members: &[RaftMember]) {
    let count = u16::try_from(members.len()).unwrap_or(u16::MAX);
    buf.extend_from_slice(&MEMBER_BLOCK_LENGTH.to_le_bytes());
    buf.extend_from_slice(&count.to_le_bytes());
    for member in &members[..usize::from(count)] {
        buf.push(member.member_type.code());
        buf.extend_from_slice(&member.last_updated.timestamp_millis().to_le_bytes());
        put_string(buf, &member.id);
    }
}

/// Bounds-checked little-endian cursor over a metadata file.
struct Decoder<'a> {
    buf: &'a [u8],
    position: usize,
    path: &'a Path,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8], path: &'a Path) -> Self {
        Self {
            buf,
            position: 0,
            path,
        }
    }

    fn corrupted(&self, reason: impl Into<String>) -> JournalError {
        JournalError::metadata_corrupted(self.path, reason)
    }

    fn take(&mut self, len: usize, what: &str) -> JournalResult<&'a [u8]> {
        let buf = self.buf;
        let Some(end) = self.position.checked_add(len).filter(|&end| end <= buf.len()) else {
            return Err(self.corrupted(format!(
                "expected {len} bytes of {what} at offset {}, but only {} remain",
                self.position,
                buf.len() - self.position
            )));
        };
        let bytes = &buf[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, what: &str) -> JournalResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn u8(&mut self, what: &str) -> JournalResult<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    fn u16(&mut self, what: &str) -> JournalResult<u16> {
        self.array(what).map(u16::from_le_bytes)
    }

    fn u32(&mut self, what: &str) -> JournalResult<u32> {
        self.array(what).map(u32::from_le_bytes)
    }

    fn u64(&mut self, what: &str) -> JournalResult<u64> {
        self.array(what).map(u64::from_le_bytes)
    }

    fn i64(&mut self, what: &str) -> JournalResult<i64> {
        self.array(what).map(i64::from_le_bytes)
    }

    fn string(&mut self, what: &str) -> JournalResult<String> {
        let len = self.u32(what)? as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| self.corrupted(format!("{what} is not valid UTF-8")))
    }

    /// Checks the version byte and message header, and returns a decoder
    /// over the root block. `self` continues after the block.
    fn message(&mut self, template_id: u16, min_block_length: u16) -> JournalResult<Decoder<'a>> {
        if self.buf.is_empty() {
            return Err(self.corrupted("file is empty"));
        }

        let version = self.u8("the version byte")?;
        if version != METADATA_VERSION {
            return Err(self.corrupted(format!("couldn't recognize version {version}")));
        }

        let block_length = self.u16("the block length")?;
        let found = self.u16("the template id")?;
        self.u16("the schema id")?;
        self.u16("the schema version")?;
        if found != template_id {
            return Err(self.corrupted(format!(
                "expected template {template_id}, but found {found}"
            )));
        }

        self.block(block_length, min_block_length, "the root block")
    }

    fn block(&mut self, length: u16, min_length: u16, what: &str) -> JournalResult<Decoder<'a>> {
        if length < min_length {
            return Err(self.corrupted(format!(
                "{what} is {length} bytes long, but needs at least {min_length}"
            )));
        }
        let buf = self.take(usize::from(length), what)?;
        Ok(Decoder::new(buf, self.path))
    }

    fn members(&mut self, what: &str) -> JournalResult<Vec<RaftMember>> {
        let block_length = self.u16(what)?;
        let count = self.u16(what)?;

        let mut members = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let mut block = self.block(block_length, MEMBER_BLOCK_LENGTH, what)?;
            let code = block.u8("member type")?;
            let Some(member_type) = MemberType::from_code(code) else {
                return Err(self.corrupted(format!("unknown member type {code} in {what}")));
            };
            let millis = block.i64("member update time")?;
            let Some(last_updated) = Utc.timestamp_millis_opt(millis).single() else {
                return Err(self.corrupted(format!("member update time {millis} is out of range")));
            };
            members.push(RaftMember {
                id: self.string("member id")?,
                member_type,
                last_updated,
            });
        }
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const NAME: &str = "raft-partition-partition-1";

    fn member(id: &str, member_type: MemberType, millis: i64) -> RaftMember {
        RaftMember {
            id: id.to_string(),
            member_type,
            last_updated: Utc.timestamp_millis_opt(millis).unwrap(),
        }
    }

    fn config() -> RaftConfiguration {
        RaftConfiguration {
            index: 12,
            term: 3,
            time: 1_700_000_000_000,
            force: false,
            new_members: vec![
                member("0", MemberType::Active, 1_700_000_000_000),
                member("1", MemberType::Promotable, 1_700_000_000_500),
            ],
            old_members: Vec::new(),
        }
    }

    #[test]
    fn decodes_meta_store() {
        let record = MetaStoreRecord {
            term: 4,
            last_flushed_index: 120,
            commit_index: 118,
            voted_for: "2".to_string(),
        };
        let decoded = MetaStoreRecord::decode(&record.encode(), Path::new(NAME)).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn skips_unknown_block_fields() {
        let mut buf = message_header(META_TEMPLATE_ID, META_BLOCK_LENGTH + 8);
        for value in [7u64, 70, 69, 0xFFFF] {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        put_string(&mut buf, "");

        let decoded = MetaStoreRecord::decode(&buf, Path::new(NAME)).unwrap();
        assert_eq!(decoded.term, 7);
        assert_eq!(decoded.commit_index, 69);
        assert_eq!(decoded.voted_for, "");
    }

    #[test]
    fn truncated_meta_store_is_corruption() {
        let buf = MetaStoreRecord::default().encode();
        let err = MetaStoreRecord::decode(&buf[..20], Path::new(NAME)).unwrap_err();
        assert!(err.is_corruption());

        let err = MetaStoreRecord::decode(&[], Path::new(NAME)).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn wrong_version_or_template_is_corruption() {
        let mut buf = MetaStoreRecord::default().encode();
        buf[0] = 9;
        let err = MetaStoreRecord::decode(&buf, Path::new(NAME)).unwrap_err();
        assert!(err.to_string().contains("version 9"));

        let conf = config().encode();
        let err = MetaStoreRecord::decode(&conf, Path::new(NAME)).unwrap_err();
        assert!(err.to_string().contains("template"));
    }

    #[test]
    fn decodes_configuration() {
        let mut joint = config();
        joint.old_members = vec![member("0", MemberType::Active, 1_600_000_000_000)];

        let decoded = RaftConfiguration::decode(&joint.encode(), Path::new(NAME)).unwrap();
        assert_eq!(decoded, joint);
        assert!(decoded.requires_joint_consensus());
        assert!(!config().requires_joint_consensus());
    }

    #[test]
    fn unknown_member_type_is_corruption() {
        let mut buf = config().encode();
        // version + header + block + group header
        let first_member = 1 + 8 + usize::from(CONFIG_BLOCK_LENGTH) + 4;
        buf[first_member] = 7;

        let err = RaftConfiguration::decode(&buf, Path::new(NAME)).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("member type 7"));
    }

    #[test]
    fn member_hash() {
        assert_eq!(member("0", MemberType::Active, 0).hash(), 48);
        assert_eq!(member("ab", MemberType::Active, 0).hash(), 97 * 31 + 98);
        assert_eq!(member("", MemberType::Active, 0).hash(), 0);
    }

    #[test]
    fn reads_partition_files() {
        let dir = tempdir().unwrap();
        let meta = MetaStoreRecord {
            term: 2,
            last_flushed_index: 10,
            commit_index: 9,
            voted_for: "0".to_string(),
        };
        fs::write(dir.path().join(format!("{NAME}.meta")), meta.encode()).unwrap();
        fs::write(dir.path().join(format!("{NAME}.conf")), config().encode()).unwrap();

        let status = MetaStoreReader::for_partition(dir.path(), NAME).status().unwrap();
        assert_eq!(status.meta, meta);
        assert_eq!(status.config, config());
    }

    #[test]
    fn missing_file_is_transient() {
        let dir = tempdir().unwrap();
        let reader = MetaStoreReader::for_partition(dir.path(), NAME);

        let err = reader.read_meta_store().unwrap_err();
        assert!(matches!(err, JournalError::MetadataIo { .. }));
        assert!(err.is_transient());
        assert!(reader.config_path().ends_with(format!("{NAME}.conf")));
    }
}

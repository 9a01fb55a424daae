//! Raft status command implementation.

use chrono::SecondsFormat;
use serde::Serialize;
use std::path::Path;
use zdb_journal::{MetaStoreReader, RaftConfiguration, RaftMember, RaftStatus};

/// Raft status of a partition.
#[derive(Debug, Serialize)]
pub struct RaftStatusInfo {
    /// Partition directory name.
    pub partition: String,
    /// Meta store contents.
    pub meta: MetaInfo,
    /// Member configuration.
    pub config: ConfigInfo,
}

/// Meta store representation for output.
#[derive(Debug, Serialize)]
pub struct MetaInfo {
    /// Current term.
    pub term: u64,
    /// Highest flushed index.
    pub last_flushed_index: u64,
    /// Highest committed index.
    pub commit_index: u64,
    /// Member voted for, empty if none.
    pub voted_for: String,
}

/// Configuration representation for output.
#[derive(Debug, Serialize)]
pub struct ConfigInfo {
    /// Index at which the configuration was written.
    pub index: u64,
    /// Term in which the configuration was written.
    pub term: u64,
    /// Creation time in Unix milliseconds.
    pub time: i64,
    /// Forced without consensus.
    pub force: bool,
    /// Old and new members must both agree.
    pub requires_joint_consensus: bool,
    /// Members of the new configuration.
    pub new_members: Vec<MemberInfo>,
    /// Members of the previous configuration.
    pub old_members: Vec<MemberInfo>,
}

/// Member representation for output.
#[derive(Debug, Serialize)]
pub struct MemberInfo {
    /// Member id.
    pub id: String,
    /// Member hash.
    pub hash: i32,
    /// Member role.
    #[serde(rename = "type")]
    pub member_type: &'static str,
    /// Last role change, RFC 3339.
    pub last_updated: String,
}

impl From<&RaftMember> for MemberInfo {
    fn from(member: &RaftMember) -> Self {
        Self {
            id: member.id.clone(),
            hash: member.hash(),
            member_type: member.member_type.name(),
            last_updated: member
                .last_updated
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

impl From<&RaftConfiguration> for ConfigInfo {
    fn from(config: &RaftConfiguration) -> Self {
        Self {
            index: config.index,
            term: config.term,
            time: config.time,
            force: config.force,
            requires_joint_consensus: config.requires_joint_consensus(),
            new_members: config.new_members.iter().map(MemberInfo::from).collect(),
            old_members: config.old_members.iter().map(MemberInfo::from).collect(),
        }
    }
}

impl RaftStatusInfo {
    fn new(partition: String, status: &RaftStatus) -> Self {
        Self {
            partition,
            meta: MetaInfo {
                term: status.meta.term,
                last_flushed_index: status.meta.last_flushed_index,
                commit_index: status.meta.commit_index,
                voted_for: status.meta.voted_for.clone(),
            },
            config: ConfigInfo::from(&status.config),
        }
    }
}

/// Reads the meta store and configuration of the partition in `path`.
pub fn status(path: &Path, name: Option<&str>) -> Result<RaftStatusInfo, Box<dyn std::error::Error>> {
    let name = name.map_or_else(|| super::default_log_name(path), str::to_string);
    let status = MetaStoreReader::for_partition(path, &name).status()?;
    let partition = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(RaftStatusInfo::new(partition, &status))
}

/// Runs the raft status command.
pub fn run(path: &Path, name: Option<&str>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let info = status(path, name)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        _ => {
            print_table_output(&info);
        }
    }

    Ok(())
}

fn print_table_output(info: &RaftStatusInfo) {
    let rule = "-".repeat(62);
    println!("{rule}");
    println!("Raft Status for partition '{}':", info.partition);
    println!("{rule}");
    println!("Meta Store:");
    println!("    Term:                    {}", info.meta.term);
    println!("    Last Flushed Index:      {}", info.meta.last_flushed_index);
    println!("    Commit Index:            {}", info.meta.commit_index);
    println!("    Voted For:               {}", info.meta.voted_for);
    println!("{rule}");
    println!("Configuration:");
    println!("    Index:                   {}", info.config.index);
    println!("    Term:                    {}", info.config.term);
    println!("    Time:                    {}", info.config.time);
    println!("    Force:                   {}", info.config.force);
    println!("    Requires Join Consensus: {}", info.config.requires_joint_consensus);
    println!("    New Members:             {}", format_members(&info.config.new_members));
    println!("    Old Members:             {}", format_members(&info.config.old_members));
    println!("{rule}");
}

fn format_members(members: &[MemberInfo]) -> String {
    if members.is_empty() {
        return "[]".to_string();
    }

    let lines: Vec<String> = members
        .iter()
        .map(|m| {
            format!(
                "\t\tId: {}, Type: {}, Hash: {}, Updated: {}",
                m.id, m.member_type, m.hash, m.last_updated
            )
        })
        .collect();
    format!("[\n{}\n    ]", lines.join("\n"))
}

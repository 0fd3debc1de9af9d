//! Read and write an archive's metadata: the record list and each
//! snapshot's path list.

use std::fmt;

use anyhow::{Context, Result, anyhow};
use jiff::civil::DateTime;
use serde_derive::{Deserialize, Serialize};

use crate::manifest::PathSummary;
use crate::store::{self, Store};

/// Where the archive's record list lives.
pub const RECORDS_KEY: &str = "backupRecords";

/// `2024-Mar-15.09-30-00`. One snapshot per archive per second, tops.
pub const STAMP_FORMAT: &str = "%Y-%b-%d.%H-%M-%S";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Full,
    Incremental,
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotKind::Full => write!(f, "full"),
            SnapshotKind::Incremental => write!(f, "incremental"),
        }
    }
}

/// One snapshot's entry in the archive's chronological record list.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub kind: SnapshotKind,
    pub datetime: String,
    /// False until the snapshot finishes uploading.
    /// Records predating this field are assumed finished.
    #[serde(default = "completed_default")]
    pub completed: bool,
}

fn completed_default() -> bool {
    true
}

pub fn now_stamp() -> String {
    jiff::Zoned::now()
        .datetime()
        .strftime(STAMP_FORMAT)
        .to_string()
}

pub fn parse_stamp(stamp: &str) -> Result<DateTime> {
    DateTime::strptime(STAMP_FORMAT, stamp)
        .with_context(|| format!("Couldn't parse snapshot stamp {stamp}"))
}

pub fn load_records(store: &dyn Store) -> Result<Vec<BackupRecord>> {
    match store.get(RECORDS_KEY)? {
        Some(bytes) => {
            serde_yaml::from_slice(&bytes).context("Couldn't decode the backup record list")
        }
        None => Ok(Vec::new()),
    }
}

/// Overwrites the record list in one put.
pub fn save_records(store: &mut dyn Store, records: &[BackupRecord]) -> Result<()> {
    let yaml = serde_yaml::to_string(records).context("Couldn't encode the backup record list")?;
    store.put(RECORDS_KEY, yaml.as_bytes())
}

pub fn manifest_key(stamp: &str) -> String {
    format!("{stamp}/pathList")
}

pub fn load_manifest(store: &dyn Store, stamp: &str) -> Result<Vec<PathSummary>> {
    let bytes = store::get_required(store, &manifest_key(stamp))?;
    serde_yaml::from_slice(&bytes)
        .with_context(|| format!("Couldn't decode the path list for {stamp}"))
}

pub fn save_manifest(
    store: &mut dyn Store,
    stamp: &str,
    summaries: &[PathSummary],
) -> Result<()> {
    let yaml = serde_yaml::to_string(summaries)
        .with_context(|| format!("Couldn't encode the path list for {stamp}"))?;
    store.put(&manifest_key(stamp), yaml.as_bytes())
}

/// Splits records into backup groups: maximal runs starting at a full
/// snapshot. An archive that starts with incrementals (made before any
/// full backup existed) gets a headless leading group.
pub fn group_records(records: &[BackupRecord]) -> Vec<&[BackupRecord]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for (i, record) in records.iter().enumerate() {
        if record.kind == SnapshotKind::Full && i != start {
            groups.push(&records[start..i]);
            start = i;
        }
    }
    if !records.is_empty() {
        groups.push(&records[start..]);
    }
    groups
}

/// Index of the start of the group enclosing `index`: the nearest full
/// snapshot at or before it, or 0 for a headless group.
pub fn group_start(records: &[BackupRecord], index: usize) -> usize {
    (0..=index)
        .rev()
        .find(|&i| records[i].kind == SnapshotKind::Full)
        .unwrap_or(0)
}

pub fn find_index_by_datetime(records: &[BackupRecord], stamp: &str) -> Result<usize> {
    records
        .iter()
        .position(|record| record.datetime == stamp)
        .ok_or_else(|| anyhow!("No snapshot taken at {stamp}"))
}

//! Check a snapshot against its source, either by restoring it and
//! comparing bytes, or structurally against hashes read back from the
//! store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use tracing::*;

use crate::catalog;
use crate::diff::{self, Difference};
use crate::error::Error;
use crate::hashing::ContentHash;
use crate::manifest::{ContentKey, PathSummary};
use crate::restore::{self, RestoreOptions};
use crate::runner::Runner;
use crate::store::{self, Store};
use crate::tree::{self, Node};

/// Memoised hashes of backed-up blobs, as read back from the store.
///
/// The point: the hash a blob *actually* has may not be the hash the
/// walker claimed when it was uploaded. Trusting the read-back hash is
/// how verification notices a store that's quietly eaten a file.
///
/// Each snapshot's map is loaded lazily and persisted beside it; only
/// snapshots whose map grew this session get rewritten on flush.
#[derive(Debug, Default)]
pub struct VerificationCache {
    per_stamp: HashMap<String, BTreeMap<String, ContentHash>>,
    updated: HashSet<String>,
}

fn cache_key(stamp: &str) -> String {
    format!("{stamp}/verifiedFileHashes.yaml")
}

impl VerificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull a snapshot's persisted records into memory if they aren't
    /// there already.
    pub fn ensure_loaded(&mut self, store: &dyn Store, stamp: &str) -> Result<()> {
        if self.per_stamp.contains_key(stamp) {
            return Ok(());
        }
        let map = match store.get(&cache_key(stamp))? {
            Some(bytes) => serde_yaml::from_slice(&bytes)
                .with_context(|| format!("Couldn't decode the verification records for {stamp}"))?,
            None => BTreeMap::new(),
        };
        self.per_stamp.insert(stamp.to_owned(), map);
        Ok(())
    }

    /// The verified hash of the blob at the given key: the cached
    /// value when there is one, the bytes read back from the store
    /// (and remembered) otherwise.
    pub fn written_file_hash(&mut self, store: &dyn Store, key: &ContentKey) -> Result<ContentHash> {
        self.ensure_loaded(store, &key.stamp)?;
        if let Some(hash) = self.per_stamp[&key.stamp].get(&key.path) {
            return Ok(*hash);
        }
        let contents = store::get_required(store, &key.key())
            .with_context(|| format!("Couldn't read back {}", key.key()))?;
        let hash = ContentHash::of(&contents);
        self.record(key, hash);
        Ok(hash)
    }

    /// Remember a hash read back from the store. First write wins.
    pub fn record(&mut self, key: &ContentKey, hash: ContentHash) {
        let map = self.per_stamp.entry(key.stamp.clone()).or_default();
        if !map.contains_key(&key.path) {
            map.insert(key.path.clone(), hash);
            self.updated.insert(key.stamp.clone());
        }
    }

    /// Write back every snapshot's records that grew this session.
    pub fn flush(&mut self, store: &mut dyn Store) -> Result<()> {
        for stamp in std::mem::take(&mut self.updated) {
            debug!("Updating verification records for {stamp}");
            let yaml = serde_yaml::to_string(&self.per_stamp[&stamp])
                .with_context(|| format!("Couldn't encode the verification records for {stamp}"))?;
            store.put(&cache_key(&stamp), yaml.as_bytes())?;
        }
        Ok(())
    }
}

/// Restore the latest snapshot into `scratch` (wiping whatever was
/// there) and compare it byte-for-byte against `source`.
pub fn verify_full(
    store: &mut dyn Store,
    source: &Utf8Path,
    scratch: &Utf8Path,
    runner: Runner,
) -> Result<()> {
    if scratch.exists() {
        fs::remove_dir_all(scratch).with_context(|| format!("Couldn't clear {scratch}"))?;
    }
    let mut cache = VerificationCache::new();
    let stamp = restore::restore(
        store,
        scratch,
        &RestoreOptions {
            runner,
            ..Default::default()
        },
        Some(&mut cache),
    )?;
    cache.flush(store)?;

    info!("Comparing {scratch} against {source}");
    let differences = diff::compare_dir_bytes(scratch, source)?;
    report(&stamp, "the restored snapshot", "the source", differences)
}

/// Rehash `source` and compare it structurally against the latest
/// snapshot, trusting hashes read back from the store over the ones in
/// the path list.
pub fn verify_incremental(store: &mut dyn Store, source: &Utf8Path) -> Result<()> {
    let records = catalog::load_records(&*store)?;
    if records.is_empty() {
        bail!(Error::Precondition("no snapshots in this archive".into()));
    }
    let target_index = records.len() - 1;
    let group_start = catalog::group_start(&records, target_index);
    let (manifests, hash_to_key) =
        restore::content_key_map(&*store, &records, group_start, target_index)?;
    let target = manifests.last().expect("a group is never empty");

    info!("Hashing {source} for verification");
    let local = tree::from_filesystem(source)?;

    let mut cache = VerificationCache::new();
    let mut snapshot_tree = Node::empty_dir();
    let mut missing = Vec::new();
    for summary in target {
        match summary {
            PathSummary::Dir { path } => snapshot_tree.add_dir(path),
            PathSummary::File { path, hash, .. } => match hash_to_key.get(hash) {
                Some(key) => {
                    snapshot_tree.add_file(path, cache.written_file_hash(&*store, key)?)
                }
                None => {
                    warn!("No stored contents for {path} (hash {hash})");
                    missing.push(path.clone());
                }
            },
        }
    }
    cache.flush(store)?;
    if !missing.is_empty() {
        bail!(Error::Integrity(format!(
            "{} files have no stored contents: {}",
            missing.len(),
            missing.join(", ")
        )));
    }

    let mut differences = Vec::new();
    diff::compare_nodes(&local, &snapshot_tree, "", &mut differences);
    report(
        &records[target_index].datetime,
        "the source",
        "the snapshot",
        differences,
    )
}

/// Report every difference found, then raise if there were any.
fn report(stamp: &str, left: &str, right: &str, differences: Vec<Difference>) -> Result<()> {
    if differences.is_empty() {
        info!("Verified {stamp}: no differences");
        return Ok(());
    }
    for difference in &differences {
        warn!("{}", difference.describe(left, right));
    }
    bail!(Error::Integrity(format!(
        "snapshot {stamp} doesn't match its source ({} differences): {}",
        differences.len(),
        differences
            .iter()
            .map(|d| d.describe(left, right))
            .collect::<Vec<_>>()
            .join("; ")
    )));
}

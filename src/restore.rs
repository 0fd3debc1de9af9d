//! Materialise a snapshot back onto the filesystem.

use std::fs;

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use rustc_hash::FxHashMap;
use tracing::*;

use crate::catalog::{self, BackupRecord};
use crate::error::Error;
use crate::hashing::ContentHash;
use crate::manifest::{ContentKey, PathSummary};
use crate::runner::{self, Runner, Task};
use crate::store::{self, Store};
use crate::verify::VerificationCache;

#[derive(Debug, Default)]
pub struct RestoreOptions {
    /// Restore this snapshot instead of the latest.
    pub stamp: Option<String>,
    /// Restore into a non-empty directory.
    pub overwrite: bool,
    /// Restore a snapshot that never finished uploading.
    pub allow_incomplete: bool,
    pub runner: Runner,
}

struct RestoreState<'a> {
    cache: Option<&'a mut VerificationCache>,
}

struct FetchTask {
    key: ContentKey,
    dest: Utf8PathBuf,
    /// Hash of the bytes as they came back from the store,
    /// filled in by the transfer phase.
    read_back: Option<ContentHash>,
}

impl<'a> Task<RestoreState<'a>> for FetchTask {
    fn transfer(&mut self, store: &mut dyn Store) -> Result<()> {
        let contents = store::get_required(&*store, &self.key.key())?;
        self.read_back = Some(ContentHash::of(&contents));
        if self.dest.exists() {
            fs::remove_file(&self.dest)
                .with_context(|| format!("Couldn't replace {}", self.dest))?;
        }
        fs::write(&self.dest, &contents)
            .with_context(|| format!("Couldn't write {}", self.dest))?;
        debug!("{:>8} {}", "restore", self.dest);
        Ok(())
    }

    fn absorb(&mut self, state: &mut RestoreState<'a>) -> Result<()> {
        if let Some(cache) = state.cache.as_deref_mut() {
            let hash = self.read_back.expect("absorb before transfer");
            cache.record(&self.key, hash);
        }
        Ok(())
    }
}

/// Load the group's manifests up to and including `target_index`, and
/// map every hash to the key of its stored copy. Later snapshots win
/// ties (there shouldn't be any).
pub fn content_key_map(
    store: &dyn Store,
    records: &[BackupRecord],
    group_start: usize,
    target_index: usize,
) -> Result<(Vec<Vec<PathSummary>>, FxHashMap<ContentHash, ContentKey>)> {
    let group = &records[group_start..=target_index];
    let mut manifests = Vec::with_capacity(group.len());
    for record in group {
        manifests.push(catalog::load_manifest(store, &record.datetime)?);
    }

    let mut hash_to_key = FxHashMap::default();
    for (record, manifest) in group.iter().zip(&manifests) {
        for summary in manifest {
            if let PathSummary::File {
                path,
                hash,
                written: true,
            } = summary
            {
                hash_to_key.insert(*hash, ContentKey::new(&record.datetime, path));
            }
        }
    }
    Ok((manifests, hash_to_key))
}

/// Restore a snapshot into `target`, returning the restored stamp.
pub fn restore(
    store: &mut dyn Store,
    target: &Utf8Path,
    options: &RestoreOptions,
    cache: Option<&mut VerificationCache>,
) -> Result<String> {
    let records = catalog::load_records(&*store)?;
    if records.is_empty() {
        bail!(Error::Precondition("no snapshots in this archive".into()));
    }

    let target_index = match &options.stamp {
        Some(stamp) => catalog::find_index_by_datetime(&records, stamp)?,
        None => records.len() - 1,
    };
    let target_record = &records[target_index];
    if !target_record.completed && !options.allow_incomplete {
        bail!(Error::Precondition(format!(
            "snapshot {} never finished; restore it anyway with allow_incomplete",
            target_record.datetime
        )));
    }

    let group_start = catalog::group_start(&records, target_index);
    let (manifests, hash_to_key) =
        content_key_map(&*store, &records, group_start, target_index)?;
    let to_restore = manifests.last().expect("a group is never empty");

    if target.exists() && !target.is_dir() {
        bail!(Error::Precondition(format!(
            "restore target {target} isn't a directory"
        )));
    }
    fs::create_dir_all(target).with_context(|| format!("Couldn't create {target}"))?;
    if !options.overwrite
        && target
            .read_dir_utf8()
            .with_context(|| format!("Couldn't list {target}"))?
            .next()
            .is_some()
    {
        bail!(Error::Precondition(format!(
            "restore target {target} isn't empty; restore into it anyway with overwrite"
        )));
    }

    info!("Restoring {} to {target}", target_record.datetime);

    // Replay the list in order. Directories are made on the spot, so
    // every fetch - however it's scheduled - finds its parent waiting.
    let mut tasks: Vec<Box<dyn Task<RestoreState>>> = Vec::new();
    let mut missing = Vec::new();
    for summary in to_restore {
        match summary {
            PathSummary::Dir { path } => {
                let dir = join_below(target, path);
                fs::create_dir_all(&dir).with_context(|| format!("Couldn't create {dir}"))?;
            }
            PathSummary::File { path, hash, .. } => match hash_to_key.get(hash) {
                Some(key) => tasks.push(Box::new(FetchTask {
                    key: key.clone(),
                    dest: join_below(target, path),
                    read_back: None,
                })),
                None => {
                    warn!("No stored contents for {path} (hash {hash})");
                    missing.push(path.clone());
                }
            },
        }
    }

    let mut state = RestoreState { cache };
    if let Some(cache) = state.cache.as_deref_mut() {
        // Load existing verification records up front; absorb phases
        // can't reach the store.
        for record in &records[group_start..=target_index] {
            cache.ensure_loaded(&*store, &record.datetime)?;
        }
    }
    let restored = tasks.len();
    runner::run_tasks(
        options.runner,
        store,
        tasks,
        runner::DEFAULT_CHECKPOINT_FREQ,
        &mut state,
        &mut |_, _| Ok(()),
    )?;

    if !missing.is_empty() {
        bail!(Error::Integrity(format!(
            "{} restored files had no stored contents: {}",
            missing.len(),
            missing.join(", ")
        )));
    }
    info!(
        "Restored {} files from {} to {target}",
        restored, target_record.datetime
    );
    Ok(target_record.datetime.clone())
}

fn join_below(target: &Utf8Path, relative: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{target}{relative}"))
}

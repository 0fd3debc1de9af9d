//! Drive one snapshot: plan the uploads, run them, checkpoint,
//! finalise.
//!
//! The record list is updated *before* any bytes move, so a crashed or
//! interrupted snapshot leaves an honest trail: an incomplete tail
//! record whose path list claims no more than what actually landed
//! (give or take one checkpoint interval). Nothing tries to clean that
//! up automatically - the next snapshot just appends after it.

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use rustc_hash::FxHashSet;
use tracing::*;

use crate::catalog::{self, BackupRecord, SnapshotKind};
use crate::error::Error;
use crate::hashing::ContentHash;
use crate::manifest::{ContentKey, PathSummary};
use crate::prettify::nice_size;
use crate::runner::{self, Runner, Task};
use crate::store::Store;
use crate::walk;
use crate::written::WrittenIndex;

/// Flush the path list once this many bytes have uploaded since the
/// last flush.
pub const DEFAULT_CHECKPOINT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub kind: SnapshotKind,
    pub runner: Runner,
    pub checkpoint_bytes: u64,
    pub checkpoint_freq: usize,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            kind: SnapshotKind::Full,
            runner: Runner::Sequential,
            checkpoint_bytes: DEFAULT_CHECKPOINT_BYTES,
            checkpoint_freq: runner::DEFAULT_CHECKPOINT_FREQ,
        }
    }
}

/// What a snapshot did, for callers and tests.
#[derive(Debug)]
pub struct SnapshotOutcome {
    pub stamp: String,
    pub kind: SnapshotKind,
    /// Files in the snapshot, uploaded or not.
    pub files: usize,
    /// Files whose contents actually uploaded.
    pub uploads: usize,
    pub uploaded_bytes: u64,
}

/// Everything the upload tasks fold their results into.
/// Mutated only in synchronized phases, on the dispatching thread.
struct SnapshotState {
    stamp: String,
    manifest: Vec<PathSummary>,
    written: WrittenIndex,
    bytes_since_flush: u64,
    uploaded_bytes: u64,
}

struct UploadTask {
    /// Position of our file in the manifest.
    index: usize,
    source: Utf8PathBuf,
    key: ContentKey,
    hash: ContentHash,
    bytes: u64,
}

impl Task<SnapshotState> for UploadTask {
    fn transfer(&mut self, store: &mut dyn Store) -> Result<()> {
        let contents = std::fs::read(&self.source)
            .with_context(|| format!("Couldn't read {}", self.source))?;
        self.bytes = contents.len() as u64;
        debug!("{:>8} {}", "upload", self.key.path);
        store.put(&self.key.key(), &contents)
    }

    fn absorb(&mut self, state: &mut SnapshotState) -> Result<()> {
        match &mut state.manifest[self.index] {
            PathSummary::File { written, .. } => *written = true,
            PathSummary::Dir { .. } => unreachable!("upload task pointed at a directory"),
        }
        state.written.record(self.hash, self.key.clone());
        state.bytes_since_flush += self.bytes;
        state.uploaded_bytes += self.bytes;
        Ok(())
    }
}

/// Take a snapshot of `source` into the archive at `store`.
pub fn snapshot(
    store: &mut dyn Store,
    source: &Utf8Path,
    options: &BackupOptions,
) -> Result<SnapshotOutcome> {
    let manifest = walk::walk_source(source)?;
    let mut records = catalog::load_records(&*store)?;

    let stamp = catalog::now_stamp();
    if let Some(last) = records.last() {
        // One snapshot per second per archive; anything else would
        // scramble the record list's chronology.
        if catalog::parse_stamp(&stamp)? <= catalog::parse_stamp(&last.datetime)? {
            bail!(Error::Precondition(format!(
                "snapshot {stamp} doesn't postdate the previous one ({})",
                last.datetime
            )));
        }
    }

    let mut kind = options.kind;
    if kind == SnapshotKind::Incremental && records.is_empty() {
        info!("No previous snapshots, so this backup will be full anyway");
        kind = SnapshotKind::Full;
    }

    let mut written = WrittenIndex::new();
    if kind == SnapshotKind::Incremental {
        written.seed_from_group(&*store, &records)?;
    }

    // Announce intent: the path list first, then the record pointing
    // at it. An incomplete tail record is legal.
    catalog::save_manifest(store, &stamp, &manifest)?;
    records.push(BackupRecord {
        kind,
        datetime: stamp.clone(),
        completed: false,
    });
    catalog::save_records(store, &records)?;

    // Plan the uploads. First file with a given hash wins;
    // everyone else points at that copy.
    let mut tasks: Vec<Box<dyn Task<SnapshotState>>> = Vec::new();
    let mut claimed = FxHashSet::default();
    let mut files = 0usize;
    for (index, summary) in manifest.iter().enumerate() {
        let PathSummary::File { path, hash, .. } = summary else {
            continue;
        };
        files += 1;
        if let Some(prior) = written.location_of(hash) {
            debug!("{:>8} {path} (contents already at {})", "dedup", prior.key());
            continue;
        }
        if !claimed.insert(*hash) {
            debug!("{:>8} {path} (contents repeated in this snapshot)", "dedup");
            continue;
        }
        tasks.push(Box::new(UploadTask {
            index,
            source: Utf8PathBuf::from(format!("{source}{path}")),
            key: ContentKey::new(&stamp, path),
            hash: *hash,
            bytes: 0,
        }));
    }

    let uploads = tasks.len();
    info!("Backing up {source} as {stamp}: {files} files, {uploads} to upload");

    let mut state = SnapshotState {
        stamp: stamp.clone(),
        manifest,
        written,
        bytes_since_flush: 0,
        uploaded_bytes: 0,
    };
    let checkpoint_bytes = options.checkpoint_bytes;
    let mut checkpoint = |state: &mut SnapshotState, store: &mut dyn Store| -> Result<()> {
        if state.bytes_since_flush < checkpoint_bytes {
            return Ok(());
        }
        debug!(
            "Checkpointing the path list for {} ({} uploaded since last)",
            state.stamp,
            nice_size(state.bytes_since_flush)
        );
        catalog::save_manifest(store, &state.stamp, &state.manifest)?;
        state.bytes_since_flush = 0;
        Ok(())
    };

    let run_res = runner::run_tasks(
        options.runner,
        store,
        tasks,
        options.checkpoint_freq,
        &mut state,
        &mut checkpoint,
    );

    match run_res {
        Ok(()) => catalog::save_manifest(store, &stamp, &state.manifest)?,
        Err(e) => {
            // Flush what landed on the way out the door; the tail
            // record stays incomplete and the next run tolerates it.
            if let Err(flush) = catalog::save_manifest(store, &stamp, &state.manifest) {
                warn!("Couldn't flush the path list for {stamp}: {flush:#}");
            }
            return Err(e);
        }
    }

    // The completed flag is the last thing a successful snapshot writes.
    records.last_mut().expect("we just appended a record").completed = true;
    catalog::save_records(store, &records)?;

    info!(
        "Snapshot {stamp} ({kind}) finished: {} uploaded",
        nice_size(state.uploaded_bytes)
    );
    Ok(SnapshotOutcome {
        stamp,
        kind,
        files,
        uploads,
        uploaded_bytes: state.uploaded_bytes,
    })
}

//! End-to-end engine runs against an in-memory store.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};

use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use tempfile::TempDir;

use duffel::backup::{self, BackupOptions};
use duffel::catalog::{self, SnapshotKind};
use duffel::error::Error;
use duffel::manifest::PathSummary;
use duffel::restore::{self, RestoreOptions};
use duffel::runner::Runner;
use duffel::store::memory::MemoryStore;
use duffel::store::Store;

mod common;
use common::*;

fn full() -> BackupOptions {
    BackupOptions {
        kind: SnapshotKind::Full,
        ..Default::default()
    }
}

fn incremental() -> BackupOptions {
    BackupOptions {
        kind: SnapshotKind::Incremental,
        ..Default::default()
    }
}

fn restore_latest(store: &mut dyn Store) -> Result<(TempDir, Utf8PathBuf)> {
    let dir = tempfile::tempdir()?;
    let target = Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();
    restore::restore(store, &target, &RestoreOptions::default(), None)?;
    Ok((dir, target))
}

#[test]
fn full_snapshot_round_trips() -> Result<()> {
    let source = tempfile::tempdir()?;
    fs::write(source.path().join("a.txt"), "hello")?;
    fs::create_dir(source.path().join("sub"))?;
    fs::write(source.path().join("sub/b.txt"), "world")?;

    let mut store = MemoryStore::new();
    let outcome = backup::snapshot(&mut store, utf8(source.path()), &full())?;
    assert_eq!(outcome.uploads, 2);

    let records = catalog::load_records(&store)?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, SnapshotKind::Full);
    assert!(records[0].completed);

    let stamp = &outcome.stamp;
    assert!(store.contains(&format!("{stamp}/pathList"))?);
    assert_eq!(
        store.get(&format!("{stamp}/files/a.txt"))?.as_deref(),
        Some(&b"hello"[..])
    );
    assert_eq!(
        store.get(&format!("{stamp}/files/sub/b.txt"))?.as_deref(),
        Some(&b"world"[..])
    );

    let (_dir, restored) = restore_latest(&mut store)?;
    assert_dirs_equal(restored.as_std_path(), source.path());
    Ok(())
}

#[test]
fn unchanged_incremental_uploads_nothing() -> Result<()> {
    let source = tempfile::tempdir()?;
    fs::write(source.path().join("a.txt"), "hello")?;
    fs::create_dir(source.path().join("sub"))?;
    fs::write(source.path().join("sub/b.txt"), "world")?;

    let mut store = MemoryStore::new();
    backup::snapshot(&mut store, utf8(source.path()), &full())?;
    next_second();
    let second = backup::snapshot(&mut store, utf8(source.path()), &incremental())?;

    assert_eq!(second.uploads, 0);
    assert_eq!(second.uploaded_bytes, 0);
    assert!(store.list(&format!("{}/files/", second.stamp))?.is_empty());
    for summary in catalog::load_manifest(&store, &second.stamp)? {
        if let PathSummary::File { written, .. } = summary {
            assert!(!written);
        }
    }

    let (_dir, restored) = restore_latest(&mut store)?;
    assert_dirs_equal(restored.as_std_path(), source.path());
    Ok(())
}

#[test]
fn changed_files_upload_and_the_rest_dedup() -> Result<()> {
    let source = tempfile::tempdir()?;
    fs::write(source.path().join("a.txt"), "hello")?;
    fs::create_dir(source.path().join("sub"))?;
    fs::write(source.path().join("sub/b.txt"), "world")?;

    let mut store = MemoryStore::new();
    backup::snapshot(&mut store, utf8(source.path()), &full())?;

    fs::write(source.path().join("a.txt"), "HELLO")?;
    next_second();
    let second = backup::snapshot(&mut store, utf8(source.path()), &incremental())?;

    assert_eq!(second.uploads, 1);
    assert!(store.contains(&format!("{}/files/a.txt", second.stamp))?);
    assert!(!store.contains(&format!("{}/files/sub/b.txt", second.stamp))?);

    let (_dir, restored) = restore_latest(&mut store)?;
    assert_eq!(fs::read(restored.join("a.txt"))?, b"HELLO");
    assert_eq!(fs::read(restored.join("sub/b.txt"))?, b"world");
    Ok(())
}

#[test]
fn renames_reuse_stored_contents() -> Result<()> {
    let source = tempfile::tempdir()?;
    fs::write(source.path().join("old-name.txt"), "contents")?;

    let mut store = MemoryStore::new();
    backup::snapshot(&mut store, utf8(source.path()), &full())?;

    fs::rename(
        source.path().join("old-name.txt"),
        source.path().join("new-name.txt"),
    )?;
    next_second();
    let second = backup::snapshot(&mut store, utf8(source.path()), &incremental())?;
    assert_eq!(second.uploads, 0);

    let (_dir, restored) = restore_latest(&mut store)?;
    assert!(restored.join("new-name.txt").exists());
    assert!(!restored.join("old-name.txt").exists());
    Ok(())
}

#[test]
fn restoring_an_older_snapshot_by_stamp() -> Result<()> {
    let source = tempfile::tempdir()?;
    fs::write(source.path().join("a.txt"), "v1")?;

    let mut store = MemoryStore::new();
    let first = backup::snapshot(&mut store, utf8(source.path()), &full())?;
    fs::write(source.path().join("a.txt"), "v2")?;
    next_second();
    backup::snapshot(&mut store, utf8(source.path()), &incremental())?;

    let dir = tempfile::tempdir()?;
    let target = Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();
    restore::restore(
        &mut store,
        &target,
        &RestoreOptions {
            stamp: Some(first.stamp.clone()),
            ..Default::default()
        },
        None,
    )?;
    assert_eq!(fs::read(target.join("a.txt"))?, b"v1");
    Ok(())
}

#[test]
fn restore_refuses_non_empty_targets() -> Result<()> {
    let source = tempfile::tempdir()?;
    fs::write(source.path().join("a.txt"), "hello")?;
    let mut store = MemoryStore::new();
    backup::snapshot(&mut store, utf8(source.path()), &full())?;

    let target = tempfile::tempdir()?;
    fs::write(target.path().join("occupied.txt"), "already here")?;

    let err = restore::restore(
        &mut store,
        utf8(target.path()),
        &RestoreOptions::default(),
        None,
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::Precondition(_))
    ));

    // With overwrite it goes through and replaces what's there.
    fs::write(target.path().join("a.txt"), "stale")?;
    restore::restore(
        &mut store,
        utf8(target.path()),
        &RestoreOptions {
            overwrite: true,
            ..Default::default()
        },
        None,
    )?;
    assert_eq!(fs::read(target.path().join("a.txt"))?, b"hello");
    Ok(())
}

#[test]
fn pruned_groups_do_not_prop_up_survivors() -> Result<()> {
    let source = tempfile::tempdir()?;
    fs::write(source.path().join("a.txt"), "hello")?;

    let mut store = MemoryStore::new();
    backup::snapshot(&mut store, utf8(source.path()), &full())?;
    next_second();
    backup::snapshot(&mut store, utf8(source.path()), &incremental())?;
    next_second();
    // A second group; its full re-uploads everything it needs.
    let second_full = backup::snapshot(&mut store, utf8(source.path()), &full())?;
    next_second();
    backup::snapshot(&mut store, utf8(source.path()), &incremental())?;

    duffel::prune::prune(&mut store, 1, false)?;

    let records = catalog::load_records(&store)?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].datetime, second_full.stamp);

    // The surviving group restores without the pruned keys.
    let (_dir, restored) = restore_latest(&mut store)?;
    assert_dirs_equal(restored.as_std_path(), source.path());
    Ok(())
}

#[test]
fn parallel_uploads_match_sequential_results() -> Result<()> {
    let source = tempfile::tempdir()?;
    for i in 0..30 {
        fs::write(source.path().join(format!("file-{i:02}.txt")), format!("contents {i}"))?;
    }
    fs::create_dir(source.path().join("sub"))?;
    fs::write(source.path().join("sub/nested.txt"), "nested")?;

    let mut store = MemoryStore::new();
    let outcome = backup::snapshot(
        &mut store,
        utf8(source.path()),
        &BackupOptions {
            kind: SnapshotKind::Full,
            runner: Runner::Parallel { workers: 4 },
            checkpoint_freq: 8,
            ..Default::default()
        },
    )?;
    assert_eq!(outcome.uploads, 31);

    let dir = tempfile::tempdir()?;
    let target = Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();
    restore::restore(
        &mut store,
        &target,
        &RestoreOptions {
            runner: Runner::Parallel { workers: 4 },
            ..Default::default()
        },
        None,
    )?;
    assert_dirs_equal(target.as_std_path(), source.path());
    Ok(())
}

/// A store that starts refusing puts after a budget runs out -
/// a stand-in for losing the network mid-upload.
#[derive(Clone)]
struct FlakyStore {
    inner: MemoryStore,
    puts_left: Arc<AtomicIsize>,
}

impl FlakyStore {
    fn wrapping(inner: MemoryStore, puts: isize) -> Self {
        Self {
            inner,
            puts_left: Arc::new(AtomicIsize::new(puts)),
        }
    }
}

impl Store for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        if self.puts_left.fetch_sub(1, Ordering::SeqCst) <= 0 {
            bail!("store fell over");
        }
        self.inner.put(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        self.inner.contains(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }

    fn try_clone(&self) -> Result<Box<dyn Store>> {
        Ok(Box::new(self.clone()))
    }
}

#[test]
fn interrupted_snapshots_leave_an_honest_incomplete_record() -> Result<()> {
    let source = tempfile::tempdir()?;
    fs::write(source.path().join("a.txt"), "alpha")?;

    let mut store = MemoryStore::new();
    backup::snapshot(&mut store, utf8(source.path()), &full())?;

    fs::write(source.path().join("b.txt"), "bravo")?;
    fs::write(source.path().join("c.txt"), "charlie")?;
    next_second();

    // Walk order is a, b, c; a dedups against the full. Budget covers
    // the path list, the record list, b's blob, and one checkpoint -
    // then c's blob hits a dead store.
    let mut flaky = FlakyStore::wrapping(store.clone(), 4);
    let err = backup::snapshot(
        &mut flaky,
        utf8(source.path()),
        &BackupOptions {
            kind: SnapshotKind::Incremental,
            checkpoint_bytes: 0,
            checkpoint_freq: 1,
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("store fell over"));

    let records = catalog::load_records(&store)?;
    assert_eq!(records.len(), 2);
    let tail = &records[1];
    assert_eq!(tail.kind, SnapshotKind::Incremental);
    assert!(!tail.completed);

    // The checkpointed path list claims exactly what landed.
    let uploaded: Vec<(String, bool)> = catalog::load_manifest(&store, &tail.datetime)?
        .into_iter()
        .map(|summary| match summary {
            PathSummary::File { path, written, .. } => (path, written),
            PathSummary::Dir { path } => (path, false),
        })
        .collect();
    assert_eq!(
        uploaded,
        vec![
            ("/a.txt".to_owned(), false),
            ("/b.txt".to_owned(), true),
            ("/c.txt".to_owned(), false),
        ]
    );

    // Restoring the incomplete tail takes an explicit opt-in.
    let scratch = tempfile::tempdir()?;
    let err = restore::restore(
        &mut store,
        utf8(scratch.path()),
        &RestoreOptions::default(),
        None,
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::Precondition(_))
    ));

    // And the next full snapshot just appends and works.
    next_second();
    backup::snapshot(&mut store, utf8(source.path()), &full())?;
    let (_dir, restored) = restore_latest(&mut store)?;
    assert_dirs_equal(restored.as_std_path(), source.path());
    Ok(())
}

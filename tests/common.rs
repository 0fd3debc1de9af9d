#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use assert_cmd::Command;
use camino::Utf8Path;
use walkdir::WalkDir;

pub fn cli_run(config_path: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME"))?;
    cmd.arg("--config").arg(config_path);
    cmd.arg("-vvv");
    Ok(cmd)
}

/// Writes a config with one backup named "docs" and returns its path.
pub fn write_config(dir: &Path, store: &Path, source: &Path, verify_dir: &Path) -> Result<PathBuf> {
    let path = dir.join("duffel.toml");
    fs::write(
        &path,
        format!(
            "store = \"{}\"\nverify-dir = \"{}\"\n\n\
             [backups.docs]\nsource = \"{}\"\nprefix = \"docs/\"\n",
            store.display(),
            verify_dir.display(),
            source.display()
        ),
    )?;
    Ok(path)
}

pub fn utf8(path: &Path) -> &Utf8Path {
    Utf8Path::from_path(path).expect("non-UTF-8 temp path")
}

/// Everything under `base`: relative path -> file bytes,
/// or `None` for a directory.
pub fn dir_contents(base: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    WalkDir::new(base)
        .into_iter()
        .map(|entry| entry.expect("couldn't walk dir"))
        .filter(|entry| entry.path() != base)
        .map(|entry| {
            let relative = entry.path().strip_prefix(base).unwrap().to_owned();
            let contents = entry
                .file_type()
                .is_file()
                .then(|| fs::read(entry.path()).expect("couldn't read file"));
            (relative, contents)
        })
        .collect()
}

pub fn assert_dirs_equal(left: &Path, right: &Path) {
    assert_eq!(dir_contents(left), dir_contents(right));
}

/// Snapshot stamps have one-second resolution and an archive refuses
/// two in the same second, so tests put a second between snapshots.
pub fn next_second() {
    std::thread::sleep(Duration::from_millis(1100));
}

//! Walk a source directory into an ordered list of path summaries.

use std::fs;
use std::io;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::*;

use crate::hashing::ContentHash;
use crate::manifest::PathSummary;

/// Walks the tree under `base` depth-first, directories before their
/// contents, hashing every regular file.
///
/// The base directory itself isn't listed; returned paths are relative
/// to it and start with `/`. Anything that isn't a regular file or a
/// directory (symlinks, sockets, ...) is logged and skipped.
pub fn walk_source(base: &Utf8Path) -> Result<Vec<PathSummary>> {
    let mut summaries = Vec::new();
    walk_below(base, "", &mut summaries)?;
    Ok(summaries)
}

fn walk_below(base: &Utf8Path, relative: &str, out: &mut Vec<PathSummary>) -> Result<()> {
    let dir = Utf8PathBuf::from(format!("{base}{relative}"));
    let mut entries = dir
        .read_dir_utf8()
        .with_context(|| format!("Couldn't list {dir}"))?
        .collect::<io::Result<Vec<_>>>()
        .with_context(|| format!("Failed reading an entry of {dir}"))?;
    // Listing order only has to be stable for one run,
    // but sorted means it's stable across runs too.
    entries.sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in entries {
        let path = format!("{relative}/{}", entry.file_name());
        let file_type = entry
            .file_type()
            .with_context(|| format!("Couldn't stat {}", entry.path()))?;
        if file_type.is_file() {
            let contents = fs::read(entry.path())
                .with_context(|| format!("Couldn't read {}", entry.path()))?;
            let hash = ContentHash::of(&contents);
            trace!("{:>4} {path} ({hash})", "file");
            out.push(PathSummary::File {
                path,
                hash,
                written: false,
            });
        } else if file_type.is_dir() {
            trace!("{:>4} {path}", "dir");
            out.push(PathSummary::Dir { path: path.clone() });
            walk_below(base, &path, out)?;
        } else {
            warn!("Skipping {}: not a regular file or directory", entry.path());
        }
    }
    Ok(())
}

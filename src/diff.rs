//! Structural and byte-level comparison of directory trees.

use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

use crate::tree::Node;

/// One observed difference between a left and a right tree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Difference {
    LeftOnly { path: String },
    RightOnly { path: String },
    TypeMismatch { path: String },
    ContentsMismatch { path: String },
    /// Something that isn't a regular file or directory.
    Unknown { path: String },
}

impl Difference {
    /// Renders the difference with the sides named for the reader
    /// ("the source", "the snapshot", ...).
    pub fn describe(&self, left: &str, right: &str) -> String {
        match self {
            Difference::LeftOnly { path } => format!("{path} is in {left} but not {right}"),
            Difference::RightOnly { path } => format!("{path} is in {right} but not {left}"),
            Difference::TypeMismatch { path } => {
                format!("{path} is a directory on one side and a file on the other")
            }
            Difference::ContentsMismatch { path } => {
                format!("{path} differs between {left} and {right}")
            }
            Difference::Unknown { path } => {
                format!("{path} isn't a regular file or directory")
            }
        }
    }
}

/// Compare two trees by name and hash, collecting every difference.
///
/// Children are matched by name; names only on the right are swept up
/// once, after the left walk. No bytes are compared - the hashes
/// already did that work.
pub fn compare_nodes(left: &Node, right: &Node, path: &str, differences: &mut Vec<Difference>) {
    match (left, right) {
        (Node::File { hash: left_hash }, Node::File { hash: right_hash }) => {
            if left_hash != right_hash {
                differences.push(Difference::ContentsMismatch {
                    path: path.to_owned(),
                });
            }
        }
        (
            Node::Dir {
                children: left_children,
            },
            Node::Dir {
                children: right_children,
            },
        ) => {
            for (name, left_child) in left_children {
                let child_path = format!("{path}/{name}");
                match right_children.get(name) {
                    Some(right_child) => {
                        compare_nodes(left_child, right_child, &child_path, differences)
                    }
                    None => differences.push(Difference::LeftOnly { path: child_path }),
                }
            }
            for name in right_children.keys() {
                if !left_children.contains_key(name) {
                    differences.push(Difference::RightOnly {
                        path: format!("{path}/{name}"),
                    });
                }
            }
        }
        _ => differences.push(Difference::TypeMismatch {
            path: path.to_owned(),
        }),
    }
}

/// Compare two directories on disk, byte for byte.
pub fn compare_dir_bytes(left: &Utf8Path, right: &Utf8Path) -> Result<Vec<Difference>> {
    let mut differences = Vec::new();
    compare_dirs(left, right, "", &mut differences)?;
    Ok(differences)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Kind {
    File,
    Dir,
    Other,
}

fn list_kinds(dir: &Utf8Path) -> Result<BTreeMap<String, Kind>> {
    let mut kinds = BTreeMap::new();
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("Couldn't list {dir}"))?
    {
        let entry = entry.with_context(|| format!("Failed reading an entry of {dir}"))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("Couldn't stat {}", entry.path()))?;
        let kind = if file_type.is_dir() {
            Kind::Dir
        } else if file_type.is_file() {
            Kind::File
        } else {
            Kind::Other
        };
        kinds.insert(entry.file_name().to_owned(), kind);
    }
    Ok(kinds)
}

fn compare_dirs(
    left_base: &Utf8Path,
    right_base: &Utf8Path,
    sub: &str,
    out: &mut Vec<Difference>,
) -> Result<()> {
    let left_kinds = list_kinds(&join(left_base, sub))?;
    let right_kinds = list_kinds(&join(right_base, sub))?;

    for (name, left_kind) in &left_kinds {
        let child = format!("{sub}/{name}");
        match right_kinds.get(name) {
            None => out.push(Difference::LeftOnly { path: child }),
            Some(right_kind) => match (left_kind, right_kind) {
                (Kind::Dir, Kind::Dir) => compare_dirs(left_base, right_base, &child, out)?,
                (Kind::File, Kind::File) => {
                    let left_path = join(left_base, &child);
                    let right_path = join(right_base, &child);
                    let left_bytes = fs::read(&left_path)
                        .with_context(|| format!("Couldn't read {left_path}"))?;
                    let right_bytes = fs::read(&right_path)
                        .with_context(|| format!("Couldn't read {right_path}"))?;
                    if left_bytes != right_bytes {
                        out.push(Difference::ContentsMismatch { path: child });
                    }
                }
                (Kind::Other, _) | (_, Kind::Other) => {
                    out.push(Difference::Unknown { path: child })
                }
                _ => out.push(Difference::TypeMismatch { path: child }),
            },
        }
    }
    for name in right_kinds.keys() {
        if !left_kinds.contains_key(name) {
            out.push(Difference::RightOnly {
                path: format!("{sub}/{name}"),
            });
        }
    }
    Ok(())
}

fn join(base: &Utf8Path, sub: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{base}{sub}"))
}

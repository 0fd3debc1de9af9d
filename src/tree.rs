//! In-memory (name, hash) trees for structural comparison.
//!
//! Both sides of a verification build one of these - from a fresh walk
//! of the local filesystem on one side, and from a snapshot's path
//! list on the other - then hand them to [`crate::diff`].

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use camino::Utf8Path;
use tracing::*;

use crate::hashing::ContentHash;

/// A named node: a file with a content hash, or a directory of
/// children keyed by name.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Node {
    File { hash: ContentHash },
    Dir { children: BTreeMap<String, Node> },
}

impl Node {
    pub fn empty_dir() -> Self {
        Node::Dir {
            children: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn children(&self) -> &BTreeMap<String, Node> {
        match self {
            Node::Dir { children } => children,
            Node::File { .. } => panic!("Expected a directory"),
        }
    }

    fn children_mut(&mut self) -> &mut BTreeMap<String, Node> {
        match self {
            Node::Dir { children } => children,
            Node::File { .. } => panic!("Expected a directory"),
        }
    }

    /// Hang a file at the given `/`-prefixed path,
    /// synthesising intermediate directories as needed.
    pub fn add_file(&mut self, path: &str, hash: ContentHash) {
        self.add(path, Node::File { hash });
    }

    /// Hang a (possibly empty) directory at the given `/`-prefixed path.
    pub fn add_dir(&mut self, path: &str) {
        let (first, remainder) = split_path(path);
        match remainder {
            // Don't clobber a directory that already picked up children.
            None => {
                self.children_mut()
                    .entry(first.to_owned())
                    .or_insert_with(Node::empty_dir);
            }
            Some(remainder) => {
                let child = self
                    .children_mut()
                    .entry(first.to_owned())
                    .or_insert_with(Node::empty_dir);
                child.add_dir(remainder);
            }
        }
    }

    fn add(&mut self, path: &str, node: Node) {
        let (first, remainder) = split_path(path);
        match remainder {
            None => {
                self.children_mut().insert(first.to_owned(), node);
            }
            Some(remainder) => {
                let child = self
                    .children_mut()
                    .entry(first.to_owned())
                    .or_insert_with(Node::empty_dir);
                child.add(remainder, node);
            }
        }
    }
}

/// `/a/b/c` -> `("a", Some("/b/c"))`; `/a` -> `("a", None)`.
fn split_path(path: &str) -> (&str, Option<&str>) {
    let rest = path.strip_prefix('/').expect("paths start with /");
    match rest.find('/') {
        Some(slash) => (&rest[..slash], Some(&rest[slash..])),
        None => (rest, None),
    }
}

/// Reads a directory into a tree, hashing every file in it.
pub fn from_filesystem(dir: &Utf8Path) -> Result<Node> {
    let mut children = BTreeMap::new();
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("Couldn't list {dir}"))?
    {
        let entry = entry.with_context(|| format!("Failed reading an entry of {dir}"))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("Couldn't stat {}", entry.path()))?;
        let name = entry.file_name().to_owned();
        if file_type.is_dir() {
            children.insert(name, from_filesystem(entry.path())?);
        } else if file_type.is_file() {
            let contents = std::fs::read(entry.path())
                .with_context(|| format!("Couldn't read {}", entry.path()))?;
            children.insert(
                name,
                Node::File {
                    hash: ContentHash::of(&contents),
                },
            );
        } else {
            warn!("Skipping {}: not a regular file or directory", entry.path());
        }
    }
    Ok(Node::Dir { children })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn build_from_flat_paths() {
        let mut root = Node::empty_dir();
        root.add_file("/a.txt", ContentHash::of(b"hello"));
        root.add_dir("/sub");
        root.add_file("/sub/b.txt", ContentHash::of(b"world"));
        // Intermediate directories appear even when never declared.
        root.add_file("/deep/nested/c.txt", ContentHash::of(b"!"));

        let children = root.children();
        assert_eq!(
            children.keys().collect::<Vec<_>>(),
            vec!["a.txt", "deep", "sub"]
        );
        assert_eq!(
            children["sub"].children()["b.txt"],
            Node::File {
                hash: ContentHash::of(b"world")
            }
        );
        assert!(matches!(
            children["deep"].children()["nested"].children()["c.txt"],
            Node::File { .. }
        ));
    }

    #[test]
    fn declaring_a_dir_after_its_children_keeps_them() {
        let mut root = Node::empty_dir();
        root.add_file("/sub/b.txt", ContentHash::of(b"world"));
        root.add_dir("/sub");
        assert_eq!(root.children()["sub"].children().len(), 1);
    }

    #[test]
    fn filesystem_and_flat_builds_agree() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let base = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::write(base.join("a.txt"), "hello")?;
        std::fs::create_dir(base.join("sub"))?;
        std::fs::write(base.join("sub/b.txt"), "world")?;

        let from_fs = from_filesystem(base)?;

        let mut from_paths = Node::empty_dir();
        from_paths.add_file("/a.txt", ContentHash::of(b"hello"));
        from_paths.add_dir("/sub");
        from_paths.add_file("/sub/b.txt", ContentHash::of(b"world"));

        assert_eq!(from_fs, from_paths);
        Ok(())
    }
}

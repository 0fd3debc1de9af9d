//! The rows of a snapshot's path list, and the keys their contents
//! live under.

use serde_derive::{Deserialize, Serialize};

use crate::hashing::ContentHash;

/// One filesystem entry in a snapshot, in walk order.
///
/// Paths are relative to the backup root, start with `/`, and use `/`
/// separators on every platform. A directory always appears before
/// anything inside it, so replaying the list in order just works.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum PathSummary {
    File {
        path: String,
        hash: ContentHash,
        /// Flipped once this file's bytes have been uploaded by the
        /// snapshot holding this list.
        written: bool,
    },
    Dir {
        path: String,
    },
}

impl PathSummary {
    pub fn path(&self) -> &str {
        match self {
            PathSummary::File { path, .. } | PathSummary::Dir { path } => path,
        }
    }
}

/// Addresses the blob for a file first uploaded by the snapshot taken
/// at `stamp`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ContentKey {
    pub stamp: String,
    pub path: String,
}

impl ContentKey {
    pub fn new(stamp: &str, path: &str) -> Self {
        Self {
            stamp: stamp.to_owned(),
            path: path.to_owned(),
        }
    }

    /// The store key holding the file's bytes. The `files` infix keeps
    /// the rest of the snapshot's subspace free for metadata.
    pub fn key(&self) -> String {
        format!("{}/files{}", self.stamp, self.path)
    }
}

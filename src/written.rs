//! Which content hashes the current backup group already holds,
//! and where. This is what makes an incremental snapshot incremental.

use anyhow::Result;
use rustc_hash::FxHashMap;
use tracing::*;

use crate::catalog::{self, BackupRecord, SnapshotKind};
use crate::hashing::ContentHash;
use crate::manifest::{ContentKey, PathSummary};
use crate::store::Store;

#[derive(Debug, Default)]
pub struct WrittenIndex {
    locations: FxHashMap<ContentHash, ContentKey>,
}

impl WrittenIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk records backward from the latest, absorbing each
    /// manifest's written files, and stop once the group's full
    /// snapshot is in. Nothing outside the group is consulted -
    /// a group has to stay restorable after its predecessors
    /// are pruned.
    pub fn seed_from_group(
        &mut self,
        store: &dyn Store,
        records: &[BackupRecord],
    ) -> Result<()> {
        for record in records.iter().rev() {
            debug!("Seeding dedup index from {}", record.datetime);
            self.absorb_manifest(store, &record.datetime)?;
            if record.kind == SnapshotKind::Full {
                break;
            }
        }
        Ok(())
    }

    fn absorb_manifest(&mut self, store: &dyn Store, stamp: &str) -> Result<()> {
        for summary in catalog::load_manifest(store, stamp)? {
            if let PathSummary::File {
                path,
                hash,
                written: true,
            } = summary
            {
                // Walking backwards, so if a later snapshot already
                // claimed this hash, it wins - same tie-break as the
                // restore planner.
                self.locations
                    .entry(hash)
                    .or_insert_with(|| ContentKey::new(stamp, &path));
            }
        }
        Ok(())
    }

    pub fn is_written(&self, hash: &ContentHash) -> bool {
        self.locations.contains_key(hash)
    }

    pub fn location_of(&self, hash: &ContentHash) -> Option<&ContentKey> {
        self.locations.get(hash)
    }

    pub fn record(&mut self, hash: ContentHash, key: ContentKey) {
        self.locations.insert(hash, key);
    }
}

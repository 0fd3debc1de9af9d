//! Retire old backup groups and reclaim their keys.

use anyhow::{Result, bail};
use tracing::*;

use crate::catalog::{self, BackupRecord};
use crate::error::Error;
use crate::store::Store;

/// Keep the `keep` most recent backup groups and delete the rest.
///
/// The record list is rewritten before any keys go away, so an
/// interrupted prune strands some garbage instead of leaving records
/// that point at deleted data. Running it again with the same `keep`
/// is a no-op.
pub fn prune(store: &mut dyn Store, keep: usize, dry_run: bool) -> Result<()> {
    if keep < 1 {
        bail!(Error::Precondition(format!(
            "must keep at least one backup group (asked to keep {keep})"
        )));
    }
    let records = catalog::load_records(&*store)?;
    let groups = catalog::group_records(&records);
    if groups.len() <= keep {
        info!("{} groups, keeping {keep}: nothing to prune", groups.len());
        return Ok(());
    }

    let cut = groups.len() - keep;
    let doomed: Vec<BackupRecord> = groups[..cut].concat();
    let survivors: Vec<BackupRecord> = groups[cut..].concat();

    let prefix = if dry_run { "DRYRUN: " } else { "" };
    if !dry_run {
        catalog::save_records(store, &survivors)?;
    }
    for record in &doomed {
        debug!("{prefix}Pruning snapshot {}", record.datetime);
        for key in store.list(&format!("{}/", record.datetime))? {
            info!("{prefix}delete {key}");
            if !dry_run {
                store.delete(&key)?;
            }
        }
    }
    info!(
        "{prefix}Pruned {} snapshots in {} groups, kept {keep} groups",
        doomed.len(),
        cut
    );
    Ok(())
}

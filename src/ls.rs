//! Print an archive's snapshots, grouped.

use anyhow::Result;

use crate::catalog;
use crate::store::Store;

/// One line per snapshot, oldest first. `*` marks the head of each
/// backup group; snapshots that never finished get called out.
pub fn list_backups(store: &dyn Store) -> Result<()> {
    let records = catalog::load_records(store)?;
    if records.is_empty() {
        println!("No snapshots.");
        return Ok(());
    }
    for group in catalog::group_records(&records) {
        for (i, record) in group.iter().enumerate() {
            let head = if i == 0 { '*' } else { ' ' };
            let flag = if record.completed { "" } else { " (incomplete)" };
            println!("{head} {} {}{flag}", record.datetime, record.kind);
        }
    }
    Ok(())
}

use anyhow::Result;
use clap::Parser;

use crate::config::Configuration;
use crate::ls;

/// List a backup's snapshots, grouped.
#[derive(Debug, Parser)]
pub struct Args {
    /// The configured backup to list.
    name: String,
}

pub fn run(config: &Configuration, args: Args) -> Result<()> {
    let store = config.open_archive(&args.name)?;
    ls::list_backups(store.as_ref())
}

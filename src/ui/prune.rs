use anyhow::Result;
use clap::Parser;

use crate::config::Configuration;
use crate::prune;

/// Delete all but the most recent backup groups.
#[derive(Debug, Parser)]
pub struct Args {
    /// How many backup groups to keep.
    #[clap(short, long, default_value_t = 1, value_name = "GROUPS")]
    keep: usize,

    /// Print what would be deleted without deleting anything.
    #[clap(short = 'n', long)]
    dry_run: bool,

    /// The configured backup to prune.
    name: String,
}

pub fn run(config: &Configuration, args: Args) -> Result<()> {
    let mut store = config.open_archive(&args.name)?;
    prune::prune(store.as_mut(), args.keep, args.dry_run)
}

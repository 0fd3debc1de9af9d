use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;

use crate::config::Configuration;
use crate::restore::{self, RestoreOptions};
use crate::runner;

/// Materialise a snapshot into a directory.
#[derive(Debug, Parser)]
pub struct Args {
    /// Directory to restore into (created if absent).
    #[clap(short, long, value_name = "DIR")]
    output: Utf8PathBuf,

    /// Restore this snapshot instead of the latest.
    #[clap(short, long, value_name = "DATETIME")]
    snapshot: Option<String>,

    /// Restore into a non-empty directory, replacing existing files.
    #[clap(long)]
    overwrite: bool,

    /// Restore a snapshot that never finished uploading.
    #[clap(long)]
    allow_incomplete: bool,

    /// Fetch with this many parallel workers (0 or 1 for none).
    #[clap(short = 'j', long, default_value_t = runner::DEFAULT_WORKERS, value_name = "COUNT")]
    workers: usize,

    /// The configured backup to restore from.
    name: String,
}

pub fn run(config: &Configuration, args: Args) -> Result<()> {
    let mut store = config.open_archive(&args.name)?;
    let stamp = restore::restore(
        store.as_mut(),
        &args.output,
        &RestoreOptions {
            stamp: args.snapshot,
            overwrite: args.overwrite,
            allow_incomplete: args.allow_incomplete,
            runner: super::runner_for(args.workers),
        },
        None,
    )?;
    println!("Restored {stamp} to {}", args.output);
    Ok(())
}

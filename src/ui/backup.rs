use anyhow::{Result, bail};
use clap::Parser;

use crate::backup::{self, BackupOptions};
use crate::catalog::SnapshotKind;
use crate::config::Configuration;
use crate::error::Error;
use crate::prettify::nice_size;
use crate::runner;
use crate::verify;

/// Snapshot a configured backup, optionally verifying it after.
#[derive(Debug, Parser)]
pub struct Args {
    /// Upload every file instead of reusing the current group's.
    #[clap(long)]
    full: bool,

    /// Afterwards, restore to the configured scratch directory and
    /// compare bytes against the source.
    #[clap(long, conflicts_with = "verify_incremental")]
    verify: bool,

    /// Afterwards, compare the source's hashes against hashes read
    /// back from the store. No scratch restore needed.
    #[clap(long)]
    verify_incremental: bool,

    /// Verify only; don't take a new snapshot.
    #[clap(long)]
    skip_backup: bool,

    /// Upload with this many parallel workers (0 or 1 for none).
    #[clap(short = 'j', long, default_value_t = runner::DEFAULT_WORKERS, value_name = "COUNT")]
    workers: usize,

    /// The configured backup to snapshot.
    name: String,
}

pub fn run(config: &Configuration, args: Args) -> Result<()> {
    if args.skip_backup && !args.verify && !args.verify_incremental {
        bail!(Error::Configuration(
            "--skip-backup without --verify or --verify-incremental does nothing".into()
        ));
    }

    let target = config.target(&args.name)?;
    let mut store = config.open_archive(&args.name)?;
    let runner = super::runner_for(args.workers);

    if !args.skip_backup {
        let kind = if args.full {
            SnapshotKind::Full
        } else {
            SnapshotKind::Incremental
        };
        let outcome = backup::snapshot(
            store.as_mut(),
            &target.source,
            &BackupOptions {
                kind,
                runner,
                ..Default::default()
            },
        )?;
        println!(
            "Snapshot {} ({}): {} files, {} uploaded ({})",
            outcome.stamp,
            outcome.kind,
            outcome.files,
            outcome.uploads,
            nice_size(outcome.uploaded_bytes)
        );
    }

    if args.verify {
        let scratch = config.verify_dir.as_deref().ok_or_else(|| {
            Error::Configuration(
                "full verification needs a verify-dir in the configuration".into(),
            )
        })?;
        verify::verify_full(store.as_mut(), &target.source, scratch, runner)?;
        println!("Verified {} against its latest snapshot", target.source);
    } else if args.verify_incremental {
        verify::verify_incremental(store.as_mut(), &target.source)?;
        println!("Verified {} against its latest snapshot", target.source);
    }
    Ok(())
}

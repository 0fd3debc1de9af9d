//! CLI subcommands.

use crate::runner::Runner;

pub mod backup;
pub mod prune;
pub mod restore;
pub mod snapshots;

/// Maps a `--workers` count onto a runner; one worker is no better
/// than doing it ourselves.
fn runner_for(workers: usize) -> Runner {
    match workers {
        0 | 1 => Runner::Sequential,
        workers => Runner::Parallel { workers },
    }
}

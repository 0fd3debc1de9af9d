use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;

use duffel::config;
use duffel::ui;

/// Incremental, deduplicated directory backups into a key/value store.
#[derive(Debug, Parser)]
#[clap(version, verbatim_doc_comment)]
struct Args {
    /// Verbosity (-v, -vv, -vvv, etc.)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to ~/.config/duffel.toml)
    #[clap(short, long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    Backup(ui::backup::Args),
    Restore(ui::restore::Args),
    Snapshots(ui::snapshots::Args),
    Prune(ui::prune::Args),
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let config = config::load(args.config.as_deref())?;

    match args.subcommand {
        Subcommand::Backup(b) => ui::backup::run(&config, b),
        Subcommand::Restore(r) => ui::restore::run(&config, r),
        Subcommand::Snapshots(s) => ui::snapshots::run(&config, s),
        Subcommand::Prune(p) => ui::prune::run(&config, p),
    }
}

/// Messages go to stderr so they don't mix with subcommand output.
fn init_logger(verbosity: u8) {
    use tracing_subscriber::filter::LevelFilter;

    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

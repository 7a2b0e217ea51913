use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use fswatcher_core::watcher::{FsWatcher, OnChange};

#[derive(Parser)]
#[command(name = "fswatcher", about = "Watch config and asset files for changes")]
struct Cli {
    /// Files to watch
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Don't log content changes (removals are still logged)
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fswatcher=info".parse()?)
                .add_directive("fswatcher_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!(files = ?cli.files, "starting fswatcher");

    let mut watcher = FsWatcher::new().context("failed to create filesystem watcher")?;

    let on_change: Option<OnChange> = if cli.quiet {
        None
    } else {
        Some(Box::new(|| tracing::info!("content changed")))
    };
    let logger = tracing::dispatcher::get_default(|d| d.clone());

    watcher
        .watch_files(&cli.files, on_change, Some(logger))
        .context("failed to register files")?;
    tracing::info!(count = cli.files.len(), "watching files");

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    tracing::info!("shutting down");

    watcher.close().context("failed to close watcher")?;
    Ok(())
}

//! Binary entry point: parses the CLI, builds the tracing subscriber, and
//! hands off to the orchestrator. `anyhow` only wraps the outer boundary —
//! the library itself reports through `CrawlError`.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use git_dump::cli::Cli;
use git_dump::orchestrator::{self, Options};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .compact()
        .init();

    let proxy = cli
        .validate()
        .context("validating command-line arguments")?;

    let opts = Options {
        url: cli.url,
        out_dir: cli.dir,
        jobs: cli.jobs,
        retries: cli.retry,
        timeout: std::time::Duration::from_secs(cli.timeout),
        proxy,
    };

    orchestrator::run(opts)
        .await
        .context("crawling the exposed repository")?;

    Ok(())
}

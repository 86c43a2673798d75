//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;

use crate::error::CrawlError;
use crate::http::ProxySpec;

#[derive(Parser, Debug)]
#[command(
    name = "git-dump",
    version,
    about = "Reconstructs a local git repository clone from an exposed .git/ tree on an HTTP(S) server"
)]
pub struct Cli {
    /// Base URL of the exposed repository (e.g. https://example.com/app)
    pub url: String,

    /// Output directory to write the reconstructed .git/ tree into
    pub dir: PathBuf,

    /// Proxy spec: socks5:host:port, socks4:host:port, http://host:port, or
    /// host:port (defaults to SOCKS5)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Number of simultaneous requests
    #[arg(short = 'j', long = "jobs", default_value_t = 10)]
    pub jobs: usize,

    /// Number of request attempts before giving up on a connection error
    #[arg(short = 'r', long = "retry", default_value_t = 3)]
    pub retry: u32,

    /// Maximum time in seconds before giving up on a single request
    #[arg(short = 't', long = "timeout", default_value_t = 3)]
    pub timeout: u64,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Validates the bounds the source tool enforces via `argparse.error`
    /// (jobs/retry/timeout must all be >= 1) and parses `--proxy`.
    pub fn validate(&self) -> Result<Option<ProxySpec>, CrawlError> {
        if self.jobs < 1 {
            return Err(CrawlError::InvalidArgument(
                "invalid number of jobs".to_string(),
            ));
        }
        if self.retry < 1 {
            return Err(CrawlError::InvalidArgument(
                "invalid number of retries".to_string(),
            ));
        }
        if self.timeout < 1 {
            return Err(CrawlError::InvalidArgument("invalid timeout".to_string()));
        }

        self.proxy.as_deref().map(ProxySpec::parse).transpose()
    }
}

//! The four worker kinds.

pub mod download;
pub mod find_objects;
pub mod find_refs;
pub mod recursive;

use std::path::PathBuf;

use reqwest::Client;
use tracing::warn;

use crate::error::CrawlError;
use crate::http::{self, ClientConfig};

/// Everything a worker closure needs, shared behind an `Arc` across every
/// task in a phase. The HTTP session itself is deliberately not part of this
/// struct: each spawned worker task owns its own `Client` for the lifetime
/// of the phase, built fresh at spawn time and rebuilt independently of
/// every other in-flight task whenever its own fetches hit a 403.
pub struct WorkerContext {
    pub base_url: String,
    pub out_dir: PathBuf,
    pub retries: u32,
    pub client_cfg: ClientConfig,
}

impl WorkerContext {
    pub fn new(
        base_url: String,
        out_dir: PathBuf,
        retries: u32,
        client_cfg: ClientConfig,
    ) -> Result<Self, CrawlError> {
        // Build one up front purely to fail fast on a bad proxy spec.
        http::build_client(&client_cfg)?;
        Ok(Self {
            base_url,
            out_dir,
            retries,
            client_cfg,
        })
    }

    pub fn url_for(&self, relative: &str) -> String {
        format!("{}/{}", self.base_url, relative)
    }

    /// Builds a fresh session. Called once by each spawned worker task
    /// before it starts dequeuing, and never shared with any other task.
    pub fn build_client(&self) -> Result<Client, CrawlError> {
        http::build_client(&self.client_cfg)
    }

    /// Runs the shared 403-retry loop against `relative` using the caller's
    /// own session, handing it back (rebuilt if a 403 was hit) alongside the
    /// final response.
    pub async fn fetch(&self, client: Client, relative: &str) -> (Client, Option<reqwest::Response>) {
        let url = self.url_for(relative);
        match http::fetch_with_403_retry(client, &self.client_cfg, &url, self.retries).await {
            Ok((new_client, resp)) => (new_client, resp),
            Err(err) => {
                warn!("failed to rebuild client while fetching {url}: {err}");
                let fallback = self.build_client().unwrap_or_else(|_| Client::new());
                (fallback, None)
            }
        }
    }
}

//! HTTP client factory and the retry/back-off helpers shared by every worker.

use std::time::Duration;

use reqwest::{Client, Proxy, StatusCode};
use tracing::{info, warn};

use crate::error::CrawlError;

/// Parameters every worker session is built from.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub proxy: Option<ProxySpec>,
    pub timeout: Duration,
}

/// A parsed `--proxy` value.
#[derive(Debug, Clone)]
pub enum ProxySpec {
    Socks5 { host: String, port: u16 },
    /// `reqwest`'s `socks` feature has no SOCKS4 connector; this is wired to
    /// a SOCKS5 proxy against the same host:port instead.
    Socks4 { host: String, port: u16 },
    Http { host: String, port: u16 },
}

impl ProxySpec {
    /// Matches `socks5:host:port`, `socks4:host:port`, `http://host:port`, or
    /// a bare `host:port` (which defaults to SOCKS5), first pattern wins.
    pub fn parse(spec: &str) -> Result<Self, CrawlError> {
        let re = regex::Regex::new(
            r"^(?:(?P<socks5>socks5):(?P<h1>.+):(?P<p1>\d+)$)|^(?:(?P<socks4>socks4):(?P<h2>.+):(?P<p2>\d+)$)|^(?:http://(?P<h3>.+):(?P<p3>\d+)$)|^(?:(?P<h4>.+):(?P<p4>\d+)$)",
        )
        .expect("static proxy regex is valid");

        let caps = re
            .captures(spec)
            .ok_or_else(|| CrawlError::InvalidProxy(spec.to_string()))?;

        let parse_port = |s: &str| -> Result<u16, CrawlError> {
            s.parse()
                .map_err(|_| CrawlError::InvalidProxy(spec.to_string()))
        };

        if let (Some(h), Some(p)) = (caps.name("h1"), caps.name("p1")) {
            return Ok(ProxySpec::Socks5 {
                host: h.as_str().to_string(),
                port: parse_port(p.as_str())?,
            });
        }
        if let (Some(h), Some(p)) = (caps.name("h2"), caps.name("p2")) {
            return Ok(ProxySpec::Socks4 {
                host: h.as_str().to_string(),
                port: parse_port(p.as_str())?,
            });
        }
        if let (Some(h), Some(p)) = (caps.name("h3"), caps.name("p3")) {
            return Ok(ProxySpec::Http {
                host: h.as_str().to_string(),
                port: parse_port(p.as_str())?,
            });
        }
        if let (Some(h), Some(p)) = (caps.name("h4"), caps.name("p4")) {
            return Ok(ProxySpec::Socks5 {
                host: h.as_str().to_string(),
                port: parse_port(p.as_str())?,
            });
        }

        Err(CrawlError::InvalidProxy(spec.to_string()))
    }

    fn to_reqwest_proxy(&self) -> Result<Proxy, CrawlError> {
        match self {
            ProxySpec::Socks5 { host, port } => Proxy::all(format!("socks5h://{host}:{port}"))
                .map_err(CrawlError::Http),
            ProxySpec::Socks4 { host, port } => {
                warn!(
                    "proxy spec uses socks4:, but this build only speaks SOCKS5 — \
                     connecting to {host}:{port} over SOCKS5 instead"
                );
                Proxy::all(format!("socks5h://{host}:{port}")).map_err(CrawlError::Http)
            }
            ProxySpec::Http { host, port } => {
                Proxy::all(format!("http://{host}:{port}")).map_err(CrawlError::Http)
            }
        }
    }
}

/// Builds a fresh session: redirects disabled, TLS verification disabled
/// (the whole point of this tool is fetching from misconfigured servers),
/// proxy injected if configured, bounded per-request timeout.
pub fn build_client(cfg: &ClientConfig) -> Result<Client, CrawlError> {
    let mut builder = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .timeout(cfg.timeout)
        .gzip(true);

    if let Some(proxy) = &cfg.proxy {
        builder = builder.proxy(proxy.to_reqwest_proxy()?);
    }

    builder.build().map_err(CrawlError::Http)
}

/// Sends `GET url` with a connection-level retry wrapper (bounded by
/// `retries`) and returns the response, or the last error if every attempt
/// failed at the transport layer. Does not interpret the HTTP status — the
/// 403 cooldown loop (`fetch_with_403_retry`) wraps this.
pub async fn get_with_retry(
    client: &Client,
    url: &str,
    retries: u32,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.get(url).send().await {
            Ok(resp) => return Ok(resp),
            Err(err) if attempt <= retries => {
                warn!("connection error on attempt {attempt}/{retries} for {url}: {err}");
                tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// The 403-retry loop shared by every worker kind: up to 5 attempts,
/// rebuilding the session and sleeping 10s on each 403. Returns the final
/// response (whatever its status) once a non-403 status is observed or the
/// attempt budget is exhausted, plus the possibly-rebuilt client.
pub async fn fetch_with_403_retry(
    mut client: Client,
    cfg: &ClientConfig,
    url: &str,
    retries: u32,
) -> Result<(Client, Option<reqwest::Response>), CrawlError> {
    const MAX_403_ATTEMPTS: u32 = 5;

    for attempt in 1..=MAX_403_ATTEMPTS {
        let resp = get_with_retry(&client, url, retries).await;
        match resp {
            Ok(resp) => {
                let status = resp.status();
                info!("[{attempt}] Fetching {url} [{status}]");
                if status == StatusCode::FORBIDDEN {
                    client = build_client(cfg)?;
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    continue;
                }
                return Ok((client, Some(resp)));
            }
            Err(err) => {
                warn!("[{attempt}] Fetching {url} failed: {err}");
                return Ok((client, None));
            }
        }
    }

    Ok((client, None))
}

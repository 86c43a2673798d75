//! Phase orchestrator: sequences the six phases, assembling each phase's
//! seed set from the filesystem state the previous phase produced.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::error::CrawlError;
use crate::fs_sink;
use crate::gitfmt;
use crate::html;
use crate::http::ClientConfig;
use crate::pool::run_pool;
use crate::task::Oid;
use crate::workers::{download, find_objects, find_refs, recursive, WorkerContext};

/// Tunables threaded through every phase.
pub struct Options {
    pub url: String,
    pub out_dir: PathBuf,
    pub jobs: usize,
    pub retries: u32,
    pub timeout: std::time::Duration,
    pub proxy: Option<crate::http::ProxySpec>,
}

/// Normalizes a user-supplied URL to the repository's external parent URL:
/// strip trailing slashes, an optional trailing `HEAD`, and an optional
/// trailing `.git`, in that order, re-stripping slashes after each removal.
fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim_end_matches('/').to_string();
    if let Some(stripped) = url.strip_suffix("HEAD") {
        url = stripped.trim_end_matches('/').to_string();
    }
    if let Some(stripped) = url.strip_suffix(".git") {
        url = stripped.trim_end_matches('/').to_string();
    }
    url
}

/// Runs the full crawl. Returns `Ok(())` on success (including the
/// directory-listing fast path's early return); a fatal `CrawlError`
/// otherwise.
pub async fn run(opts: Options) -> Result<(), CrawlError> {
    tokio::fs::create_dir_all(&opts.out_dir).await?;

    let base_url = normalize_base_url(&opts.url);
    let client_cfg = ClientConfig {
        proxy: opts.proxy.clone(),
        timeout: opts.timeout,
    };

    let ctx = Arc::new(WorkerContext::new(
        base_url.clone(),
        opts.out_dir.clone(),
        opts.retries,
        client_cfg,
    )?);

    // Phase 0: probe .git/HEAD.
    probe_head(&ctx).await?;

    // Phase 1: directory-listing fast path.
    if try_directory_listing_fast_path(&ctx, opts.jobs).await? {
        remind_user_to_checkout(&opts.out_dir);
        return Ok(());
    }

    // Phase 2: common static files.
    info!("[-] Fetching common files");
    run_pool(
        common_files().into_iter().collect(),
        HashSet::new(),
        opts.jobs,
        Arc::clone(&ctx),
        new_session(&ctx),
        |task, ctx, client| async move { download::do_task(task, ctx, client).await },
    )
    .await;

    // Phase 3: refs discovery.
    info!("[-] Finding refs/");
    run_pool(
        refs_seed_paths(),
        HashSet::new(),
        opts.jobs,
        Arc::clone(&ctx),
        new_session(&ctx),
        |task, ctx, client| async move { find_refs::do_task(task, ctx, client).await },
    )
    .await;

    // Phase 4: packs discovery.
    info!("[-] Finding packs");
    let pack_tasks = discover_pack_tasks(&opts.out_dir).await;
    run_pool(
        pack_tasks,
        HashSet::new(),
        opts.jobs,
        Arc::clone(&ctx),
        new_session(&ctx),
        |task, ctx, client| async move { download::do_task(task, ctx, client).await },
    )
    .await;

    // Phase 5: object discovery and fetch.
    info!("[-] Finding objects");
    let (objs, packed) = assemble_object_seeds(&opts.out_dir).await?;
    info!("[-] Fetching objects");
    run_pool(
        objs.into_iter().collect(),
        packed,
        opts.jobs,
        Arc::clone(&ctx),
        new_session(&ctx),
        |task, ctx, client| async move { find_objects::do_task(task, ctx, client).await },
    )
    .await;

    remind_user_to_checkout(&opts.out_dir);
    Ok(())
}

/// Builds a per-spawned-task session factory out of `ctx`'s client config.
/// Each worker task in a phase calls this exactly once, at spawn time, and
/// from then on owns the `Client` it returns for that task's whole
/// lifetime — a fresh build on failure falls back to `Client::new()` rather
/// than panicking a worker task over a proxy hiccup.
fn new_session(ctx: &Arc<WorkerContext>) -> impl Fn() -> reqwest::Client + Send + Sync + 'static {
    let ctx = Arc::clone(ctx);
    move || ctx.build_client().unwrap_or_else(|_| reqwest::Client::new())
}

async fn probe_head(ctx: &WorkerContext) -> Result<(), CrawlError> {
    let client = ctx.build_client()?;
    let (_client, response) = ctx.fetch(client, ".git/HEAD").await;
    let response = response.ok_or_else(|| CrawlError::HeadProbeFailed(ctx.base_url.clone()))?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(CrawlError::HeadProbeFailed(ctx.base_url.clone()));
    }

    let body = response
        .text()
        .await
        .map_err(|_| CrawlError::HeadProbeFailed(ctx.base_url.clone()))?;

    if !body.starts_with("ref:") {
        return Err(CrawlError::NotAGitHead(ctx.base_url.clone()));
    }

    Ok(())
}

/// Phase 1: if `<base>/.git/` is an HTML listing that advertises `HEAD`,
/// recursively mirror the whole tree and report success.
async fn try_directory_listing_fast_path(
    ctx: &Arc<WorkerContext>,
    jobs: usize,
) -> Result<bool, CrawlError> {
    let client = ctx.build_client()?;
    let (_client, response) = ctx.fetch(client, ".git/").await;
    let Some(response) = response else {
        return Ok(false);
    };
    if response.status() != reqwest::StatusCode::OK {
        return Ok(false);
    }
    let Ok(body) = response.text().await else {
        return Ok(false);
    };
    if !html::is_html(&body) {
        return Ok(false);
    }
    let listing = html::parse_directory_listing(&body);
    if !listing.iter().any(|entry| entry == "HEAD") {
        return Ok(false);
    }

    info!("[-] Fetching .git recursively");
    run_pool(
        vec![".git/".to_string(), ".gitignore".to_string()],
        HashSet::new(),
        jobs,
        Arc::clone(ctx),
        new_session(ctx),
        |task, ctx, client| async move { recursive::do_task(task, ctx, client).await },
    )
    .await;

    Ok(true)
}

fn remind_user_to_checkout(out_dir: &Path) {
    println!(
        "[-] Please run \"git checkout .\" in {}",
        out_dir.display()
    );
}

/// Phase 2's fixed common-files list. The source tool lists
/// `applypatch-msg.sample` three times; elided here since `seen`-based
/// dedup made the repetition inert anyway (see DESIGN.md).
fn common_files() -> Vec<String> {
    vec![
        ".gitignore",
        ".git/COMMIT_EDITMSG",
        ".git/description",
        ".git/hooks/applypatch-msg.sample",
        ".git/hooks/commit-msg.sample",
        ".git/hooks/post-commit.sample",
        ".git/hooks/post-receive.sample",
        ".git/hooks/post-update.sample",
        ".git/hooks/pre-applypatch.sample",
        ".git/hooks/pre-commit.sample",
        ".git/hooks/pre-push.sample",
        ".git/hooks/pre-rebase.sample",
        ".git/hooks/pre-receive.sample",
        ".git/hooks/prepare-commit-msg.sample",
        ".git/hooks/update.sample",
        ".git/index",
        ".git/info/exclude",
        ".git/objects/info/packs",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Phase 3's fixed ref-bearing-paths seed list.
fn refs_seed_paths() -> Vec<String> {
    vec![
        ".git/FETCH_HEAD",
        ".git/HEAD",
        ".git/ORIG_HEAD",
        ".git/config",
        ".git/info/refs",
        ".git/logs/HEAD",
        ".git/logs/refs/heads/master",
        ".git/logs/refs/remotes/origin/HEAD",
        ".git/logs/refs/remotes/origin/master",
        ".git/logs/refs/stash",
        ".git/packed-refs",
        ".git/refs/heads/master",
        ".git/refs/remotes/origin/HEAD",
        ".git/refs/remotes/origin/master",
        ".git/refs/stash",
        ".git/refs/wip/wtree/refs/heads/master",
        ".git/refs/wip/index/refs/heads/master",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

static PACK_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"pack-([a-f0-9]{40})\.pack").expect("static pack-name regex is valid")
});

static LOOSE_OID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)([a-f0-9]{40})(?:$|\s)").expect("static oid regex is valid"));

/// Phase 4: scans `.git/objects/info/packs` (if it was fetched) for
/// `pack-<hex>.pack` names and seeds both the `.idx` and `.pack` downloads.
async fn discover_pack_tasks(out_dir: &Path) -> Vec<String> {
    let info_packs_path = out_dir.join(".git/objects/info/packs");
    let Ok(content) = tokio::fs::read_to_string(&info_packs_path).await else {
        return vec![];
    };

    let mut tasks = Vec::new();
    for cap in PACK_NAME_PATTERN.captures_iter(&content) {
        let sha1 = &cap[1];
        tasks.push(format!(".git/objects/pack/pack-{sha1}.idx"));
        tasks.push(format!(".git/objects/pack/pack-{sha1}.pack"));
    }
    tasks
}

/// Phase 5, step 1 & 2: assembles the `objs` seed set and the `packed`
/// pre-done set from everything on disk so far.
async fn assemble_object_seeds(out_dir: &Path) -> Result<(HashSet<Oid>, HashSet<Oid>), CrawlError> {
    let mut objs = HashSet::new();

    let mut scan_files = vec![
        out_dir.join(".git/packed-refs"),
        out_dir.join(".git/info/refs"),
        out_dir.join(".git/FETCH_HEAD"),
        out_dir.join(".git/ORIG_HEAD"),
    ];
    scan_files.extend(walk_files(&out_dir.join(".git/refs")).await);
    scan_files.extend(walk_files(&out_dir.join(".git/logs")).await);

    for file in scan_files {
        let Ok(content) = tokio::fs::read_to_string(&file).await else {
            continue;
        };
        for cap in LOOSE_OID_PATTERN.captures_iter(&content) {
            if let Some(oid) = Oid::parse(&cap[1]) {
                objs.insert(oid);
            }
        }
    }

    let index_path = out_dir.join(".git/index");
    if index_path.exists() {
        for oid in gitfmt::iter_index_blobs(&index_path)? {
            objs.insert(oid);
        }
    }

    let mut packed = HashSet::new();
    let pack_dir = out_dir.join(".git/objects/pack");
    if pack_dir.is_dir() {
        let mut entries = tokio::fs::read_dir(&pack_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !(name.starts_with("pack-") && name.ends_with(".pack")) {
                continue;
            }
            let idx_path = path.with_extension("idx");
            if !idx_path.exists() {
                continue;
            }

            for (oid, parsed) in gitfmt::iter_pack_objects(&idx_path, &path)? {
                packed.insert(oid.clone());
                match parsed {
                    gitfmt::ParsedObject::Commit { tree, parents } => {
                        objs.insert(tree);
                        objs.extend(parents);
                    }
                    gitfmt::ParsedObject::Tree { entries } => objs.extend(entries),
                    gitfmt::ParsedObject::Blob => {}
                    gitfmt::ParsedObject::Tag { target } => {
                        objs.insert(target);
                    }
                }
            }
        }
    }

    Ok((objs, packed))
}

async fn walk_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&current).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

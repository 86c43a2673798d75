//! FindRefsWorker: fetch (or reread) a refs-bearing file and mine it for
//! `refs/...` paths.

use std::sync::Arc;

use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::fs_sink;
use crate::task::PathTask;
use crate::workers::WorkerContext;

static REF_PATTERN: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"refs(?:/[A-Za-z0-9.\-_*]+)+").expect("static refs regex is valid")
});

pub async fn do_task(
    path: PathTask,
    ctx: Arc<WorkerContext>,
    client: Client,
) -> (Vec<PathTask>, Client) {
    let abspath = fs_sink::resolve(&ctx.out_dir, &path);

    let (client, text) = if fs_sink::already_fetched(&abspath) {
        debug!("[-] File {} already fetched", ctx.url_for(&path));
        match tokio::fs::read_to_string(&abspath).await {
            Ok(text) => (client, text),
            Err(_) => return (vec![], client),
        }
    } else {
        let (client, response) = ctx.fetch(client, &path).await;
        let Some(response) = response else {
            return (vec![], client);
        };
        if response.status() != StatusCode::OK {
            return (vec![], client);
        }
        let text = match response.text().await {
            Ok(text) => text,
            Err(_) => return (vec![], client),
        };
        if let Err(err) = fs_sink::write_text(&abspath, &text).await {
            tracing::warn!("failed to write {}: {err}", abspath.display());
        }
        (client, text)
    };

    (extract_refs(&text), client)
}

/// Scans for `refs/...` occurrences, emitting both the ref file and its
/// reflog for every match that isn't a glob (`refs/heads/*`).
fn extract_refs(text: &str) -> Vec<PathTask> {
    let mut tasks = Vec::new();
    for m in REF_PATTERN.find_iter(text) {
        let ref_path = m.as_str();
        if ref_path.ends_with('*') {
            continue;
        }
        tasks.push(format!(".git/{ref_path}"));
        tasks.push(format!(".git/logs/{ref_path}"));
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_ref_and_reflog_pair() {
        let body = "0000000000000000000000000000000000000000 abc123def456abc123def456abc123def456abc1\trefs/heads/feature/x\n";
        let tasks = extract_refs(body);
        assert_eq!(
            tasks,
            vec![
                ".git/refs/heads/feature/x".to_string(),
                ".git/logs/refs/heads/feature/x".to_string(),
            ]
        );
    }

    #[test]
    fn skips_glob_refs() {
        let body = "fetch = +refs/heads/*:refs/remotes/origin/*\n";
        let tasks = extract_refs(body);
        assert!(tasks.is_empty());
    }

    #[test]
    fn empty_body_yields_no_followups() {
        assert!(extract_refs("").is_empty());
    }
}

//! RecursiveDownloadWorker: crawl a directory listing, or mirror a file,
//! depending on whether the task path ends in `/`.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::fs_sink;
use crate::html;
use crate::task::PathTask;
use crate::workers::WorkerContext;

pub async fn do_task(
    path: PathTask,
    ctx: Arc<WorkerContext>,
    client: Client,
) -> (Vec<PathTask>, Client) {
    let is_dir = path.ends_with('/');
    let abspath = fs_sink::resolve(&ctx.out_dir, &path);

    if !is_dir && fs_sink::already_fetched(&abspath) {
        debug!("[-] File {} already fetched", ctx.url_for(&path));
        return (vec![], client);
    }

    let (client, response) = ctx.fetch(client, &path).await;
    let Some(response) = response else {
        return (vec![], client);
    };

    let status = response.status();

    if status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND {
        let redirects_to_subdir = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|loc| loc.ends_with(&format!("{path}/")))
            .unwrap_or(false);
        if redirects_to_subdir {
            return (vec![format!("{path}/")], client);
        }
        return (vec![], client);
    }

    if status != StatusCode::OK {
        return (vec![], client);
    }

    if is_dir {
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                warn!("failed to read directory listing body for {path}: {err}");
                return (vec![], client);
            }
        };
        if !html::is_html(&body) {
            warn!("expected an HTML directory listing at {path}, got something else");
            return (vec![], client);
        }
        let follow_ups = html::parse_directory_listing(&body)
            .into_iter()
            .map(|child| format!("{path}{child}"))
            .collect();
        (follow_ups, client)
    } else {
        if let Err(err) = fs_sink::write_response_chunked(&abspath, response).await {
            warn!("failed to write {}: {err}", abspath.display());
        }
        (vec![], client)
    }
}

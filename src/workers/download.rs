//! DownloadWorker: fetch one file, write it verbatim, no follow-ups.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::fs_sink;
use crate::task::PathTask;
use crate::workers::WorkerContext;

pub async fn do_task(
    path: PathTask,
    ctx: Arc<WorkerContext>,
    client: Client,
) -> (Vec<PathTask>, Client) {
    let abspath = fs_sink::resolve(&ctx.out_dir, &path);

    if fs_sink::already_fetched(&abspath) {
        debug!("[-] File {} already fetched", ctx.url_for(&path));
        return (vec![], client);
    }

    let (client, response) = ctx.fetch(client, &path).await;
    let Some(response) = response else {
        return (vec![], client);
    };

    if response.status() != StatusCode::OK {
        return (vec![], client);
    }

    if let Err(err) = fs_sink::write_response_chunked(&abspath, response).await {
        tracing::warn!("failed to write {}: {err}", abspath.display());
    }

    (vec![], client)
}

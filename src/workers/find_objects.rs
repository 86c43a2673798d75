//! FindObjectsWorker: fetch a loose object by OID, decode it, and yield the
//! OIDs it references.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use tracing::{debug, error, warn};

use crate::fs_sink;
use crate::gitfmt::{self, ParsedObject};
use crate::task::Oid;
use crate::workers::WorkerContext;

pub async fn do_task(oid: Oid, ctx: Arc<WorkerContext>, client: Client) -> (Vec<Oid>, Client) {
    let rel = oid.object_path();
    let abspath = fs_sink::resolve(&ctx.out_dir, &rel);

    let client = if !fs_sink::already_fetched(&abspath) {
        let (client, response) = ctx.fetch(client, &rel).await;
        let Some(response) = response else {
            return (vec![], client);
        };
        if response.status() != StatusCode::OK {
            return (vec![], client);
        }
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("failed to read body for object {oid}: {err}");
                return (vec![], client);
            }
        };
        if let Err(err) = fs_sink::create_intermediate_dirs(&abspath).await {
            warn!(
                "failed to create parent dir for {}: {err}",
                abspath.display()
            );
            return (vec![], client);
        }
        if let Err(err) = tokio::fs::write(&abspath, &bytes).await {
            warn!("failed to write {}: {err}", abspath.display());
            return (vec![], client);
        }
        client
    } else {
        debug!("[-] File {} already fetched", ctx.url_for(&rel));
        client
    };

    match gitfmt::decode_loose_object(&abspath, &oid) {
        Ok(parsed) => (referenced_oids(parsed), client),
        Err(err) => {
            error!("fatal: could not decode object {oid}: {err}");
            std::process::exit(1);
        }
    }
}

/// The object-reference extractor: commit -> tree + parents; tree ->
/// entries; blob -> nothing; tag -> target.
fn referenced_oids(parsed: ParsedObject) -> Vec<Oid> {
    match parsed {
        ParsedObject::Commit { tree, parents } => {
            let mut out = vec![tree];
            out.extend(parents);
            out
        }
        ParsedObject::Tree { entries } => entries,
        ParsedObject::Blob => vec![],
        ParsedObject::Tag { target } => vec![target],
    }
}

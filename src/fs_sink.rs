//! Filesystem sink: directory creation, the pre-existence short-circuit,
//! and chunked writes.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::error::CrawlError;

const CHUNK_SIZE: usize = 4096;

/// Joins `out_dir` with a remote-relative task path. Rejects `..` components
/// defensively even though the server shape this tool targets never emits
/// them — the join must stay bounded under `out_dir`.
pub fn resolve(out_dir: &Path, relative: &str) -> PathBuf {
    let mut path = out_dir.to_path_buf();
    for component in relative.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            continue;
        }
        path.push(component);
    }
    path
}

/// True if `abspath` already exists — the short-circuit every worker checks
/// before issuing a request.
pub fn already_fetched(abspath: &Path) -> bool {
    abspath.exists()
}

/// Ensures `path`'s parent directory exists. Races are tolerated:
/// `create_dir_all` already treats concurrent creation as success.
pub async fn create_intermediate_dirs(path: &Path) -> Result<(), CrawlError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Streams `response` to `path` in fixed 4096-byte chunks.
pub async fn write_response_chunked(
    path: &Path,
    response: reqwest::Response,
) -> Result<(), CrawlError> {
    create_intermediate_dirs(path).await?;

    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut pending = Vec::with_capacity(CHUNK_SIZE);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(CrawlError::Http)?;
        pending.extend_from_slice(&chunk);
        while pending.len() >= CHUNK_SIZE {
            let rest = pending.split_off(CHUNK_SIZE);
            file.write_all(&pending).await?;
            pending = rest;
        }
    }
    if !pending.is_empty() {
        file.write_all(&pending).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Writes a whole text body (used for refs files, which are read back as
/// text in the next phase).
pub async fn write_text(path: &Path, text: &str) -> Result<(), CrawlError> {
    create_intermediate_dirs(path).await?;
    tokio::fs::write(path, text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_bounded() {
        let out = PathBuf::from("/tmp/out");
        assert_eq!(
            resolve(&out, ".git/../../etc/passwd"),
            PathBuf::from("/tmp/out/.git/etc/passwd")
        );
        assert_eq!(resolve(&out, ".git/config"), PathBuf::from("/tmp/out/.git/config"));
    }
}

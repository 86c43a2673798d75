use thiserror::Error;

/// Fatal errors that abort the whole crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("{0}/.git/HEAD did not return 200")]
    HeadProbeFailed(String),

    #[error("{0}/.git/HEAD is not a git HEAD file (does not start with `ref:`)")]
    NotAGitHead(String),

    #[error("unexpected object kind while extracting references: {0:?}")]
    UnknownObjectKind(String),

    #[error("invalid proxy spec: {0}")]
    InvalidProxy(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to decode object {oid}: {message}")]
    ObjectDecode { oid: String, message: String },

    #[error("failed to open pack at {path}: {message}")]
    PackOpen { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

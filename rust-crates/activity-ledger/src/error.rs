use crate::{
    decode::DecodeError,
    events::EventKind,
};
use explorer_config::ConfigError;
use reqwest::StatusCode;

/// A failed upstream log query.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("log request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("explorer responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("explorer returned status '{status}': {message}")]
    Api { status: String, message: String },
    #[error("explorer result is not a list of logs: {0}")]
    MalformedResult(String),
    #[error("gave up after {pages} pages of logs")]
    PageLimit { pages: usize },
    #[error("invalid explorer payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client for explorer: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{kind} query failed: {source}")]
    Fetch {
        kind: EventKind,
        #[source]
        source: FetchError,
    },
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

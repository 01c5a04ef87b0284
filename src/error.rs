use thiserror::Error;

/// Error taxonomy for the ingestion/alerting pipeline.
///
/// The variants map onto how callers must react: `Fetch` and `Normalize`
/// failures are per-instrument (log, optionally notify, continue with the
/// next pair), while `Store` failures always propagate — a silent partial
/// write is worse than a crashed run that the scheduler retries.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("market data fetch failed: {0}")]
    Fetch(String),

    #[error("normalization failed: {0}")]
    Normalize(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("notification send failed: {0}")]
    Notify(String),

    #[error("unknown timeframe: {0}")]
    UnknownTimeframe(String),
}

pub type Result<T> = std::result::Result<T, WatchError>;

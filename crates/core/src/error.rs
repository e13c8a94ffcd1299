use std::path::PathBuf;
use thiserror::Error;

/// Failures of the injected model capabilities (embedding provider,
/// fasttext / indicbert inference). Local to one call; batch callers
/// downgrade these to per-item outcomes.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model {model} unavailable: {details}")]
    Unavailable { model: String, details: String },

    #[error("invalid response from {model}: {details}")]
    InvalidResponse { model: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("page file {path} failed to parse: {details}")]
    PageParse { path: PathBuf, details: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("backend {backend} unavailable: {details}")]
    BackendUnavailable { backend: String, details: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;

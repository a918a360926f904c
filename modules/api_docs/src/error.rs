use modkit_openapi::DocumentError;
use thiserror::Error;

/// Failure of one document build. Other documents built alongside are unaffected.
#[derive(Debug, Error)]
pub enum ApiDocsError {
    #[error(transparent)]
    Schema(#[from] DocumentError),

    #[error("endpoint task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("unknown document '{0}'")]
    UnknownDocument(String),

    #[error("invalid api_docs configuration: {0}")]
    Config(#[source] anyhow::Error),
}

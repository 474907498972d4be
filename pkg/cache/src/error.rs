use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// An index function was handed an object of the wrong kind.
    #[error("index {index}: expected {expected} object")]
    TypeMismatch {
        index: &'static str,
        expected: &'static str,
    },

    #[error("index {0} does not exist")]
    UnknownIndex(String),

    #[error("shutdown already in progress")]
    AlreadyStopping,

    #[error("endpoint mirror already started")]
    AlreadyStarted,

    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

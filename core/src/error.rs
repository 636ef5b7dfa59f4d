use crate::DocId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors surfaced by the store, the index builder and the query executor.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid page: page={page}, page_size={page_size}")]
    InvalidPage { page: i64, page_size: i64 },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("document {0} not found")]
    NotFound(DocId),

    #[error("document {0} already exists")]
    DuplicateId(DocId),

    #[error("document {0} is already indexed")]
    AlreadyIndexed(DocId),

    /// An index invariant was violated. The offending ingestion step is not applied.
    #[error("index corruption: {0}")]
    IndexCorruption(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("query exceeded its deadline")]
    Timeout,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SearchError {
    /// Stable code used in wire-level error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::InvalidPage { .. } => "InvalidPage",
            SearchError::InvalidQuery(_) => "InvalidQuery",
            SearchError::NotFound(_) => "NotFound",
            SearchError::DuplicateId(_) => "DuplicateId",
            SearchError::AlreadyIndexed(_) => "AlreadyIndexed",
            SearchError::IndexCorruption(_) => "IndexCorruption",
            SearchError::InvalidConfig(_) => "InvalidConfig",
            SearchError::Timeout => "Timeout",
            SearchError::Io(_) | SearchError::Serialization(_) => "Internal",
        }
    }

    /// Caller mistakes, reported back and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, SearchError::InvalidPage { .. } | SearchError::InvalidQuery(_))
    }
}

impl From<bincode::Error> for SearchError {
    fn from(e: bincode::Error) -> Self {
        SearchError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::Serialization(e.to_string())
    }
}

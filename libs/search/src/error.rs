//! Error types for search indexing and querying

use thiserror::Error;

/// Errors raised by search backends and the synchronizer
#[derive(Error, Debug)]
pub enum SearchError {
    /// The backend could not be reached
    #[error("Search backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a failure status
    #[error("Search backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered with something we could not read
    #[error("Unexpected search response: {0}")]
    Decode(String),

    /// An entity could not be serialized for tracking
    #[error("Failed to serialize entity: {0}")]
    Encode(#[from] serde_json::Error),

    /// No extractor is registered for the entity type
    #[error("Entity type `{0}` is not searchable")]
    NotSearchable(String),

    /// The row store failed while hydrating or reindexing
    #[error("Row store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SearchError {
    /// Wrap a row-store failure.
    pub fn store<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SearchError::Store(Box::new(error))
    }
}

/// Type alias for Result with SearchError
pub type SearchResult<T> = Result<T, SearchError>;

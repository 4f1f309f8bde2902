//! Error types for Engram

use thiserror::Error;

/// Main error type for Engram operations
#[derive(Error, Debug)]
pub enum EngramError {
    /// Vector note storage errors (LanceDB, backend plumbing)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Graph storage errors
    #[error("Graph error: {0}")]
    Graph(String),

    /// A relationship endpoint that does not exist as a labeled entity
    #[error("Entity not found: {name}")]
    EntityNotFound { name: String },

    /// A note id unknown to the vector store
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    /// Archive ledger errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Core/working document store errors (locking, parsing)
    #[error("Document store error: {0}")]
    Document(String),

    /// Extraction output handling errors
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Engram operations
pub type Result<T> = std::result::Result<T, EngramError>;

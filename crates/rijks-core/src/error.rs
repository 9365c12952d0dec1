//! Error types for rijks-core.

use thiserror::Error;

/// Errors that can occur across the harvest/normalize pipeline.
#[derive(Error, Debug)]
pub enum CoreError {
    /// SQLite error
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// XML parse error (OAI-PMH responses)
    #[error("xml parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// JSON parse error (Linked Art responses)
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// N-Triples line failed to parse
    #[error("n-triples parse error at line {line}: {message}")]
    NTriplesParse { line: usize, message: String },

    /// OAI-PMH protocol-level error (e.g. `<error>` element in the response)
    #[error("OAI-PMH error ({code}): {message}")]
    OaiProtocol { code: String, message: String },

    /// A resource that is expected to 404 on the authoritative source did not,
    /// or an unexpected status code was returned.
    #[error("unexpected HTTP status {status} fetching {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// A record referenced a vocabulary/artwork entity that could not be resolved.
    #[error("unresolvable entity: {0}")]
    Unresolvable(String),

    /// Checkpoint file is missing or corrupt.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

/// Result type for rijks-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

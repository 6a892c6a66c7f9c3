//! Error types for the store gateway.

use thiserror::Error;

/// Store gateway errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend could not serve the request (connectivity, quorum loss).
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored cell did not have the type the caller expected.
    #[error("field {field} has unexpected type in table {table}")]
    TypeMismatch {
        table: &'static str,
        field: &'static str,
    },

    /// A row or field required by the caller was absent.
    #[error("missing field {field} in table {table}")]
    MissingField {
        table: &'static str,
        field: &'static str,
    },

    /// A stored blob failed to decode.
    #[error("failed to decode blob in field {field}: {reason}")]
    Codec { field: &'static str, reason: String },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for FHIR context

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid {resource_type} '{url}': {message}")]
    InvalidResource {
        resource_type: String,
        url: String,
        message: String,
    },

    #[error("Resource has no canonical url: {0}")]
    MissingUrl(String),

    #[error("Resource type mismatch for '{url}': expected {expected}, found {actual}")]
    ResourceTypeMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

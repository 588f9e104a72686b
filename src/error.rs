//! Error types for schema parsing, caching and fetching

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Terminal errors. Recoverable resolution problems are reported through
/// [`crate::diagnostics::Diagnostics`] instead.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Input does not look like a JSON Schema: {0}")]
    NotASchema(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

/// Failures of the key-value persistence capability
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Quota exceeded: {needed} bytes needed, {available} bytes available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the external document fetch capability
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

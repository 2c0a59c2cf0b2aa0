//! Error types for the dagflow core library.

/// Main error type for core operations.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// Input could not be turned into a key-value store.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Type alias for Result with CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

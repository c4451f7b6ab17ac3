use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors reported by a storage backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("operation canceled: deadline exceeded")]
    Canceled,
    #[error("storage backend is closed")]
    Closed,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage i/o failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

/// Errors returned by short code generators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("invalid url for generation: {0}")]
    InvalidInput(String),
    #[error("encoded hash is too short: required {required} characters, got {available}")]
    TooShort { required: usize, available: usize },
}

/// Errors surfaced by the shortening service to its callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShortenerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("request timed out")]
    Timeout,
    #[error("could not allocate a unique short code after {attempts} attempts")]
    GenerationExhausted { attempts: u32 },
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::InvalidInput(message) => Self::InvalidInput(message),
            StorageError::Canceled => Self::Timeout,
            StorageError::Unavailable(message) => Self::Unavailable(message),
            other => Self::Storage(other.to_string()),
        }
    }
}

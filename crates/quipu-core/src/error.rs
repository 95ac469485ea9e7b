use thiserror::Error;

/// Top-level error type for Quipu.
#[derive(Debug, Error)]
pub enum QuipuError {
    /// Error from the intent classifier.
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Error from a messaging channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Storage error.
    #[error("store error: {0}")]
    Store(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

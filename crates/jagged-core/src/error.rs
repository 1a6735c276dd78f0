use thiserror::Error;

/// Canonical result for core and the crates layered on it.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A tracer was asked for something only concrete data can answer.
    #[error("Untraceable operation `{operation}`: {reason}")]
    Untraceable {
        operation: &'static str,
        reason: String,
    },

    #[error("Partition alignment error: {0}")]
    PartitionAlignment(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // Sources map their I/O and decoding failures into this variant.
    #[error("Source error: {0}")]
    Source(String),

    /// Data-dependent failure that only shows up once real rows flow.
    #[error("Data error: {0}")]
    Data(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    pub fn untraceable(operation: &'static str, reason: impl Into<String>) -> Self {
        Error::Untraceable {
            operation,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

use thiserror::Error;

/// Canonical result for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Malformed or missing parameters when building or reconstructing an
    /// operator from a plan node. Reported at construction, never deferred.
    #[error("Plan construction error: {0}")]
    Plan(String),

    /// Arity/row-count/type mismatches between co-iterated inputs. These are
    /// programmer or plan errors and abort the segment's execution.
    #[error("Shape violation: {0}")]
    Shape(String),

    /// Corrupt or truncated encoded blocks, unknown encoding tags.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Plan(e.to_string())
    }
}

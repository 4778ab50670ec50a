use thiserror::Error;

/// Errors raised while decoding, transforming or encoding images.
///
/// All of these are caller mistakes or undecodable data: they fail fast and
/// are never retried.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unknown operation {0:?}")]
    UnknownOperation(String),
    #[error("Invalid arguments for {operation:?}: {reason}")]
    InvalidArguments { operation: String, reason: String },
    #[error("Encoding failed: {0}")]
    Encode(String),
}

impl ImageError {
    pub(crate) fn arguments(operation: &str, reason: impl Into<String>) -> Self {
        ImageError::InvalidArguments {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the invalid-input family
    /// (undecodable data, unknown operation, wrong arguments).
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            ImageError::InvalidInput(_)
                | ImageError::UnknownOperation(_)
                | ImageError::InvalidArguments { .. }
        )
    }
}

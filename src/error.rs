use thiserror::Error;

#[derive(Error, Debug)]
pub enum GtoError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown query type: {0}")]
    UnknownQueryType(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Computation failed: {0}")]
    ComputationFailure(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GtoError {
    /// Whether this error belongs to the caller-input category (bad shapes,
    /// unknown names) rather than a failure during computation.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            GtoError::InvalidInput(_) | GtoError::UnknownQueryType(_) | GtoError::UnknownMethod(_)
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        GtoError::InvalidInput(msg.into())
    }
}

pub type GtoResult<T> = Result<T, GtoError>;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("record source unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Transient failures that a later pass may recover from.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing null terminator")]
    Unterminated,

    #[error("empty text")]
    Empty,

    #[error("invalid UTF-8 at byte {0}")]
    InvalidUtf8(usize),

    #[error("interior null byte")]
    InteriorNul,

    #[error("text too long for a fingerprint: {0} bytes")]
    TooLong(usize),

    #[error("decoder failed: {0}")]
    Other(String),
}

use skillswap_ledger::{ParticipantId, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("participant {0} not found")]
    NotFound(ParticipantId),

    #[error("participant {0} has no record")]
    UnknownParticipant(ParticipantId),

    #[error("invalid profile: {0}")]
    Validation(String),

    #[error("local participant is not registered")]
    NotRegistered,

    #[error("local participant identity is not configured")]
    NoLocalIdentity,

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl EngineError {
    /// The ledger could not be reached; cached views are still served.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Source(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_source_is_flagged() {
        let err = EngineError::from(SourceError::Unavailable("timeout".into()));
        assert!(err.is_unavailable());
        assert_eq!(err.to_string(), "record source unavailable: timeout");
        assert!(!EngineError::NotRegistered.is_unavailable());
    }

    #[test]
    fn not_found_display() {
        let id = ParticipantId::new(3).unwrap();
        assert_eq!(EngineError::NotFound(id).to_string(), "participant 3 not found");
    }
}

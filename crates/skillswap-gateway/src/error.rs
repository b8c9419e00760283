use std::net::SocketAddr;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use skillswap_core::EngineError;
use skillswap_ledger::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, #[source] std::io::Error),
    #[error("gateway server failed: {0}")]
    Server(#[source] std::io::Error),
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

/// Request failure rendered as a JSON error response.
#[derive(Debug)]
pub(crate) enum ApiError {
    /// Path id outside the ledger's id space (ids start at 1).
    InvalidId(u64),
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let Self::Engine(e) = self else {
            return StatusCode::NOT_FOUND;
        };
        match e {
            EngineError::NotFound(_) | EngineError::UnknownParticipant(_) => StatusCode::NOT_FOUND,
            EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::NotRegistered
            | EngineError::NoLocalIdentity
            | EngineError::Source(SourceError::Rejected(_)) => StatusCode::CONFLICT,
            EngineError::Source(SourceError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::InvalidId(raw) => format!("participant {raw} not found"),
            Self::Engine(e) if e.is_unavailable() => {
                "data currently unavailable, previous view retained".to_owned()
            }
            Self::Engine(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Engine(e) = &self
            && status.is_server_error()
        {
            tracing::warn!("request failed: {e}");
        }
        let error = self.message();
        (status, Json(ErrorBody { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use skillswap_ledger::ParticipantId;

    use super::*;

    #[test]
    fn status_mapping() {
        let id = ParticipantId::new(1).unwrap();
        let status = |e: EngineError| ApiError::from(e).status();
        assert_eq!(status(EngineError::NotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(status(EngineError::UnknownParticipant(id)), StatusCode::NOT_FOUND);
        assert_eq!(
            status(EngineError::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(EngineError::Source(SourceError::Unavailable("x".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(EngineError::Source(SourceError::Rejected("dup".into()))),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::InvalidId(0).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn outage_message_hides_source_detail() {
        let err = ApiError::from(EngineError::Source(SourceError::Unavailable(
            "rpc timeout".into(),
        )));
        assert_eq!(err.message(), "data currently unavailable, previous view retained");
        assert_eq!(ApiError::InvalidId(0).message(), "participant 0 not found");
    }

    #[test]
    fn bind_error_display() {
        let err = GatewayError::Bind(
            SocketAddr::from(([127, 0, 0, 1], 1)),
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        );
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:1: in use");
    }
}

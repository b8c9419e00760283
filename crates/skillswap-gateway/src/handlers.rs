use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use skillswap_core::{MatchResult, MergedView, SyncStatus};
use skillswap_ledger::{ParticipantId, ProfileUpdate, RecordSource, RecordWriter, Registration};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(serde::Serialize)]
struct StatusResponse<'a> {
    local_identity: Option<&'a str>,
    stale: bool,
    #[serde(flatten)]
    sync: SyncStatus,
}

#[derive(serde::Serialize)]
pub(crate) struct RegisteredResponse {
    id: ParticipantId,
}

#[derive(serde::Serialize)]
pub(crate) struct AckResponse {
    status: &'static str,
}

fn participant_id(raw: u64) -> Result<ParticipantId, ApiError> {
    ParticipantId::new(raw).ok_or(ApiError::InvalidId(raw))
}

pub(crate) async fn health_handler<S: RecordSource>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub(crate) async fn status_handler<S: RecordSource>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    let sync = state.engine.status().borrow().clone();
    Json(StatusResponse {
        local_identity: state.engine.local_identity().map(|i| i.as_str()),
        stale: sync.is_stale(),
        sync,
    })
    .into_response()
}

pub(crate) async fn list_participants_handler<S: RecordSource>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    let views = state.engine.list_merged_views();
    let body: Vec<&MergedView> = views.iter().map(AsRef::as_ref).collect();
    Json(body).into_response()
}

pub(crate) async fn participant_handler<S: RecordSource>(
    State(state): State<AppState<S>>,
    Path(raw): Path<u64>,
) -> Result<Response, ApiError> {
    let view = state.engine.get_merged_view(participant_id(raw)?).await?;
    Ok(Json(view.as_ref()).into_response())
}

pub(crate) async fn matches_handler<S: RecordSource>(
    State(state): State<AppState<S>>,
    Path(raw): Path<u64>,
) -> Result<Json<Vec<MatchResult>>, ApiError> {
    let id = participant_id(raw)?;
    Ok(Json(state.engine.find_matches_for(id).await?))
}

pub(crate) async fn recorded_matches_handler<S: RecordSource>(
    State(state): State<AppState<S>>,
    Path(raw): Path<u64>,
) -> Result<Json<Vec<MatchResult>>, ApiError> {
    let id = participant_id(raw)?;
    Ok(Json(state.engine.recorded_matches_for(id).await?))
}

pub(crate) async fn register_handler<S: RecordSource + RecordWriter>(
    State(state): State<AppState<S>>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<RegisteredResponse>), ApiError> {
    let id = state.engine.register_self(registration).await?;
    Ok((StatusCode::CREATED, Json(RegisteredResponse { id })))
}

pub(crate) async fn update_handler<S: RecordSource + RecordWriter>(
    State(state): State<AppState<S>>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<AckResponse>, ApiError> {
    state.engine.update_self(update).await?;
    Ok(Json(AckResponse { status: "updated" }))
}

pub(crate) async fn compute_matches_handler<S: RecordSource + RecordWriter>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<MatchResult>>, ApiError> {
    Ok(Json(state.engine.compute_matches_self().await?))
}

/// Pair the local participant with `{id}` on the ledger.
pub(crate) async fn match_with_handler<S: RecordSource + RecordWriter>(
    State(state): State<AppState<S>>,
    Path(raw): Path<u64>,
) -> Result<Json<Vec<MatchResult>>, ApiError> {
    let other = participant_id(raw)?;
    Ok(Json(state.engine.match_with(other).await?))
}

pub(crate) async fn refresh_handler<S: RecordSource>(
    State(state): State<AppState<S>>,
) -> Result<Json<AckResponse>, ApiError> {
    state.engine.refresh().await?;
    Ok(Json(AckResponse {
        status: "refreshed",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok",
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
    }

    #[test]
    fn status_response_flattens_sync() {
        let resp = StatusResponse {
            local_identity: Some("0xabc"),
            stale: false,
            sync: SyncStatus {
                passes_completed: 3,
                ..SyncStatus::default()
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["passes_completed"], 3);
        assert_eq!(json["local_identity"], "0xabc");
    }

    #[test]
    fn zero_id_is_not_found() {
        let resp = participant_id(0).unwrap_err().into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(participant_id(5).is_ok());
    }
}

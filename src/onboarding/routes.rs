//! REST endpoints driving a user's onboarding flow.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{Error, Result, StepError};

use super::engine::StepView;
use super::manager::{DispatchOutcome, FlowAction, OnboardingManager, SyncStatus};
use super::model::Role;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub manager: Arc<OnboardingManager>,
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswersRequest {
    step_id: String,
    data: Value,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Step(StepError::UnknownSession { .. }) => StatusCode::NOT_FOUND,
            Error::Step(StepError::Unreachable { .. }) => StatusCode::CONFLICT,
            Error::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Step(StepError::Config(_)) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match self {
            Error::Step(e) => e.to_string(),
            Error::Persistence(e) => e.to_string(),
            Error::Config(e) => e.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// POST /api/onboarding/{user_id}/start
async fn start(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
    Json(body): Json<StartRequest>,
) -> Result<Json<StepView>> {
    Ok(Json(state.manager.start(&user_id, body.role).await?))
}

/// GET /api/onboarding/{user_id}
async fn get_view(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
) -> Result<Json<StepView>> {
    Ok(Json(state.manager.view(&user_id).await?))
}

/// PUT /api/onboarding/{user_id}/answers
async fn put_answers(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
    Json(body): Json<AnswersRequest>,
) -> Result<Json<DispatchOutcome>> {
    let action = FlowAction::UpdateAnswers {
        step_id: body.step_id,
        data: body.data,
    };
    Ok(Json(state.manager.dispatch(&user_id, action).await?))
}

/// POST /api/onboarding/{user_id}/actions
///
/// Refused transitions are still 200; the body says why.
async fn post_action(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
    Json(action): Json<FlowAction>,
) -> Result<Json<DispatchOutcome>> {
    Ok(Json(state.manager.dispatch(&user_id, action).await?))
}

/// POST /api/onboarding/{user_id}/save
///
/// Explicit retry after a failed sync. 503 while the store is failing.
async fn save(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
) -> Result<Response> {
    let outcome = state.manager.checkpoint(&user_id).await?;
    let status = match outcome.sync {
        SyncStatus::Failed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)).into_response())
}

/// POST /api/onboarding/{user_id}/reset
async fn reset(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    let reset = state.manager.reset(&user_id).await?;
    Ok(Json(json!({ "reset": reset })))
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/{user_id}", get(get_view))
        .route("/api/onboarding/{user_id}/start", post(start))
        .route("/api/onboarding/{user_id}/answers", put(put_answers))
        .route("/api/onboarding/{user_id}/actions", post(post_action))
        .route("/api/onboarding/{user_id}/save", post(save))
        .route("/api/onboarding/{user_id}/reset", post(reset))
        .with_state(state)
}

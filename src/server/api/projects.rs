use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::{Caller, authorize};
use crate::projects;
use crate::server::AppState;
use crate::server::dto::{AccessResponse, CreateProjectRequest, CreateProjectResponse};
use crate::server::response::{ApiError, ApiResponse};

pub async fn create_project(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    let identity = caller
        .identity
        .ok_or_else(|| ApiError::unauthorized("An authenticated identity is required"))?;

    let created = projects::create_project(
        state.store.as_ref(),
        &state.tokens,
        &identity,
        &req.name,
        state.config.default_token_role,
    )?;

    let response = CreateProjectResponse {
        project: created.project,
        token: created.default_token.raw,
        token_metadata: created.default_token.token,
    };

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn get_project(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let project = projects::get_project(state.store.as_ref(), &caller.context(&project_id))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(project)))
}

pub async fn delete_project(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    projects::delete_project(state.store.as_ref(), &caller.context(&project_id))?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn get_access(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let grant = authorize(state.store.as_ref(), &caller.context(&project_id))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(AccessResponse::from(grant))))
}

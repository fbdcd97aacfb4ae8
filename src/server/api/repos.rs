use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::Caller;
use crate::projects;
use crate::server::AppState;
use crate::server::dto::CreateRepoRequest;
use crate::server::response::{ApiError, ApiResponse};

pub async fn list_repos(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let repos = projects::list_repositories(state.store.as_ref(), &caller.context(&project_id))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(repos)))
}

pub async fn create_repo(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<CreateRepoRequest>,
) -> impl IntoResponse {
    let repo = projects::create_repository(
        state.store.as_ref(),
        &caller.context(&project_id),
        &req.name,
        req.description,
    )?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(repo))))
}

pub async fn get_repo(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let repo = projects::get_repository(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(repo)))
}

pub async fn delete_repo(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id)): Path<(String, String)>,
) -> impl IntoResponse {
    projects::delete_repository(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
    )?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

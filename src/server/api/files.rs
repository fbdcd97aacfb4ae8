use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::Caller;
use crate::server::AppState;
use crate::server::dto::{
    CreateFileRequest, FileContent, FileResponse, RenameFileRequest, RenameFolderRequest,
    RenameFolderResponse, StageOutcomeResponse, StagedChangeResponse, TreeQuery,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::staging;

pub async fn list_tree(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id)): Path<(String, String)>,
    Query(query): Query<TreeQuery>,
) -> impl IntoResponse {
    let entries = staging::list_effective_tree(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
        query.prefix.as_deref(),
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(entries)))
}

pub async fn get_file(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id, file_id)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let file = staging::get_effective_file(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
        &file_id,
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(FileResponse::from(file))))
}

pub async fn create_file(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id)): Path<(String, String)>,
    Json(req): Json<CreateFileRequest>,
) -> impl IntoResponse {
    let content = req.body.decode()?;
    let outcome = staging::create_file(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
        &req.path,
        &content,
        req.body.is_binary,
    )?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(StageOutcomeResponse::from(outcome))),
    ))
}

pub async fn edit_file(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id, file_id)): Path<(String, String, String)>,
    Json(req): Json<FileContent>,
) -> impl IntoResponse {
    let content = req.decode()?;
    let outcome = staging::edit_file(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
        &file_id,
        &content,
        req.is_binary,
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StageOutcomeResponse::from(outcome))))
}

pub async fn delete_file(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id, file_id)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let outcome = staging::delete_file(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
        &file_id,
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StageOutcomeResponse::from(outcome))))
}

pub async fn rename_file(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id, file_id)): Path<(String, String, String)>,
    Json(req): Json<RenameFileRequest>,
) -> impl IntoResponse {
    let outcome = staging::rename_file(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
        &file_id,
        &req.new_path,
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StageOutcomeResponse::from(outcome))))
}

pub async fn rename_folder(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id)): Path<(String, String)>,
    Json(req): Json<RenameFolderRequest>,
) -> impl IntoResponse {
    let moved = staging::rename_folder(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
        &req.old_prefix,
        &req.new_prefix,
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(RenameFolderResponse { moved })))
}

pub async fn list_staged(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let changes: Vec<StagedChangeResponse> = staging::list_staged_changes(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
    )?
    .into_iter()
    .map(StagedChangeResponse::from)
    .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(changes)))
}

pub async fn discard_staged(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, repo_id, change_id)): Path<(String, String, String)>,
) -> impl IntoResponse {
    staging::discard_staged_change(
        state.store.as_ref(),
        &caller.context(&project_id),
        &repo_id,
        &change_id,
    )?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

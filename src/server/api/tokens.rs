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
use crate::server::dto::{CreateTokenRequest, CreateTokenResponse};
use crate::server::response::{ApiError, ApiResponse};

pub async fn list_tokens(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let tokens = projects::list_tokens(state.store.as_ref(), &caller.context(&project_id))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(tokens)))
}

pub async fn create_token(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<CreateTokenRequest>,
) -> impl IntoResponse {
    let issued = projects::create_token(
        state.store.as_ref(),
        &state.tokens,
        &caller.context(&project_id),
        req.role,
        req.label,
        req.expires_in_seconds,
    )?;

    let response = CreateTokenResponse {
        token: issued.raw,
        metadata: issued.token,
    };

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn revoke_token(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((project_id, token_id)): Path<(String, String)>,
) -> impl IntoResponse {
    projects::revoke_token(
        state.store.as_ref(),
        &caller.context(&project_id),
        &token_id,
    )?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

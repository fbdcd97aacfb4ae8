mod files;
mod projects;
mod repos;
mod tokens;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::server::AppState;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Project routes
        .route("/projects", post(projects::create_project))
        .route(
            "/projects/{project_id}",
            get(projects::get_project).delete(projects::delete_project),
        )
        .route("/projects/{project_id}/access", get(projects::get_access))
        // Token routes
        .route(
            "/projects/{project_id}/tokens",
            get(tokens::list_tokens).post(tokens::create_token),
        )
        .route(
            "/projects/{project_id}/tokens/{token_id}",
            delete(tokens::revoke_token),
        )
        // Repository routes
        .route(
            "/projects/{project_id}/repos",
            get(repos::list_repos).post(repos::create_repo),
        )
        .route(
            "/projects/{project_id}/repos/{repo_id}",
            get(repos::get_repo).delete(repos::delete_repo),
        )
        // File routes
        .route(
            "/projects/{project_id}/repos/{repo_id}/tree",
            get(files::list_tree),
        )
        .route(
            "/projects/{project_id}/repos/{repo_id}/files",
            post(files::create_file),
        )
        .route(
            "/projects/{project_id}/repos/{repo_id}/files/{file_id}",
            get(files::get_file)
                .put(files::edit_file)
                .delete(files::delete_file),
        )
        .route(
            "/projects/{project_id}/repos/{repo_id}/files/{file_id}/rename",
            post(files::rename_file),
        )
        .route(
            "/projects/{project_id}/repos/{repo_id}/folders/rename",
            post(files::rename_folder),
        )
        // Staging routes
        .route(
            "/projects/{project_id}/repos/{repo_id}/staged",
            get(files::list_staged),
        )
        .route(
            "/projects/{project_id}/repos/{repo_id}/staged/{change_id}",
            delete(files::discard_staged),
        )
}

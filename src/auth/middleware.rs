use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};

use super::AccessContext;
use crate::server::AppState;
use crate::server::response::ApiError;

/// Credentials carried by one request.
///
/// Extraction never consults the store; the project-scoped decision happens
/// when a handler turns this into an [`AccessContext`] and calls the gate.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub identity: Option<String>,
    pub token: Option<String>,
}

impl Caller {
    #[must_use]
    pub fn context(&self, project_id: &str) -> AccessContext {
        AccessContext {
            project_id: project_id.to_string(),
            identity: self.identity.clone(),
            token: self.token.clone(),
        }
    }
}

/// Extracts a token string from a Basic auth header.
/// Expects format: Basic base64(x-token:actual_token)
fn extract_basic_auth_token(header: &str) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;

    if username != "x-token" {
        return None;
    }

    Some(password.to_string())
}

/// Extracts token from Authorization header (Bearer or Basic).
fn extract_token(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let header = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid authorization header"))?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        return Ok(Some(token.trim().to_string()));
    }
    if header.starts_with("Basic ") {
        return extract_basic_auth_token(header)
            .map(Some)
            .ok_or_else(|| ApiError::unauthorized("Invalid basic credentials"));
    }

    Err(ApiError::unauthorized("Invalid authorization scheme"))
}

/// Reads the identity claim, but only from the header the deployment trusts.
fn extract_identity(headers: &HeaderMap, trusted_header: Option<&str>) -> Option<String> {
    let name = trusted_header?;
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)?;
        let identity = extract_identity(&parts.headers, state.config.identity_header.as_deref());

        Ok(Caller { identity, token })
    }
}

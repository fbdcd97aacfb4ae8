use std::fmt;

use chrono::Utc;

use super::{TokenGenerator, parse_token};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::Role;

/// Credentials presented for one call against one project.
/// Built per request and passed explicitly; never stored beyond the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    pub project_id: String,
    /// Identity asserted by the external identity provider.
    pub identity: Option<String>,
    /// Raw project token, as presented.
    pub token: Option<String>,
}

impl AccessContext {
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            identity: None,
            token: None,
        }
    }

    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Who a mutation is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    User(String),
    Token(String),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{id}"),
            Actor::Token(id) => write!(f, "token:{id}"),
        }
    }
}

/// The outcome of resolving an access context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub project_id: String,
    pub role: Role,
    pub actor: Actor,
}

/// Determines the caller's effective role for the context's project.
///
/// The project creator is always owner. Otherwise a token must be presented,
/// belong to the project and be unexpired. Every other case is denied; there
/// is no anonymous role.
pub fn resolve_role(store: &dyn Store, ctx: &AccessContext) -> Result<Grant> {
    let project = store
        .get_project(&ctx.project_id)?
        .ok_or(Error::AccessDenied)?;

    if let Some(identity) = &ctx.identity {
        if *identity == project.created_by {
            return Ok(Grant {
                project_id: project.id,
                role: Role::Owner,
                actor: Actor::User(identity.clone()),
            });
        }
    }

    let raw_token = ctx.token.as_deref().ok_or(Error::AccessDenied)?;
    let (lookup, _secret) = parse_token(raw_token).map_err(|_| Error::AccessDenied)?;

    let token = store
        .get_token_by_lookup(&lookup)?
        .ok_or(Error::AccessDenied)?;

    if token.project_id != project.id {
        return Err(Error::AccessDenied);
    }

    if !TokenGenerator::new().verify(raw_token, &token.token_hash)? {
        return Err(Error::AccessDenied);
    }

    if token.is_expired_at(Utc::now()) {
        return Err(Error::AccessDenied);
    }

    match store.touch_token(&token.id) {
        Ok(true) => {}
        Ok(false) => tracing::debug!("Skipped last_used_at update for token {}", token.id),
        Err(e) => tracing::warn!("Failed to update token last_used_at: {e}"),
    }

    let actor = match &ctx.identity {
        Some(identity) => Actor::User(identity.clone()),
        None => Actor::Token(token.id),
    };

    Ok(Grant {
        project_id: project.id,
        role: token.role,
        actor,
    })
}

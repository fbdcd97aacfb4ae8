//! Project, repository and token management.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{AccessContext, Grant, TokenGenerator, require};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::*;

/// A token record together with its raw credential, which is only available at creation.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: ProjectToken,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct CreatedProject {
    pub project: Project,
    pub default_token: IssuedToken,
}

/// Creates a project owned by `identity`, along with its default token.
pub fn create_project(
    store: &dyn Store,
    generator: &TokenGenerator,
    identity: &str,
    name: &str,
    default_token_role: Role,
) -> Result<CreatedProject> {
    let identity = identity.trim();
    if identity.is_empty() {
        return Err(Error::AccessDenied);
    }
    validate_project_name(name)?;

    let project = Project {
        id: Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        created_by: identity.to_string(),
        created_at: Utc::now(),
    };

    let (mut token, raw) = generator.issue(
        &project.id,
        default_token_role,
        Some("default".to_string()),
        None,
    )?;
    token.is_default = true;

    store.create_project(&project, &token)?;
    tracing::info!("Created project {} for {}", project.id, identity);

    Ok(CreatedProject {
        project,
        default_token: IssuedToken { token, raw },
    })
}

pub fn get_project(store: &dyn Store, ctx: &AccessContext) -> Result<Project> {
    require(store, ctx, Role::Viewer)?;
    store.get_project(&ctx.project_id)?.ok_or(Error::NotFound)
}

/// Deletes the project and everything it owns.
pub fn delete_project(store: &dyn Store, ctx: &AccessContext) -> Result<()> {
    let grant = require(store, ctx, Role::Owner)?;

    if !store.delete_project(&ctx.project_id)? {
        return Err(Error::NotFound);
    }
    tracing::info!("Deleted project {} ({})", ctx.project_id, grant.actor);
    Ok(())
}

/// Loads a repository, hiding repositories of other projects.
pub fn scoped_repository(store: &dyn Store, grant: &Grant, repository_id: &str) -> Result<Repository> {
    store
        .get_repository(repository_id)?
        .filter(|repo| repo.project_id == grant.project_id)
        .ok_or(Error::NotFound)
}

pub fn create_repository(
    store: &dyn Store,
    ctx: &AccessContext,
    name: &str,
    description: Option<String>,
) -> Result<Repository> {
    let grant = require(store, ctx, Role::Editor)?;
    validate_repo_name(name)?;

    let now = Utc::now();
    let repo = Repository {
        id: Uuid::new_v4().to_string(),
        project_id: grant.project_id.clone(),
        name: name.to_string(),
        description,
        created_at: now,
        updated_at: now,
    };
    store.create_repository(&repo)?;

    tracing::info!(
        "Created repository {} in project {} ({})",
        repo.name,
        repo.project_id,
        grant.actor
    );
    Ok(repo)
}

pub fn list_repositories(store: &dyn Store, ctx: &AccessContext) -> Result<Vec<Repository>> {
    let grant = require(store, ctx, Role::Viewer)?;
    store.list_repositories(&grant.project_id)
}

pub fn get_repository(store: &dyn Store, ctx: &AccessContext, repository_id: &str) -> Result<Repository> {
    let grant = require(store, ctx, Role::Viewer)?;
    scoped_repository(store, &grant, repository_id)
}

pub fn delete_repository(store: &dyn Store, ctx: &AccessContext, repository_id: &str) -> Result<()> {
    let grant = require(store, ctx, Role::Owner)?;
    let repo = scoped_repository(store, &grant, repository_id)?;

    if !store.delete_repository(&repo.id)? {
        return Err(Error::NotFound);
    }
    tracing::info!("Deleted repository {} ({})", repo.name, grant.actor);
    Ok(())
}

/// Mints an additional project token. `expires_in` is in seconds.
pub fn create_token(
    store: &dyn Store,
    generator: &TokenGenerator,
    ctx: &AccessContext,
    role: Role,
    label: Option<String>,
    expires_in: Option<i64>,
) -> Result<IssuedToken> {
    let grant = require(store, ctx, Role::Owner)?;

    if let Some(label) = &label {
        validate_token_label(label)?;
    }
    let expires_at = match expires_in {
        Some(secs) if secs <= 0 => {
            return Err(Error::InvalidArgument(
                "expires_in must be positive".to_string(),
            ));
        }
        Some(secs) => {
            let lifetime = Duration::try_seconds(secs)
                .ok_or_else(|| Error::InvalidArgument("expires_in is too large".to_string()))?;
            Some(
                Utc::now()
                    .checked_add_signed(lifetime)
                    .ok_or_else(|| Error::InvalidArgument("expires_in is too large".to_string()))?,
            )
        }
        None => None,
    };

    let (token, raw) = generator.issue(&grant.project_id, role, label, expires_at)?;
    store.create_token(&token)?;

    tracing::info!(
        "Issued {} token {} for project {} ({})",
        token.role,
        token.id,
        token.project_id,
        grant.actor
    );
    Ok(IssuedToken { token, raw })
}

pub fn list_tokens(store: &dyn Store, ctx: &AccessContext) -> Result<Vec<ProjectToken>> {
    let grant = require(store, ctx, Role::Owner)?;
    store.list_project_tokens(&grant.project_id)
}

pub fn revoke_token(store: &dyn Store, ctx: &AccessContext, token_id: &str) -> Result<()> {
    let grant = require(store, ctx, Role::Owner)?;

    let token = store
        .get_token_by_id(token_id)?
        .filter(|t| t.project_id == grant.project_id)
        .ok_or(Error::NotFound)?;
    store.delete_token(&token.id)?;

    tracing::info!("Revoked token {} ({})", token.id, grant.actor);
    Ok(())
}

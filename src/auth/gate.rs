use super::context::{AccessContext, Grant, resolve_role};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::Role;

/// Resolves the caller's role for the project without imposing a minimum.
pub fn authorize(store: &dyn Store, ctx: &AccessContext) -> Result<Grant> {
    resolve_role(store, ctx)
}

/// Resolves the caller's role and rejects it if it is below `minimum`.
/// Every operation calls this once, before reading or writing project data.
pub fn require(store: &dyn Store, ctx: &AccessContext, minimum: Role) -> Result<Grant> {
    let grant = resolve_role(store, ctx)?;

    if !grant.role.meets(minimum) {
        tracing::debug!(
            "Denied {} on project {}: role {} below {}",
            grant.actor,
            ctx.project_id,
            grant.role,
            minimum
        );
        return Err(Error::AccessDenied);
    }

    Ok(grant)
}

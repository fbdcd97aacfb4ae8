//! Staging mutations: create, edit, delete and rename files without committing them.
//!
//! Each operation passes the gate, validates its input, then hands a pure plan to
//! [`Store::stage`], which reads the file's snapshot and applies the planned write in
//! one transaction.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{AccessContext, require};
use crate::error::{Error, Result};
use crate::projects::scoped_repository;
use crate::store::path::{is_within, normalize_path};
use crate::store::{FileRef, StageRequest, StagingAction, StagingSnapshot, Store};
use crate::types::*;

/// What a staging mutation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The change was recorded and is now pending.
    Staged(StagedChange),
    /// The pending row was removed; the file has no staged state left.
    Discarded(StagedChange),
}

impl StageOutcome {
    #[must_use]
    pub fn change(&self) -> &StagedChange {
        match self {
            StageOutcome::Staged(change) | StageOutcome::Discarded(change) => change,
        }
    }
}

impl From<StagingAction> for StageOutcome {
    fn from(action: StagingAction) -> Self {
        match action {
            StagingAction::Insert(change) | StagingAction::Update(change) => {
                StageOutcome::Staged(change)
            }
            StagingAction::Remove(change) => StageOutcome::Discarded(change),
        }
    }
}

/// Attribution and time shared by every write of one mutation.
#[derive(Debug, Clone, Copy)]
pub struct Stamp<'a> {
    pub actor: &'a str,
    pub at: DateTime<Utc>,
}

fn new_change(
    repository_id: &str,
    file_path: &str,
    operation: StagedOperation,
    stamp: Stamp<'_>,
) -> StagedChange {
    StagedChange {
        id: Uuid::new_v4().to_string(),
        repository_id: repository_id.to_string(),
        file_path: file_path.to_string(),
        old_path: None,
        operation,
        old_content: None,
        new_content: None,
        is_binary: false,
        created_by: stamp.actor.to_string(),
        created_at: stamp.at,
        updated_by: stamp.actor.to_string(),
        updated_at: stamp.at,
        sequence: 0,
    }
}

fn touched(mut change: StagedChange, stamp: Stamp<'_>) -> StagedChange {
    change.updated_by = stamp.actor.to_string();
    change.updated_at = stamp.at;
    change
}

/// The live state of a file, or NotFound if it is absent or masked by a delete.
fn live(snapshot: &StagingSnapshot) -> Result<(Option<&CommittedFile>, Option<&StagedChange>)> {
    match (&snapshot.committed, &snapshot.staged) {
        (_, Some(staged)) if staged.operation == StagedOperation::Delete => Err(Error::NotFound),
        (None, None) => Err(Error::NotFound),
        (committed, staged) => Ok((committed.as_ref(), staged.as_ref())),
    }
}

/// Plans a new file at `path`. The snapshot must have been loaded by that path.
pub fn plan_create(
    snapshot: &StagingSnapshot,
    repository_id: &str,
    path: &str,
    content: &[u8],
    is_binary: bool,
    stamp: Stamp<'_>,
) -> Result<StagingAction> {
    if snapshot.committed.is_some() || snapshot.staged.is_some() {
        return Err(Error::Conflict(format!("a file already exists at '{path}'")));
    }

    let mut change = new_change(repository_id, path, StagedOperation::Add, stamp);
    change.new_content = Some(content.to_vec());
    change.is_binary = is_binary;
    Ok(StagingAction::Insert(change))
}

/// Plans new content for an existing file.
pub fn plan_edit(
    snapshot: &StagingSnapshot,
    content: &[u8],
    is_binary: bool,
    stamp: Stamp<'_>,
) -> Result<StagingAction> {
    match live(snapshot)? {
        (_, Some(staged)) => {
            let mut change = staged.clone();
            change.new_content = Some(content.to_vec());
            change.is_binary = is_binary;
            Ok(StagingAction::Update(touched(change, stamp)))
        }
        (Some(committed), None) => {
            let mut change = new_change(
                &committed.repository_id,
                &committed.path,
                StagedOperation::Edit,
                stamp,
            );
            change.old_content = Some(committed.content.clone());
            change.new_content = Some(content.to_vec());
            change.is_binary = is_binary;
            Ok(StagingAction::Insert(change))
        }
        (None, None) => Err(Error::NotFound),
    }
}

/// Plans removal of a file. A file that only exists as a staged add is discarded outright.
pub fn plan_delete(snapshot: &StagingSnapshot, stamp: Stamp<'_>) -> Result<StagingAction> {
    match live(snapshot)? {
        (None, Some(staged)) if staged.operation == StagedOperation::Add => {
            Ok(StagingAction::Remove(staged.clone()))
        }
        (committed, Some(staged)) => {
            let mut change = staged.clone();
            change.operation = StagedOperation::Delete;
            if change.old_content.is_none() {
                change.old_content = committed.map(|c| c.content.clone());
            }
            Ok(StagingAction::Update(touched(change, stamp)))
        }
        (Some(committed), None) => {
            let mut change = new_change(
                &committed.repository_id,
                &committed.path,
                StagedOperation::Delete,
                stamp,
            );
            change.old_content = Some(committed.content.clone());
            change.is_binary = committed.is_binary;
            Ok(StagingAction::Insert(change))
        }
        (None, None) => Err(Error::NotFound),
    }
}

/// Plans a move of a file to `new_path`. The snapshot must have been loaded with
/// `new_path` as its destination.
pub fn plan_rename(
    snapshot: &StagingSnapshot,
    new_path: &str,
    stamp: Stamp<'_>,
) -> Result<StagingAction> {
    let (committed, staged) = live(snapshot)?;

    let current = staged
        .map(|s| s.file_path.as_str())
        .or_else(|| committed.map(|c| c.path.as_str()))
        .ok_or(Error::NotFound)?;
    if current == new_path {
        return Err(Error::InvalidArgument(format!(
            "file is already at '{new_path}'"
        )));
    }
    if snapshot.destination_taken {
        return Err(Error::Conflict(format!(
            "a file already exists at '{new_path}'"
        )));
    }

    match (committed, staged) {
        (_, Some(staged)) if staged.operation == StagedOperation::Add => {
            let mut change = staged.clone();
            change.file_path = new_path.to_string();
            Ok(StagingAction::Update(touched(change, stamp)))
        }
        (committed, Some(staged)) => {
            let mut change = staged.clone();
            if change.old_path.is_none() {
                change.old_path = Some(change.file_path.clone());
            }
            if change.old_content.is_none() {
                change.old_content = committed.map(|c| c.content.clone());
            }
            change.file_path = new_path.to_string();
            change.operation = StagedOperation::Rename;
            Ok(StagingAction::Update(touched(change, stamp)))
        }
        (Some(committed), None) => {
            let mut change = new_change(
                &committed.repository_id,
                new_path,
                StagedOperation::Rename,
                stamp,
            );
            change.old_path = Some(committed.path.clone());
            change.old_content = Some(committed.content.clone());
            change.new_content = Some(committed.content.clone());
            change.is_binary = committed.is_binary;
            Ok(StagingAction::Insert(change))
        }
        (None, None) => Err(Error::NotFound),
    }
}

/// Stages a new file. Requires editor.
pub fn create_file(
    store: &dyn Store,
    ctx: &AccessContext,
    repository_id: &str,
    path: &str,
    content: &[u8],
    is_binary: bool,
) -> Result<StageOutcome> {
    let grant = require(store, ctx, Role::Editor)?;
    let path = normalize_path(path)?;
    let repo = scoped_repository(store, &grant, repository_id)?;

    let actor = grant.actor.to_string();
    let stamp = Stamp {
        actor: &actor,
        at: Utc::now(),
    };
    let request = StageRequest {
        repository_id: &repo.id,
        target: FileRef::Path(&path),
        destination: None,
    };

    let action = store.stage(&request, &|snapshot| {
        plan_create(snapshot, &repo.id, &path, content, is_binary, stamp)
    })?;

    tracing::info!("Staged add of {} in {} ({})", path, repo.id, actor);
    Ok(action.into())
}

/// Stages new content for a file. Requires editor.
pub fn edit_file(
    store: &dyn Store,
    ctx: &AccessContext,
    repository_id: &str,
    file_id: &str,
    content: &[u8],
    is_binary: bool,
) -> Result<StageOutcome> {
    let grant = require(store, ctx, Role::Editor)?;
    let repo = scoped_repository(store, &grant, repository_id)?;

    let actor = grant.actor.to_string();
    let stamp = Stamp {
        actor: &actor,
        at: Utc::now(),
    };
    let request = StageRequest {
        repository_id: &repo.id,
        target: FileRef::Id(file_id),
        destination: None,
    };

    let action = store.stage(&request, &|snapshot| {
        plan_edit(snapshot, content, is_binary, stamp)
    })?;

    let outcome = StageOutcome::from(action);
    tracing::info!(
        "Staged edit of {} in {} ({})",
        outcome.change().file_path,
        repo.id,
        actor
    );
    Ok(outcome)
}

/// Stages removal of a file. Requires editor.
pub fn delete_file(
    store: &dyn Store,
    ctx: &AccessContext,
    repository_id: &str,
    file_id: &str,
) -> Result<StageOutcome> {
    let grant = require(store, ctx, Role::Editor)?;
    let repo = scoped_repository(store, &grant, repository_id)?;

    let actor = grant.actor.to_string();
    let stamp = Stamp {
        actor: &actor,
        at: Utc::now(),
    };
    let request = StageRequest {
        repository_id: &repo.id,
        target: FileRef::Id(file_id),
        destination: None,
    };

    let action = store.stage(&request, &|snapshot| plan_delete(snapshot, stamp))?;

    let outcome = StageOutcome::from(action);
    match &outcome {
        StageOutcome::Staged(change) => {
            tracing::info!("Staged delete of {} in {} ({})", change.file_path, repo.id, actor);
        }
        StageOutcome::Discarded(change) => {
            tracing::info!("Discarded staged add of {} in {} ({})", change.file_path, repo.id, actor);
        }
    }
    Ok(outcome)
}

/// Stages a move of one file. Requires editor.
pub fn rename_file(
    store: &dyn Store,
    ctx: &AccessContext,
    repository_id: &str,
    file_id: &str,
    new_path: &str,
) -> Result<StageOutcome> {
    let grant = require(store, ctx, Role::Editor)?;
    let new_path = normalize_path(new_path)?;
    let repo = scoped_repository(store, &grant, repository_id)?;

    let actor = grant.actor.to_string();
    let stamp = Stamp {
        actor: &actor,
        at: Utc::now(),
    };
    let request = StageRequest {
        repository_id: &repo.id,
        target: FileRef::Id(file_id),
        destination: Some(&new_path),
    };

    let action = store.stage(&request, &|snapshot| {
        plan_rename(snapshot, &new_path, stamp)
    })?;

    tracing::info!("Staged rename to {} in {} ({})", new_path, repo.id, actor);
    Ok(action.into())
}

/// Moves every committed file under `old_prefix` to `new_prefix`. Requires owner.
/// Returns the number of files moved.
pub fn rename_folder(
    store: &dyn Store,
    ctx: &AccessContext,
    repository_id: &str,
    old_prefix: &str,
    new_prefix: &str,
) -> Result<usize> {
    let grant = require(store, ctx, Role::Owner)?;
    let old_prefix = normalize_path(old_prefix)?;
    let new_prefix = normalize_path(new_prefix)?;
    let repo = scoped_repository(store, &grant, repository_id)?;

    if is_within(&new_prefix, &old_prefix) {
        return Err(Error::InvalidArgument(format!(
            "cannot move '{old_prefix}' into itself"
        )));
    }

    let moved = store.rename_committed_folder(&repo.id, &old_prefix, &new_prefix)?;
    tracing::info!(
        "Moved {} file(s) from {} to {} in {} ({})",
        moved,
        old_prefix,
        new_prefix,
        repo.id,
        grant.actor
    );
    Ok(moved)
}

/// Pending changes of a repository, oldest first. Requires viewer.
pub fn list_staged_changes(
    store: &dyn Store,
    ctx: &AccessContext,
    repository_id: &str,
) -> Result<Vec<StagedChange>> {
    let grant = require(store, ctx, Role::Viewer)?;
    let repo = scoped_repository(store, &grant, repository_id)?;

    let mut changes = store.list_staged_changes(&repo.id)?;
    changes.sort_by_key(StagedChange::recency);
    Ok(changes)
}

/// Drops one pending change, restoring the committed view of its file. Requires editor.
pub fn discard_staged_change(
    store: &dyn Store,
    ctx: &AccessContext,
    repository_id: &str,
    change_id: &str,
) -> Result<StagedChange> {
    let grant = require(store, ctx, Role::Editor)?;
    let repo = scoped_repository(store, &grant, repository_id)?;

    let change = store
        .get_staged_change(change_id)?
        .filter(|c| c.repository_id == repo.id)
        .ok_or(Error::NotFound)?;
    if !store.delete_staged_change(&change.id)? {
        return Err(Error::NotFound);
    }

    tracing::info!(
        "Discarded staged {} of {} in {} ({})",
        change.operation,
        change.file_path,
        repo.id,
        grant.actor
    );
    Ok(change)
}

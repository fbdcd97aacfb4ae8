//! Effective view of a repository: committed files with staged changes applied.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::auth::{AccessContext, require};
use crate::error::{Error, Result};
use crate::projects::scoped_repository;
use crate::store::path::{is_within, normalize_path};
use crate::store::{CommittedEntry, FileRef, RepositorySnapshot, StagingSnapshot, Store};
use crate::types::*;

/// Picks the staged change that wins among rows referring to the same file:
/// the most recently created one.
pub fn authoritative<'a, I>(candidates: I) -> Option<&'a StagedChange>
where
    I: IntoIterator<Item = &'a StagedChange>,
{
    candidates.into_iter().max_by_key(|c| c.recency())
}

/// Applies `staged` to a committed file. Returns None if the file is masked by a delete.
#[must_use]
pub fn overlay_committed(
    committed: &CommittedFile,
    staged: Option<&StagedChange>,
) -> Option<EffectiveFile> {
    match staged {
        None => Some(EffectiveFile {
            id: committed.id.clone(),
            repository_id: committed.repository_id.clone(),
            path: committed.path.clone(),
            content: committed.content.clone(),
            is_binary: committed.is_binary,
            state: FileState::Committed,
        }),
        Some(change) if change.operation == StagedOperation::Delete => None,
        Some(change) => Some(EffectiveFile {
            id: committed.id.clone(),
            repository_id: committed.repository_id.clone(),
            path: change.file_path.clone(),
            content: change.new_content.clone().unwrap_or_default(),
            is_binary: change.is_binary,
            state: FileState::from(change.operation),
        }),
    }
}

/// Effective file for a staged row looked up by its own id.
#[must_use]
pub fn overlay_staged(change: &StagedChange) -> Option<EffectiveFile> {
    if change.operation == StagedOperation::Delete {
        return None;
    }

    Some(EffectiveFile {
        id: change.id.clone(),
        repository_id: change.repository_id.clone(),
        path: change.file_path.clone(),
        content: change.new_content.clone().unwrap_or_default(),
        is_binary: change.is_binary,
        state: FileState::from(change.operation),
    })
}

/// Resolves `file_id` against a snapshot loaded for that id.
/// Committed ids take precedence over staged ids.
#[must_use]
pub fn effective_file(snapshot: &StagingSnapshot, file_id: &str) -> Option<EffectiveFile> {
    if let Some(committed) = snapshot.committed.as_ref().filter(|c| c.id == file_id) {
        return overlay_committed(committed, snapshot.staged.as_ref());
    }

    snapshot
        .staged
        .as_ref()
        .filter(|s| s.id == file_id)
        .and_then(overlay_staged)
}

#[must_use]
pub fn content_ref(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

type Rank = Option<(DateTime<Utc>, i64)>;

/// Tree entry for `change` applied to the file `file_id`. None for a delete.
fn staged_entry(file_id: &str, change: &StagedChange) -> Option<TreeEntry> {
    if change.operation == StagedOperation::Delete {
        return None;
    }

    let content = change.new_content.as_deref().unwrap_or_default();
    Some(TreeEntry {
        file_id: file_id.to_string(),
        path: change.file_path.clone(),
        content_ref: content_ref(content),
        size: content.len(),
        is_binary: change.is_binary,
        state: FileState::from(change.operation),
    })
}

fn committed_entry(committed: &CommittedEntry) -> TreeEntry {
    TreeEntry {
        file_id: committed.id.clone(),
        path: committed.path.clone(),
        content_ref: committed.content_ref.clone(),
        size: committed.size,
        is_binary: committed.is_binary,
        state: FileState::Committed,
    }
}

/// Builds the effective tree, sorted by path.
///
/// Committed files appear with their staged substitution applied unless masked by a
/// delete; staged adds appear when nothing is committed at their path. When two
/// entries land on the same path the one backed by the newest staged change wins.
#[must_use]
pub fn effective_tree(snapshot: &RepositorySnapshot, prefix: Option<&str>) -> Vec<TreeEntry> {
    let mut by_origin: HashMap<&str, Vec<&StagedChange>> = HashMap::new();
    for change in &snapshot.staged {
        let key = change.origin().unwrap_or(&change.file_path);
        by_origin.entry(key).or_default().push(change);
    }

    let committed_paths: HashSet<&str> = snapshot.committed.iter().map(|c| c.path.as_str()).collect();
    let mut entries: BTreeMap<String, (Rank, TreeEntry)> = BTreeMap::new();

    let mut insert = |entry: TreeEntry, rank: Rank| {
        if prefix.is_some_and(|p| !is_within(&entry.path, p)) {
            return;
        }
        if let Some((existing, _)) = entries.get(&entry.path) {
            if *existing >= rank {
                return;
            }
        }
        entries.insert(entry.path.clone(), (rank, entry));
    };

    for committed in &snapshot.committed {
        let staged = by_origin
            .get(committed.path.as_str())
            .and_then(|candidates| authoritative(candidates.iter().copied()));
        match staged {
            None => insert(committed_entry(committed), None),
            Some(change) => {
                if let Some(entry) = staged_entry(&committed.id, change) {
                    insert(entry, Some(change.recency()));
                }
            }
        }
    }

    for change in &snapshot.staged {
        if change.operation != StagedOperation::Add
            || committed_paths.contains(change.file_path.as_str())
        {
            continue;
        }
        if let Some(entry) = staged_entry(&change.id, change) {
            insert(entry, Some(change.recency()));
        }
    }

    entries.into_values().map(|(_, entry)| entry).collect()
}

/// Returns one file as seen through the staging overlay. Requires viewer.
pub fn get_effective_file(
    store: &dyn Store,
    ctx: &AccessContext,
    repository_id: &str,
    file_id: &str,
) -> Result<EffectiveFile> {
    let grant = require(store, ctx, Role::Viewer)?;
    let repo = scoped_repository(store, &grant, repository_id)?;

    let snapshot = store.load_file(&repo.id, FileRef::Id(file_id))?;
    effective_file(&snapshot, file_id).ok_or(Error::NotFound)
}

/// Lists the effective tree of a repository, optionally restricted to a folder. Requires viewer.
pub fn list_effective_tree(
    store: &dyn Store,
    ctx: &AccessContext,
    repository_id: &str,
    prefix: Option<&str>,
) -> Result<Vec<TreeEntry>> {
    let grant = require(store, ctx, Role::Viewer)?;
    let repo = scoped_repository(store, &grant, repository_id)?;

    let prefix = match prefix.map(str::trim) {
        Some(p) if !p.trim_matches('/').is_empty() => Some(normalize_path(p)?),
        _ => None,
    };

    let snapshot = store.repository_snapshot(&repo.id)?;
    Ok(effective_tree(&snapshot, prefix.as_deref()))
}

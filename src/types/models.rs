use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Identity of the authenticated creator. Always resolves to owner.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectToken {
    pub id: String,
    pub project_id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ProjectToken {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A file as last materialized by the commit pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedFile {
    pub id: String,
    pub repository_id: String,
    pub path: String,
    pub content: Vec<u8>,
    pub is_binary: bool,
    pub commit_ref: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagedOperation {
    Add,
    Edit,
    Delete,
    Rename,
}

impl StagedOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            StagedOperation::Add => "add",
            StagedOperation::Edit => "edit",
            StagedOperation::Delete => "delete",
            StagedOperation::Rename => "rename",
        }
    }

    pub fn parse(s: &str) -> Result<StagedOperation> {
        match s {
            "add" => Ok(StagedOperation::Add),
            "edit" => Ok(StagedOperation::Edit),
            "delete" => Ok(StagedOperation::Delete),
            "rename" => Ok(StagedOperation::Rename),
            other => Err(Error::InvalidArgument(format!(
                "unknown staged operation '{other}'"
            ))),
        }
    }
}

impl fmt::Display for StagedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending, uncommitted operation on one logical file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChange {
    pub id: String,
    pub repository_id: String,
    /// Current (target) path of the file.
    pub file_path: String,
    /// Original committed path, recorded once by the first rename.
    pub old_path: Option<String>,
    pub operation: StagedOperation,
    /// Original committed content, recorded once and never overwritten.
    pub old_content: Option<Vec<u8>>,
    pub new_content: Option<Vec<u8>>,
    pub is_binary: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
    /// Insertion order, assigned by the store. Breaks created_at ties.
    pub sequence: i64,
}

impl StagedChange {
    /// Returns true if this row refers to `path` as either its target or its origin.
    #[must_use]
    pub fn references(&self, path: &str) -> bool {
        self.file_path == path || self.old_path.as_deref() == Some(path)
    }

    /// Path of the committed file this change derives from. Adds have none.
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        match self.operation {
            StagedOperation::Add => None,
            _ => Some(self.old_path.as_deref().unwrap_or(&self.file_path)),
        }
    }

    /// Ordering key for last-write-wins resolution.
    #[must_use]
    pub fn recency(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.sequence)
    }
}

/// How an effective file differs from committed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Committed,
    Added,
    Edited,
    Renamed,
}

impl From<StagedOperation> for FileState {
    fn from(op: StagedOperation) -> Self {
        match op {
            StagedOperation::Add => FileState::Added,
            StagedOperation::Rename => FileState::Renamed,
            StagedOperation::Edit | StagedOperation::Delete => FileState::Edited,
        }
    }
}

/// A file as seen through the staging overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveFile {
    pub id: String,
    pub repository_id: String,
    pub path: String,
    pub content: Vec<u8>,
    pub is_binary: bool,
    pub state: FileState,
}

/// One entry of an effective tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub file_id: String,
    pub path: String,
    /// sha256 of the effective content, hex encoded.
    pub content_ref: String,
    pub size: usize,
    pub is_binary: bool,
    pub state: FileState,
}

pub mod path;
mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Identifies a logical file within a repository.
#[derive(Debug, Clone, Copy)]
pub enum FileRef<'a> {
    /// A committed file id or a staged change id.
    Id(&'a str),
    /// An effective path.
    Path(&'a str),
}

/// Describes which logical file a staging mutation targets.
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    pub repository_id: &'a str,
    pub target: FileRef<'a>,
    /// Path the file is being moved to, if any.
    pub destination: Option<&'a str>,
}

/// Committed and staged state of one logical file, read inside a transaction.
#[derive(Debug, Clone, Default)]
pub struct StagingSnapshot {
    pub committed: Option<CommittedFile>,
    /// The authoritative staged change for the file, if any.
    pub staged: Option<StagedChange>,
    /// True if `destination` is occupied by a different file.
    pub destination_taken: bool,
}

/// The write a staging plan asks the store to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingAction {
    Insert(StagedChange),
    Update(StagedChange),
    Remove(StagedChange),
}

/// A committed file as listed in a tree: its digest and size, without the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedEntry {
    pub id: String,
    pub path: String,
    pub is_binary: bool,
    /// sha256 of the content, hex encoded. Recorded when the file is committed.
    pub content_ref: String,
    pub size: usize,
}

impl From<&CommittedFile> for CommittedEntry {
    fn from(file: &CommittedFile) -> Self {
        Self {
            id: file.id.clone(),
            path: file.path.clone(),
            is_binary: file.is_binary,
            content_ref: crate::staging::content_ref(&file.content),
            size: file.content.len(),
        }
    }
}

/// Every committed and staged row of a repository, read consistently.
/// Committed content is not loaded; staged rows carry theirs.
#[derive(Debug, Clone, Default)]
pub struct RepositorySnapshot {
    pub committed: Vec<CommittedEntry>,
    pub staged: Vec<StagedChange>,
}

pub type StagingPlan<'a> = dyn Fn(&StagingSnapshot) -> Result<StagingAction> + 'a;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Project operations
    fn create_project(&self, project: &Project, default_token: &ProjectToken) -> Result<()>;
    fn get_project(&self, id: &str) -> Result<Option<Project>>;
    fn delete_project(&self, id: &str) -> Result<bool>;

    // Token operations
    fn create_token(&self, token: &ProjectToken) -> Result<()>;
    fn get_token_by_id(&self, id: &str) -> Result<Option<ProjectToken>>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<ProjectToken>>;
    fn list_project_tokens(&self, project_id: &str) -> Result<Vec<ProjectToken>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    /// Records token use. Best effort: returns Ok(false) when skipped under contention.
    fn touch_token(&self, id: &str) -> Result<bool>;

    // Repository operations
    fn create_repository(&self, repo: &Repository) -> Result<()>;
    fn get_repository(&self, id: &str) -> Result<Option<Repository>>;
    fn list_repositories(&self, project_id: &str) -> Result<Vec<Repository>>;
    fn delete_repository(&self, id: &str) -> Result<bool>;

    // Committed file operations (commit pipeline side)
    fn put_committed_file(&self, file: &CommittedFile) -> Result<()>;
    fn get_committed_file(&self, id: &str) -> Result<Option<CommittedFile>>;
    fn list_committed_files(&self, repository_id: &str) -> Result<Vec<CommittedFile>>;
    /// Rewrites committed paths under `old_prefix` to `new_prefix` in one transaction.
    /// Fails with Conflict if staged changes exist under `old_prefix`.
    fn rename_committed_folder(
        &self,
        repository_id: &str,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<usize>;

    // Staged change operations
    fn get_staged_change(&self, id: &str) -> Result<Option<StagedChange>>;
    fn list_staged_changes(&self, repository_id: &str) -> Result<Vec<StagedChange>>;
    fn delete_staged_change(&self, id: &str) -> Result<bool>;
    fn load_file(&self, repository_id: &str, target: FileRef<'_>) -> Result<StagingSnapshot>;
    fn repository_snapshot(&self, repository_id: &str) -> Result<RepositorySnapshot>;
    /// Reads the snapshot for `request`, runs `plan` on it and applies the resulting
    /// action, all inside one transaction.
    fn stage(&self, request: &StageRequest<'_>, plan: &StagingPlan<'_>) -> Result<StagingAction>;
}

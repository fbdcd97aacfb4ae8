use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Grant;
use crate::server::response::ApiError;
use crate::staging::StageOutcome;
use crate::types::{EffectiveFile, FileState, Project, ProjectToken, Role, StagedChange, StagedOperation};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateProjectResponse {
    pub project: Project,
    /// Raw default token. Shown once.
    pub token: String,
    pub token_metadata: ProjectToken,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub project_id: String,
    pub role: Role,
    pub actor: String,
}

impl From<Grant> for AccessResponse {
    fn from(grant: Grant) -> Self {
        Self {
            project_id: grant.project_id,
            role: grant.role,
            actor: grant.actor.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub role: Role,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub metadata: ProjectToken,
}

#[derive(Debug, Deserialize)]
pub struct CreateRepoRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TreeQuery {
    #[serde(default)]
    pub prefix: Option<String>,
}

/// File content on the wire: text as-is, binary as base64.
#[derive(Debug, Deserialize)]
pub struct FileContent {
    pub content: String,
    #[serde(default)]
    pub is_binary: bool,
}

impl FileContent {
    pub fn decode(&self) -> Result<Vec<u8>, ApiError> {
        if self.is_binary {
            STANDARD
                .decode(self.content.as_bytes())
                .map_err(|_| ApiError::bad_request("Binary content must be base64 encoded"))
        } else {
            Ok(self.content.as_bytes().to_vec())
        }
    }
}

/// Encodes content for the wire. Text that is not valid UTF-8 goes out as base64,
/// flagged binary.
fn encode_content(content: Vec<u8>, is_binary: bool) -> (String, bool) {
    if is_binary {
        return (STANDARD.encode(content), true);
    }
    match String::from_utf8(content) {
        Ok(text) => (text, false),
        Err(e) => (STANDARD.encode(e.as_bytes()), true),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFileRequest {
    pub path: String,
    #[serde(flatten)]
    pub body: FileContent,
}

#[derive(Debug, Deserialize)]
pub struct RenameFileRequest {
    pub new_path: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameFolderRequest {
    pub old_prefix: String,
    pub new_prefix: String,
}

#[derive(Debug, Serialize)]
pub struct RenameFolderResponse {
    pub moved: usize,
}

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub id: String,
    pub path: String,
    pub content: String,
    pub is_binary: bool,
    pub state: FileState,
}

impl From<EffectiveFile> for FileResponse {
    fn from(file: EffectiveFile) -> Self {
        let (content, is_binary) = encode_content(file.content, file.is_binary);
        Self {
            id: file.id,
            path: file.path,
            content,
            is_binary,
            state: file.state,
        }
    }
}

/// A pending change, without its content.
#[derive(Debug, Serialize)]
pub struct StagedChangeResponse {
    pub id: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub operation: StagedOperation,
    pub is_binary: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl From<StagedChange> for StagedChangeResponse {
    fn from(change: StagedChange) -> Self {
        Self {
            id: change.id,
            file_path: change.file_path,
            old_path: change.old_path,
            operation: change.operation,
            is_binary: change.is_binary,
            created_by: change.created_by,
            created_at: change.created_at,
            updated_by: change.updated_by,
            updated_at: change.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Staged,
    Discarded,
}

#[derive(Debug, Serialize)]
pub struct StageOutcomeResponse {
    pub outcome: Outcome,
    pub change: StagedChangeResponse,
}

impl From<StageOutcome> for StageOutcomeResponse {
    fn from(outcome: StageOutcome) -> Self {
        match outcome {
            StageOutcome::Staged(change) => Self {
                outcome: Outcome::Staged,
                change: change.into(),
            },
            StageOutcome::Discarded(change) => Self {
                outcome: Outcome::Discarded,
                change: change.into(),
            },
        }
    }
}

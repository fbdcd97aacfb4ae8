pub const SCHEMA: &str = r#"
-- Projects are owned by their authenticated creator, independent of tokens
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Tokens are bearer credentials scoped to one project and carrying one role
CREATE TABLE IF NOT EXISTS project_tokens (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- 8-char lookup segment of the raw token
    role TEXT NOT NULL CHECK (role IN ('viewer', 'editor', 'owner')),
    label TEXT,
    is_default INTEGER NOT NULL DEFAULT 0,

    -- Lifecycle
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,            -- NULL = never
    last_used_at TEXT           -- best effort
);

CREATE TABLE IF NOT EXISTS repositories (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(project_id, name)
);

-- Committed files are written only by the commit pipeline (and folder renames)
CREATE TABLE IF NOT EXISTS committed_files (
    id TEXT PRIMARY KEY,
    repository_id TEXT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    content BLOB NOT NULL,
    content_ref TEXT NOT NULL,         -- sha256 hex of content, for tree listings
    size INTEGER NOT NULL,
    is_binary INTEGER NOT NULL DEFAULT 0,
    commit_ref TEXT,
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(repository_id, path)
);

-- Pending file operations; at most one row per (repository, target path)
CREATE TABLE IF NOT EXISTS staged_changes (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    repository_id TEXT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    file_path TEXT NOT NULL,
    old_path TEXT,
    operation TEXT NOT NULL CHECK (operation IN ('add', 'edit', 'delete', 'rename')),
    old_content BLOB,
    new_content BLOB,
    is_binary INTEGER NOT NULL DEFAULT 0,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_by TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE(repository_id, file_path)
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_project_tokens_lookup ON project_tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_project_tokens_project ON project_tokens(project_id);
CREATE INDEX IF NOT EXISTS idx_repositories_project ON repositories(project_id);
CREATE INDEX IF NOT EXISTS idx_committed_files_repository ON committed_files(repository_id);
CREATE INDEX IF NOT EXISTS idx_staged_changes_repository ON staged_changes(repository_id);
CREATE INDEX IF NOT EXISTS idx_staged_changes_old_path ON staged_changes(repository_id, old_path);
"#;

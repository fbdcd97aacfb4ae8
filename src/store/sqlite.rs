use std::path::Path;
use std::sync::{Mutex, TryLockError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::path::is_within;
use super::schema::SCHEMA;
use super::{
    CommittedEntry, FileRef, RepositorySnapshot, StageRequest, StagingAction, StagingPlan,
    StagingSnapshot, Store,
};
use crate::error::{Error, Result};
use crate::staging::{authoritative, content_ref};
use crate::types::*;

const TOKEN_COLUMNS: &str = "id, project_id, token_hash, token_lookup, role, label, is_default, created_at, expires_at, last_used_at";
const REPOSITORY_COLUMNS: &str = "id, project_id, name, description, created_at, updated_at";
const COMMITTED_COLUMNS: &str = "id, repository_id, path, content, is_binary, commit_ref, updated_at";
const STAGED_COLUMNS: &str = "seq, id, repository_id, file_path, old_path, operation, old_content, new_content, is_binary, created_by, created_at, updated_by, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Role::parse(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for StagedOperation {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for StagedOperation {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        StagedOperation::parse(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        created_by: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn row_to_token(row: &Row<'_>) -> rusqlite::Result<ProjectToken> {
    Ok(ProjectToken {
        id: row.get(0)?,
        project_id: row.get(1)?,
        token_hash: row.get(2)?,
        token_lookup: row.get(3)?,
        role: row.get(4)?,
        label: row.get(5)?,
        is_default: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        expires_at: row.get::<_, Option<String>>(8)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(9)?.map(|s| parse_datetime(&s)),
    })
}

fn row_to_repository(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn row_to_committed(row: &Row<'_>) -> rusqlite::Result<CommittedFile> {
    Ok(CommittedFile {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        path: row.get(2)?,
        content: row.get(3)?,
        is_binary: row.get(4)?,
        commit_ref: row.get(5)?,
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn row_to_staged(row: &Row<'_>) -> rusqlite::Result<StagedChange> {
    Ok(StagedChange {
        sequence: row.get(0)?,
        id: row.get(1)?,
        repository_id: row.get(2)?,
        file_path: row.get(3)?,
        old_path: row.get(4)?,
        operation: row.get(5)?,
        old_content: row.get(6)?,
        new_content: row.get(7)?,
        is_binary: row.get(8)?,
        created_by: row.get(9)?,
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_by: row.get(11)?,
        updated_at: parse_datetime(&row.get::<_, String>(12)?),
    })
}

fn query_committed_by_id(
    conn: &Connection,
    repository_id: &str,
    id: &str,
) -> Result<Option<CommittedFile>> {
    conn.query_row(
        &format!("SELECT {COMMITTED_COLUMNS} FROM committed_files WHERE repository_id = ?1 AND id = ?2"),
        params![repository_id, id],
        row_to_committed,
    )
    .optional()
    .map_err(Error::from)
}

fn query_committed_by_path(
    conn: &Connection,
    repository_id: &str,
    path: &str,
) -> Result<Option<CommittedFile>> {
    conn.query_row(
        &format!(
            "SELECT {COMMITTED_COLUMNS} FROM committed_files WHERE repository_id = ?1 AND path = ?2"
        ),
        params![repository_id, path],
        row_to_committed,
    )
    .optional()
    .map_err(Error::from)
}

fn query_committed_files(conn: &Connection, repository_id: &str) -> Result<Vec<CommittedFile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMMITTED_COLUMNS} FROM committed_files WHERE repository_id = ?1 ORDER BY path"
    ))?;

    let rows = stmt.query_map(params![repository_id], row_to_committed)?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn query_committed_entries(conn: &Connection, repository_id: &str) -> Result<Vec<CommittedEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, path, is_binary, content_ref, size FROM committed_files
         WHERE repository_id = ?1 ORDER BY path",
    )?;

    let rows = stmt.query_map(params![repository_id], |row| {
        Ok(CommittedEntry {
            id: row.get(0)?,
            path: row.get(1)?,
            is_binary: row.get(2)?,
            content_ref: row.get(3)?,
            size: row.get::<_, i64>(4)? as usize,
        })
    })?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn query_staged_by_id(
    conn: &Connection,
    repository_id: &str,
    id: &str,
) -> Result<Option<StagedChange>> {
    conn.query_row(
        &format!("SELECT {STAGED_COLUMNS} FROM staged_changes WHERE repository_id = ?1 AND id = ?2"),
        params![repository_id, id],
        row_to_staged,
    )
    .optional()
    .map_err(Error::from)
}

fn query_staged_at(
    conn: &Connection,
    repository_id: &str,
    file_path: &str,
) -> Result<Option<StagedChange>> {
    conn.query_row(
        &format!(
            "SELECT {STAGED_COLUMNS} FROM staged_changes WHERE repository_id = ?1 AND file_path = ?2"
        ),
        params![repository_id, file_path],
        row_to_staged,
    )
    .optional()
    .map_err(Error::from)
}

/// Staged changes whose target or origin is `path`.
fn query_staged_referencing(
    conn: &Connection,
    repository_id: &str,
    path: &str,
) -> Result<Vec<StagedChange>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAGED_COLUMNS} FROM staged_changes
         WHERE repository_id = ?1 AND (file_path = ?2 OR old_path = ?2)
         ORDER BY seq"
    ))?;

    let rows = stmt.query_map(params![repository_id, path], row_to_staged)?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn query_staged_changes(conn: &Connection, repository_id: &str) -> Result<Vec<StagedChange>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAGED_COLUMNS} FROM staged_changes WHERE repository_id = ?1 ORDER BY seq"
    ))?;

    let rows = stmt.query_map(params![repository_id], row_to_staged)?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn load_snapshot(
    conn: &Connection,
    repository_id: &str,
    target: FileRef<'_>,
    destination: Option<&str>,
) -> Result<StagingSnapshot> {
    let (committed, staged) = match target {
        FileRef::Id(id) => match query_committed_by_id(conn, repository_id, id)? {
            Some(committed) => {
                let candidates = query_staged_referencing(conn, repository_id, &committed.path)?;
                let staged = authoritative(&candidates).cloned();
                (Some(committed), staged)
            }
            None => match query_staged_by_id(conn, repository_id, id)? {
                Some(staged) => {
                    let committed = match staged.origin() {
                        Some(origin) => query_committed_by_path(conn, repository_id, origin)?,
                        None => None,
                    };
                    (committed, Some(staged))
                }
                None => (None, None),
            },
        },
        FileRef::Path(path) => {
            let committed = query_committed_by_path(conn, repository_id, path)?;
            let candidates = query_staged_referencing(conn, repository_id, path)?;
            (committed, authoritative(&candidates).cloned())
        }
    };

    let destination_taken = match destination {
        Some(dest) => {
            let committed_taken = query_committed_by_path(conn, repository_id, dest)?
                .is_some_and(|other| committed.as_ref().is_none_or(|own| own.id != other.id));
            let staged_taken = query_staged_at(conn, repository_id, dest)?
                .is_some_and(|other| staged.as_ref().is_none_or(|own| own.id != other.id));
            committed_taken || staged_taken
        }
        None => false,
    };

    Ok(StagingSnapshot {
        committed,
        staged,
        destination_taken,
    })
}

fn insert_staged(conn: &Connection, change: &StagedChange) -> Result<i64> {
    let result = conn.execute(
        "INSERT INTO staged_changes (id, repository_id, file_path, old_path, operation, old_content,
                                     new_content, is_binary, created_by, created_at, updated_by, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            change.id,
            change.repository_id,
            change.file_path,
            change.old_path,
            change.operation,
            change.old_content,
            change.new_content,
            change.is_binary,
            change.created_by,
            format_datetime(&change.created_at),
            change.updated_by,
            format_datetime(&change.updated_at),
        ],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_constraint_violation(&e) => Err(Error::Conflict(format!(
            "a staged change already exists for '{}'",
            change.file_path
        ))),
        Err(e) => Err(Error::from(e)),
    }
}

fn update_staged(conn: &Connection, change: &StagedChange) -> Result<()> {
    let result = conn.execute(
        "UPDATE staged_changes
         SET file_path = ?1, old_path = ?2, operation = ?3, old_content = ?4, new_content = ?5,
             is_binary = ?6, updated_by = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            change.file_path,
            change.old_path,
            change.operation,
            change.old_content,
            change.new_content,
            change.is_binary,
            change.updated_by,
            format_datetime(&change.updated_at),
            change.id,
        ],
    );

    match result {
        Ok(0) => Err(Error::NotFound),
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(Error::Conflict(format!(
            "a staged change already exists for '{}'",
            change.file_path
        ))),
        Err(e) => Err(Error::from(e)),
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Project operations

    fn create_project(&self, project: &Project, default_token: &ProjectToken) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO projects (id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                project.id,
                project.name,
                project.created_by,
                format_datetime(&project.created_at),
            ],
        )?;
        insert_token(&tx, default_token)?;

        tx.commit()?;
        Ok(())
    }

    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, created_by, created_at FROM projects WHERE id = ?1",
            params![id],
            row_to_project,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_project(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Token operations

    fn create_token(&self, token: &ProjectToken) -> Result<()> {
        insert_token(&self.conn(), token)
    }

    fn get_token_by_id(&self, id: &str) -> Result<Option<ProjectToken>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM project_tokens WHERE id = ?1"),
            params![id],
            row_to_token,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<ProjectToken>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM project_tokens WHERE token_lookup = ?1"),
            params![lookup],
            row_to_token,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_project_tokens(&self, project_id: &str) -> Result<Vec<ProjectToken>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLUMNS} FROM project_tokens WHERE project_id = ?1 ORDER BY created_at, id"
        ))?;

        let rows = stmt.query_map(params![project_id], row_to_token)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM project_tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn touch_token(&self, id: &str) -> Result<bool> {
        let conn = match self.conn.try_lock() {
            Ok(conn) => conn,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(false),
        };

        conn.execute(
            "UPDATE project_tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(true)
    }

    // Repository operations

    fn create_repository(&self, repo: &Repository) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO repositories (id, project_id, name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                repo.id,
                repo.project_id,
                repo.name,
                repo.description,
                format_datetime(&repo.created_at),
                format_datetime(&repo.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::Conflict(format!(
                "repository '{}' already exists",
                repo.name
            ))),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE id = ?1"),
            params![id],
            row_to_repository,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_repositories(&self, project_id: &str) -> Result<Vec<Repository>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE project_id = ?1 ORDER BY name"
        ))?;

        let rows = stmt.query_map(params![project_id], row_to_repository)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_repository(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM repositories WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Committed file operations

    fn put_committed_file(&self, file: &CommittedFile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO committed_files (id, repository_id, path, content, is_binary, commit_ref, updated_at, content_ref, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (repository_id, path) DO UPDATE SET
                content = excluded.content,
                content_ref = excluded.content_ref,
                size = excluded.size,
                is_binary = excluded.is_binary,
                commit_ref = excluded.commit_ref,
                updated_at = excluded.updated_at",
            params![
                file.id,
                file.repository_id,
                file.path,
                file.content,
                file.is_binary,
                file.commit_ref,
                format_datetime(&file.updated_at),
                content_ref(&file.content),
                file.content.len() as i64,
            ],
        )?;
        Ok(())
    }

    fn get_committed_file(&self, id: &str) -> Result<Option<CommittedFile>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {COMMITTED_COLUMNS} FROM committed_files WHERE id = ?1"),
            params![id],
            row_to_committed,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_committed_files(&self, repository_id: &str) -> Result<Vec<CommittedFile>> {
        query_committed_files(&self.conn(), repository_id)
    }

    fn rename_committed_folder(
        &self,
        repository_id: &str,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        // Staged rows link to committed files by path, so neither the source
        // nor the destination subtree may carry any.
        let touches = |path: &str| is_within(path, old_prefix) || is_within(path, new_prefix);
        let pending = query_staged_changes(&tx, repository_id)?
            .into_iter()
            .filter(|c| touches(&c.file_path) || c.old_path.as_deref().is_some_and(touches))
            .count();
        if pending > 0 {
            return Err(Error::Conflict(format!(
                "{pending} staged change(s) pending under '{old_prefix}' or '{new_prefix}'"
            )));
        }

        let affected: Vec<(String, String)> = query_committed_files(&tx, repository_id)?
            .into_iter()
            .filter_map(|f| super::path::rebase(&f.path, old_prefix, new_prefix).map(|p| (f.id, p)))
            .collect();

        let now = format_datetime(&Utc::now());
        for (id, new_path) in &affected {
            let result = tx.execute(
                "UPDATE committed_files SET path = ?1, updated_at = ?2 WHERE id = ?3",
                params![new_path, now, id],
            );
            match result {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    return Err(Error::Conflict(format!(
                        "a committed file already exists at '{new_path}'"
                    )));
                }
                Err(e) => return Err(Error::from(e)),
            }
        }

        tx.commit()?;
        Ok(affected.len())
    }

    // Staged change operations

    fn get_staged_change(&self, id: &str) -> Result<Option<StagedChange>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {STAGED_COLUMNS} FROM staged_changes WHERE id = ?1"),
            params![id],
            row_to_staged,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_staged_changes(&self, repository_id: &str) -> Result<Vec<StagedChange>> {
        query_staged_changes(&self.conn(), repository_id)
    }

    fn delete_staged_change(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM staged_changes WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn load_file(&self, repository_id: &str, target: FileRef<'_>) -> Result<StagingSnapshot> {
        load_snapshot(&self.conn(), repository_id, target, None)
    }

    fn repository_snapshot(&self, repository_id: &str) -> Result<RepositorySnapshot> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let committed = query_committed_entries(&tx, repository_id)?;
        let staged = query_staged_changes(&tx, repository_id)?;

        tx.commit()?;
        Ok(RepositorySnapshot { committed, staged })
    }

    fn stage(&self, request: &StageRequest<'_>, plan: &StagingPlan<'_>) -> Result<StagingAction> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let snapshot = load_snapshot(
            &tx,
            request.repository_id,
            request.target,
            request.destination,
        )?;

        let action = match plan(&snapshot)? {
            StagingAction::Insert(mut change) => {
                change.sequence = insert_staged(&tx, &change)?;
                StagingAction::Insert(change)
            }
            StagingAction::Update(change) => {
                update_staged(&tx, &change)?;
                StagingAction::Update(change)
            }
            StagingAction::Remove(change) => {
                tx.execute(
                    "DELETE FROM staged_changes WHERE id = ?1",
                    params![change.id],
                )?;
                StagingAction::Remove(change)
            }
        };

        tx.commit()?;
        Ok(action)
    }
}

fn insert_token(conn: &Connection, token: &ProjectToken) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO project_tokens (id, project_id, token_hash, token_lookup, role, label, is_default, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            token.id,
            token.project_id,
            token.token_hash,
            token.token_lookup,
            token.role,
            token.label,
            token.is_default,
            format_datetime(&token.created_at),
            token.expires_at.as_ref().map(format_datetime),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(Error::TokenLookupCollision)
        }
        Err(e) => Err(Error::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(temp: &TempDir) -> SqliteStore {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        store
    }

    fn project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            name: format!("{id}-name"),
            created_by: "alice".to_string(),
            created_at: Utc::now(),
        }
    }

    fn token(id: &str, project_id: &str, lookup: &str) -> ProjectToken {
        ProjectToken {
            id: id.to_string(),
            project_id: project_id.to_string(),
            token_hash: format!("hash-{id}"),
            token_lookup: lookup.to_string(),
            role: Role::Editor,
            label: None,
            is_default: false,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        }
    }

    fn repository(id: &str, project_id: &str) -> Repository {
        Repository {
            id: id.to_string(),
            project_id: project_id.to_string(),
            name: format!("{id}-name"),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn committed(id: &str, repository_id: &str, path: &str) -> CommittedFile {
        CommittedFile {
            id: id.to_string(),
            repository_id: repository_id.to_string(),
            path: path.to_string(),
            content: path.as_bytes().to_vec(),
            is_binary: false,
            commit_ref: Some("c0ffee".to_string()),
            updated_at: Utc::now(),
        }
    }

    fn staged(id: &str, repository_id: &str, path: &str, op: StagedOperation) -> StagedChange {
        let now = Utc::now();
        StagedChange {
            id: id.to_string(),
            repository_id: repository_id.to_string(),
            file_path: path.to_string(),
            old_path: None,
            operation: op,
            old_content: None,
            new_content: Some(b"new".to_vec()),
            is_binary: false,
            created_by: "user:alice".to_string(),
            created_at: now,
            updated_by: "user:alice".to_string(),
            updated_at: now,
            sequence: 0,
        }
    }

    fn seeded_store(temp: &TempDir) -> SqliteStore {
        let store = open_store(temp);
        store
            .create_project(&project("p1"), &token("t1", "p1", "lookup01"))
            .unwrap();
        store.create_repository(&repository("r1", "p1")).unwrap();
        store
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"projects".to_string()));
        assert!(tables.contains(&"project_tokens".to_string()));
        assert!(tables.contains(&"repositories".to_string()));
        assert!(tables.contains(&"committed_files".to_string()));
        assert!(tables.contains(&"staged_changes".to_string()));
    }

    #[test]
    fn test_project_with_default_token() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);

        let fetched = store.get_project("p1").unwrap().unwrap();
        assert_eq!(fetched.created_by, "alice");

        let tokens = store.list_project_tokens("p1").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].role, Role::Editor);

        let by_lookup = store.get_token_by_lookup("lookup01").unwrap().unwrap();
        assert_eq!(by_lookup.id, "t1");
    }

    #[test]
    fn test_token_lookup_collision() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);

        let result = store.create_token(&token("t2", "p1", "lookup01"));
        assert!(matches!(result, Err(Error::TokenLookupCollision)));
    }

    #[test]
    fn test_touch_token_records_last_used() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);

        assert!(store.touch_token("t1").unwrap());
        let fetched = store.get_token_by_id("t1").unwrap().unwrap();
        assert!(fetched.last_used_at.is_some());
    }

    #[test]
    fn test_touch_token_skips_under_contention() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);

        let _guard = store.connection();
        assert!(!store.touch_token("t1").unwrap());
    }

    #[test]
    fn test_delete_project_cascades() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);
        store
            .put_committed_file(&committed("f1", "r1", "src/a.ts"))
            .unwrap();
        store
            .stage(
                &StageRequest {
                    repository_id: "r1",
                    target: FileRef::Path("src/b.ts"),
                    destination: None,
                },
                &|_| Ok(StagingAction::Insert(staged("s1", "r1", "src/b.ts", StagedOperation::Add))),
            )
            .unwrap();

        assert!(store.delete_project("p1").unwrap());

        assert!(store.get_token_by_id("t1").unwrap().is_none());
        assert!(store.get_repository("r1").unwrap().is_none());
        assert!(store.get_committed_file("f1").unwrap().is_none());
        assert!(store.get_staged_change("s1").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_repository_name_conflicts() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);

        let mut dup = repository("r2", "p1");
        dup.name = "r1-name".to_string();
        assert!(matches!(
            store.create_repository(&dup),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_stage_insert_assigns_sequence_and_enforces_uniqueness() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);
        let request = StageRequest {
            repository_id: "r1",
            target: FileRef::Path("notes.md"),
            destination: None,
        };

        let first = store
            .stage(&request, &|_| {
                Ok(StagingAction::Insert(staged("s1", "r1", "notes.md", StagedOperation::Add)))
            })
            .unwrap();
        let StagingAction::Insert(first) = first else {
            panic!("expected insert");
        };
        assert!(first.sequence > 0);

        // A planner that ignores the snapshot still cannot create a duplicate row.
        let second = store.stage(&request, &|_| {
            Ok(StagingAction::Insert(staged("s2", "r1", "notes.md", StagedOperation::Add)))
        });
        assert!(matches!(second, Err(Error::Conflict(_))));
        assert_eq!(store.list_staged_changes("r1").unwrap().len(), 1);
    }

    #[test]
    fn test_stage_failure_rolls_back() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);

        let result = store.stage(
            &StageRequest {
                repository_id: "r1",
                target: FileRef::Path("a"),
                destination: None,
            },
            &|_| Err(Error::NotFound),
        );
        assert!(matches!(result, Err(Error::NotFound)));
        assert!(store.list_staged_changes("r1").unwrap().is_empty());
    }

    #[test]
    fn test_load_file_by_committed_id_finds_renamed_row() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);
        store
            .put_committed_file(&committed("f1", "r1", "src/a.ts"))
            .unwrap();

        let mut rename = staged("s1", "r1", "src/b.ts", StagedOperation::Rename);
        rename.old_path = Some("src/a.ts".to_string());
        store
            .stage(
                &StageRequest {
                    repository_id: "r1",
                    target: FileRef::Id("f1"),
                    destination: Some("src/b.ts"),
                },
                &move |_| Ok(StagingAction::Insert(rename.clone())),
            )
            .unwrap();

        let snapshot = store.load_file("r1", FileRef::Id("f1")).unwrap();
        assert_eq!(snapshot.committed.unwrap().path, "src/a.ts");
        assert_eq!(snapshot.staged.unwrap().id, "s1");

        let by_staged_id = store.load_file("r1", FileRef::Id("s1")).unwrap();
        assert_eq!(by_staged_id.committed.unwrap().id, "f1");

        let other_repo = store.load_file("r2", FileRef::Id("f1")).unwrap();
        assert!(other_repo.committed.is_none());
        assert!(other_repo.staged.is_none());
    }

    #[test]
    fn test_destination_taken() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);
        store
            .put_committed_file(&committed("f1", "r1", "a.txt"))
            .unwrap();
        store
            .put_committed_file(&committed("f2", "r1", "b.txt"))
            .unwrap();

        let request = StageRequest {
            repository_id: "r1",
            target: FileRef::Id("f1"),
            destination: Some("b.txt"),
        };
        let result = store.stage(&request, &|snapshot| {
            assert!(snapshot.destination_taken);
            Err(Error::Conflict("taken".to_string()))
        });
        assert!(matches!(result, Err(Error::Conflict(_))));

        // Moving a file back onto its own committed path is not a collision.
        let back = StageRequest {
            repository_id: "r1",
            target: FileRef::Id("f1"),
            destination: Some("a.txt"),
        };
        let result = store.stage(&back, &|snapshot| {
            assert!(!snapshot.destination_taken);
            Err(Error::NotFound)
        });
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[test]
    fn test_rename_committed_folder_respects_boundaries() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);
        for (id, path) in [
            ("f1", "src/old/a.ts"),
            ("f2", "src/old/b.ts"),
            ("f3", "src/old/deep/c.ts"),
            ("f4", "src/old2/x.ts"),
        ] {
            store.put_committed_file(&committed(id, "r1", path)).unwrap();
        }

        let count = store
            .rename_committed_folder("r1", "src/old", "src/new")
            .unwrap();
        assert_eq!(count, 3);

        let paths: Vec<String> = store
            .list_committed_files("r1")
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(
            paths,
            vec!["src/new/a.ts", "src/new/b.ts", "src/new/deep/c.ts", "src/old2/x.ts"]
        );
    }

    #[test]
    fn test_repository_snapshot_lists_recorded_digests() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);
        let file = committed("f1", "r1", "docs/a.md");
        store.put_committed_file(&file).unwrap();
        store.rename_committed_folder("r1", "docs", "guides").unwrap();

        let snapshot = store.repository_snapshot("r1").unwrap();
        assert_eq!(snapshot.committed.len(), 1);
        let entry = &snapshot.committed[0];
        assert_eq!(entry.path, "guides/a.md");
        assert_eq!(entry.content_ref, content_ref(&file.content));
        assert_eq!(entry.size, file.content.len());

        let mut updated = file.clone();
        updated.path = "guides/a.md".to_string();
        updated.content = b"rewritten".to_vec();
        store.put_committed_file(&updated).unwrap();
        let snapshot = store.repository_snapshot("r1").unwrap();
        assert_eq!(snapshot.committed[0].content_ref, content_ref(b"rewritten"));
        assert_eq!(snapshot.committed[0].size, 9);
    }

    #[test]
    fn test_rename_committed_folder_blocked_by_staging() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);
        store
            .put_committed_file(&committed("f1", "r1", "docs/a.md"))
            .unwrap();
        store
            .stage(
                &StageRequest {
                    repository_id: "r1",
                    target: FileRef::Path("docs/new.md"),
                    destination: None,
                },
                &|_| Ok(StagingAction::Insert(staged("s1", "r1", "docs/new.md", StagedOperation::Add))),
            )
            .unwrap();

        let result = store.rename_committed_folder("r1", "docs", "guides");
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(
            store.get_committed_file("f1").unwrap().unwrap().path,
            "docs/a.md"
        );
    }

    #[test]
    fn test_rename_committed_folder_blocked_by_staging_at_destination() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);
        store.put_committed_file(&committed("fx", "r1", "x/a.ts")).unwrap();
        store.put_committed_file(&committed("fz", "r1", "z/a.ts")).unwrap();
        let mut moved = staged("s1", "r1", "y/a.ts", StagedOperation::Rename);
        moved.old_path = Some("x/a.ts".to_string());
        store
            .stage(
                &StageRequest {
                    repository_id: "r1",
                    target: FileRef::Id("fx"),
                    destination: Some("y/a.ts"),
                },
                &|_| Ok(StagingAction::Insert(moved.clone())),
            )
            .unwrap();

        let result = store.rename_committed_folder("r1", "z", "y");
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(store.get_committed_file("fz").unwrap().unwrap().path, "z/a.ts");
    }

    #[test]
    fn test_rename_committed_folder_collision_rolls_back() {
        let temp = TempDir::new().unwrap();
        let store = seeded_store(&temp);
        store.put_committed_file(&committed("f1", "r1", "a/x.md")).unwrap();
        store.put_committed_file(&committed("f2", "r1", "a/y.md")).unwrap();
        store.put_committed_file(&committed("f3", "r1", "b/y.md")).unwrap();

        let result = store.rename_committed_folder("r1", "a", "b");
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(store.get_committed_file("f1").unwrap().unwrap().path, "a/x.md");
    }
}

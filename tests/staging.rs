//! Staging scenarios driven through the public library operations over a real SQLite store.

use atelier::auth::{AccessContext, TokenGenerator};
use atelier::error::Error;
use atelier::projects;
use atelier::staging::{self, StageOutcome};
use atelier::store::{SqliteStore, Store};
use atelier::types::{CommittedFile, FileState, Role, StagedOperation};
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

struct Fixture {
    _temp: TempDir,
    store: SqliteStore,
    generator: TokenGenerator,
    project_id: String,
    repo_id: String,
    default_token: String,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp dir");
        let store = SqliteStore::new(temp.path().join("atelier.db")).expect("open store");
        store.initialize().expect("initialize");

        let generator = TokenGenerator::new();
        let created = projects::create_project(&store, &generator, "alice", "Site", Role::Editor)
            .expect("create project");
        let owner = AccessContext::new(&created.project.id).with_identity("alice");
        let repo = projects::create_repository(&store, &owner, "web", None).expect("create repo");

        Self {
            _temp: temp,
            store,
            generator,
            project_id: created.project.id,
            repo_id: repo.id,
            default_token: created.default_token.raw,
        }
    }

    fn owner(&self) -> AccessContext {
        AccessContext::new(&self.project_id).with_identity("alice")
    }

    fn editor(&self) -> AccessContext {
        AccessContext::new(&self.project_id).with_token(&self.default_token)
    }

    fn with_role(&self, role: Role) -> AccessContext {
        let issued =
            projects::create_token(&self.store, &self.generator, &self.owner(), role, None, None)
                .expect("create token");
        AccessContext::new(&self.project_id).with_token(issued.raw)
    }

    fn commit(&self, path: &str, content: &str) -> String {
        let file = CommittedFile {
            id: Uuid::new_v4().to_string(),
            repository_id: self.repo_id.clone(),
            path: path.to_string(),
            content: content.as_bytes().to_vec(),
            is_binary: false,
            commit_ref: Some("c0ffee".to_string()),
            updated_at: Utc::now(),
        };
        self.store.put_committed_file(&file).expect("commit file");
        file.id
    }

    fn tree_paths(&self, prefix: Option<&str>) -> Vec<String> {
        staging::list_effective_tree(&self.store, &self.editor(), &self.repo_id, prefix)
            .expect("list tree")
            .into_iter()
            .map(|e| e.path)
            .collect()
    }
}

fn staged_id(outcome: &StageOutcome) -> String {
    outcome.change().id.clone()
}

#[test]
fn test_edit_then_rename_keeps_original() {
    let fx = Fixture::new();
    let ctx = fx.editor();
    let file_id = fx.commit("src/a.ts", "A");

    staging::edit_file(&fx.store, &ctx, &fx.repo_id, &file_id, b"B", false).unwrap();
    let file = staging::get_effective_file(&fx.store, &ctx, &fx.repo_id, &file_id).unwrap();
    assert_eq!(file.content, b"B");
    assert_eq!(file.state, FileState::Edited);

    let outcome = staging::rename_file(&fx.store, &ctx, &fx.repo_id, &file_id, "src/b.ts").unwrap();
    let file = staging::get_effective_file(&fx.store, &ctx, &fx.repo_id, &file_id).unwrap();
    assert_eq!(file.path, "src/b.ts");
    assert_eq!(file.content, b"B");

    let row = fx.store.get_staged_change(&staged_id(&outcome)).unwrap().unwrap();
    assert_eq!(row.old_path.as_deref(), Some("src/a.ts"));
    assert_eq!(row.old_content.as_deref(), Some(&b"A"[..]));
    assert_eq!(row.operation, StagedOperation::Rename);
}

#[test]
fn test_double_rename_preserves_first_origin() {
    let fx = Fixture::new();
    let ctx = fx.editor();
    let file_id = fx.commit("docs/one.md", "original");

    staging::rename_file(&fx.store, &ctx, &fx.repo_id, &file_id, "docs/two.md").unwrap();
    staging::edit_file(&fx.store, &ctx, &fx.repo_id, &file_id, b"changed", false).unwrap();
    let outcome =
        staging::rename_file(&fx.store, &ctx, &fx.repo_id, &file_id, "docs/three.md").unwrap();

    let row = outcome.change();
    assert_eq!(row.file_path, "docs/three.md");
    assert_eq!(row.old_path.as_deref(), Some("docs/one.md"));
    assert_eq!(row.old_content.as_deref(), Some(&b"original"[..]));
    assert_eq!(row.new_content.as_deref(), Some(&b"changed"[..]));

    assert_eq!(fx.tree_paths(None), vec!["docs/three.md"]);
    assert_eq!(fx.store.list_staged_changes(&fx.repo_id).unwrap().len(), 1);
}

#[test]
fn test_rename_back_to_original_path() {
    let fx = Fixture::new();
    let ctx = fx.editor();
    let file_id = fx.commit("a.md", "A");

    staging::rename_file(&fx.store, &ctx, &fx.repo_id, &file_id, "b.md").unwrap();
    staging::rename_file(&fx.store, &ctx, &fx.repo_id, &file_id, "a.md").unwrap();

    assert_eq!(fx.tree_paths(None), vec!["a.md"]);
}

#[test]
fn test_staged_add_then_delete_disappears() {
    let fx = Fixture::new();
    let ctx = fx.editor();

    let created = staging::create_file(&fx.store, &ctx, &fx.repo_id, "src/new.ts", b"hi", false).unwrap();
    assert!(matches!(created, StageOutcome::Staged(_)));
    assert_eq!(fx.tree_paths(None), vec!["src/new.ts"]);

    let deleted =
        staging::delete_file(&fx.store, &ctx, &fx.repo_id, &staged_id(&created)).unwrap();
    assert!(matches!(deleted, StageOutcome::Discarded(_)));

    assert!(fx.tree_paths(None).is_empty());
    assert!(fx.store.list_staged_changes(&fx.repo_id).unwrap().is_empty());
}

#[test]
fn test_deleted_file_masked_but_still_committed() {
    let fx = Fixture::new();
    let ctx = fx.editor();
    let file_id = fx.commit("src/gone.ts", "bye");
    fx.commit("src/kept.ts", "hi");

    staging::delete_file(&fx.store, &ctx, &fx.repo_id, &file_id).unwrap();

    assert_eq!(fx.tree_paths(None), vec!["src/kept.ts"]);
    assert!(fx.store.get_committed_file(&file_id).unwrap().is_some());
    assert!(matches!(
        staging::get_effective_file(&fx.store, &ctx, &fx.repo_id, &file_id),
        Err(Error::NotFound)
    ));
    assert!(matches!(
        staging::edit_file(&fx.store, &ctx, &fx.repo_id, &file_id, b"x", false),
        Err(Error::NotFound)
    ));
}

#[test]
fn test_resolution_is_idempotent() {
    let fx = Fixture::new();
    let ctx = fx.editor();
    let file_id = fx.commit("index.html", "<p>v0</p>");
    staging::edit_file(&fx.store, &ctx, &fx.repo_id, &file_id, b"<p>v1</p>", false).unwrap();

    let first = staging::get_effective_file(&fx.store, &ctx, &fx.repo_id, &file_id).unwrap();
    let second = staging::get_effective_file(&fx.store, &ctx, &fx.repo_id, &file_id).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_create_conflicts_with_committed_and_staged() {
    let fx = Fixture::new();
    let ctx = fx.editor();
    fx.commit("a.md", "A");

    assert!(matches!(
        staging::create_file(&fx.store, &ctx, &fx.repo_id, "a.md", b"x", false),
        Err(Error::Conflict(_))
    ));

    staging::create_file(&fx.store, &ctx, &fx.repo_id, "b.md", b"x", false).unwrap();
    assert!(matches!(
        staging::create_file(&fx.store, &ctx, &fx.repo_id, "/b.md", b"y", false),
        Err(Error::Conflict(_))
    ));
}

#[test]
fn test_rename_onto_taken_path_conflicts() {
    let fx = Fixture::new();
    let ctx = fx.editor();
    let a = fx.commit("a.md", "A");
    fx.commit("b.md", "B");

    assert!(matches!(
        staging::rename_file(&fx.store, &ctx, &fx.repo_id, &a, "b.md"),
        Err(Error::Conflict(_))
    ));
    assert!(matches!(
        staging::rename_file(&fx.store, &ctx, &fx.repo_id, &a, "a.md"),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        staging::rename_file(&fx.store, &ctx, &fx.repo_id, &a, "../escape.md"),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_rename_folder_respects_boundaries() {
    let fx = Fixture::new();
    for name in ["a.ts", "b.ts", "nested/c.ts"] {
        fx.commit(&format!("src/old/{name}"), name);
    }
    fx.commit("src/old2/x.ts", "x");

    let moved = staging::rename_folder(&fx.store, &fx.owner(), &fx.repo_id, "src/old", "src/new").unwrap();
    assert_eq!(moved, 3);

    assert_eq!(
        fx.tree_paths(None),
        vec![
            "src/new/a.ts",
            "src/new/b.ts",
            "src/new/nested/c.ts",
            "src/old2/x.ts"
        ]
    );
    assert_eq!(fx.tree_paths(Some("src/old2")), vec!["src/old2/x.ts"]);
}

#[test]
fn test_rename_folder_rules() {
    let fx = Fixture::new();
    let file_id = fx.commit("src/old/a.ts", "A");

    assert!(matches!(
        staging::rename_folder(&fx.store, &fx.editor(), &fx.repo_id, "src/old", "src/new"),
        Err(Error::AccessDenied)
    ));
    assert!(matches!(
        staging::rename_folder(&fx.store, &fx.owner(), &fx.repo_id, "src/old", "src/old/inner"),
        Err(Error::InvalidArgument(_))
    ));

    staging::edit_file(&fx.store, &fx.editor(), &fx.repo_id, &file_id, b"B", false).unwrap();
    assert!(matches!(
        staging::rename_folder(&fx.store, &fx.owner(), &fx.repo_id, "src/old", "src/new"),
        Err(Error::Conflict(_))
    ));
}

#[test]
fn test_rename_folder_refuses_staged_destination() {
    let fx = Fixture::new();
    let moved_id = fx.commit("x/a.ts", "X");
    let other_id = fx.commit("z/a.ts", "Z");

    staging::rename_file(&fx.store, &fx.editor(), &fx.repo_id, &moved_id, "y/a.ts").unwrap();
    assert!(matches!(
        staging::rename_folder(&fx.store, &fx.owner(), &fx.repo_id, "z", "y"),
        Err(Error::Conflict(_))
    ));

    // Both files keep their own identity and content.
    assert_eq!(fx.tree_paths(None), vec!["y/a.ts", "z/a.ts"]);
    let other = staging::get_effective_file(&fx.store, &fx.editor(), &fx.repo_id, &other_id).unwrap();
    assert_eq!(other.path, "z/a.ts");
    assert_eq!(other.content, b"Z");

    staging::edit_file(&fx.store, &fx.editor(), &fx.repo_id, &other_id, b"Z2", false).unwrap();
    let moved = staging::get_effective_file(&fx.store, &fx.editor(), &fx.repo_id, &moved_id).unwrap();
    assert_eq!(moved.content, b"X");
}

#[test]
fn test_role_requirements_per_operation() {
    let fx = Fixture::new();
    let file_id = fx.commit("a.md", "A");
    let viewer = fx.with_role(Role::Viewer);

    assert!(staging::get_effective_file(&fx.store, &viewer, &fx.repo_id, &file_id).is_ok());
    assert!(staging::list_staged_changes(&fx.store, &viewer, &fx.repo_id).is_ok());
    assert!(matches!(
        staging::edit_file(&fx.store, &viewer, &fx.repo_id, &file_id, b"x", false),
        Err(Error::AccessDenied)
    ));
    assert!(matches!(
        staging::create_file(&fx.store, &viewer, &fx.repo_id, "b.md", b"x", false),
        Err(Error::AccessDenied)
    ));

    // Denial happens before any lookup.
    assert!(matches!(
        staging::edit_file(&fx.store, &viewer, "no-such-repo", "no-such-file", b"x", false),
        Err(Error::AccessDenied)
    ));
    assert!(fx.store.list_staged_changes(&fx.repo_id).unwrap().is_empty());
}

#[test]
fn test_attribution_recorded() {
    let fx = Fixture::new();
    let file_id = fx.commit("a.md", "A");

    let staged = staging::edit_file(&fx.store, &fx.owner(), &fx.repo_id, &file_id, b"B", false).unwrap();
    assert_eq!(staged.change().created_by, "user:alice");

    let updated = staging::edit_file(&fx.store, &fx.editor(), &fx.repo_id, &file_id, b"C", false).unwrap();
    assert_eq!(updated.change().created_by, "user:alice");
    assert!(updated.change().updated_by.starts_with("token:"));
}

#[test]
fn test_discard_restores_committed_view() {
    let fx = Fixture::new();
    let ctx = fx.editor();
    let file_id = fx.commit("a.md", "A");

    let outcome = staging::edit_file(&fx.store, &ctx, &fx.repo_id, &file_id, b"B", false).unwrap();
    staging::discard_staged_change(&fx.store, &ctx, &fx.repo_id, &staged_id(&outcome)).unwrap();

    let file = staging::get_effective_file(&fx.store, &ctx, &fx.repo_id, &file_id).unwrap();
    assert_eq!(file.content, b"A");
    assert_eq!(file.state, FileState::Committed);
    assert!(matches!(
        staging::discard_staged_change(&fx.store, &ctx, &fx.repo_id, &staged_id(&outcome)),
        Err(Error::NotFound)
    ));
}

#[test]
fn test_other_project_repository_is_hidden() {
    let fx = Fixture::new();
    let file_id = fx.commit("a.md", "A");

    let other = projects::create_project(&fx.store, &fx.generator, "bob", "Other", Role::Editor).unwrap();
    let bob = AccessContext::new(&other.project.id).with_identity("bob");

    assert!(matches!(
        staging::get_effective_file(&fx.store, &bob, &fx.repo_id, &file_id),
        Err(Error::NotFound)
    ));
    assert!(matches!(
        staging::list_effective_tree(&fx.store, &bob, &fx.repo_id, None),
        Err(Error::NotFound)
    ));
}

#[test]
fn test_binary_content_round_trip() {
    let fx = Fixture::new();
    let ctx = fx.editor();
    let bytes = [0x89, 0x50, 0x4e, 0x47, 0x00, 0xff];

    let outcome = staging::create_file(&fx.store, &ctx, &fx.repo_id, "img/logo.png", &bytes, true).unwrap();
    let file = staging::get_effective_file(&fx.store, &ctx, &fx.repo_id, &staged_id(&outcome)).unwrap();
    assert!(file.is_binary);
    assert_eq!(file.content, bytes);

    let tree = staging::list_effective_tree(&fx.store, &ctx, &fx.repo_id, Some("img")).unwrap();
    assert_eq!(tree.len(), 1);
    assert!(tree[0].is_binary);
    assert_eq!(tree[0].size, bytes.len());
    assert_eq!(tree[0].content_ref, staging::content_ref(&bytes));
}

#[test]
fn test_delete_project_cascades() {
    let fx = Fixture::new();
    let file_id = fx.commit("a.md", "A");
    staging::edit_file(&fx.store, &fx.editor(), &fx.repo_id, &file_id, b"B", false).unwrap();

    assert!(matches!(
        projects::delete_project(&fx.store, &fx.editor()),
        Err(Error::AccessDenied)
    ));
    projects::delete_project(&fx.store, &fx.owner()).unwrap();

    assert!(fx.store.get_repository(&fx.repo_id).unwrap().is_none());
    assert!(fx.store.get_committed_file(&file_id).unwrap().is_none());
    assert!(fx.store.list_staged_changes(&fx.repo_id).unwrap().is_empty());
    assert!(matches!(
        projects::get_project(&fx.store, &fx.owner()),
        Err(Error::AccessDenied)
    ));
}

//! # Atelier
//!
//! Access control and file staging core for a collaborative project-authoring server,
//! usable both as a standalone binary and as a library.
//!
//! Every operation takes the store and an explicit [`auth::AccessContext`] describing
//! the caller. The context is resolved to a role for one project, checked against the
//! operation's minimum, and only then is project data read or written.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use atelier::auth::AccessContext;
//! use atelier::staging;
//! use atelier::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/atelier.db")?;
//! store.initialize()?;
//!
//! let ctx = AccessContext::new(project_id).with_token(raw_token);
//! let tree = staging::list_effective_tree(&store, &ctx, &repo_id, Some("src"))?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `atelier` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod projects;
pub mod server;
pub mod staging;
pub mod store;
pub mod types;

mod models;
mod role;
mod validation;

pub use models::*;
pub use role::Role;
pub use validation::{validate_project_name, validate_repo_name, validate_token_label};

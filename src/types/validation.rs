use crate::error::{Error, Result};

const MAX_PROJECT_NAME_LEN: usize = 100;
const MAX_REPO_NAME_LEN: usize = 100;
const MAX_TOKEN_LABEL_LEN: usize = 200;

fn is_valid_name_char(c: char, allow_period: bool) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || (allow_period && c == '.')
}

fn validate_name(
    name: &str,
    entity: &str,
    max_len: usize,
    allow_period: bool,
    forbid_leading_special: bool,
) -> Result<()> {
    let invalid = |message: String| Err(Error::InvalidArgument(message));

    if name.is_empty() {
        return invalid(format!("{entity} name cannot be empty"));
    }
    if name.len() > max_len {
        return invalid(format!("{entity} name cannot exceed {max_len} characters"));
    }
    if !name.chars().all(|c| is_valid_name_char(c, allow_period)) {
        let mut allowed = "alphanumeric characters, hyphens, and underscores".to_string();
        if allow_period {
            allowed.push_str(", and periods");
        }
        return invalid(format!("{entity} name can only contain {allowed}"));
    }
    if forbid_leading_special && (name.starts_with('-') || name.starts_with('_')) {
        return invalid(format!(
            "{entity} name cannot start with a hyphen or underscore"
        ));
    }
    Ok(())
}

/// Project names are display names: any printable text, trimmed, bounded.
pub fn validate_project_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument(
            "Project name cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_PROJECT_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "Project name cannot exceed {MAX_PROJECT_NAME_LEN} characters"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(Error::InvalidArgument(
            "Project name cannot contain control characters".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_repo_name(name: &str) -> Result<()> {
    validate_name(name, "Repository", MAX_REPO_NAME_LEN, true, true)
}

pub fn validate_token_label(label: &str) -> Result<()> {
    if label.chars().count() > MAX_TOKEN_LABEL_LEN {
        return Err(Error::InvalidArgument(format!(
            "Token label cannot exceed {MAX_TOKEN_LABEL_LEN} characters"
        )));
    }
    Ok(())
}

use crate::error::{Error, Result};

const MAX_SEGMENT_LEN: usize = 255;
const MAX_PATH_LEN: usize = 4096;

/// Normalizes a repository file path to `a/b/c` form.
/// Leading, trailing and repeated slashes are collapsed; `.` and `..` segments are rejected.
pub fn normalize_path(path: &str) -> Result<String> {
    let path = path.trim();

    if path.is_empty() {
        return Err(Error::InvalidArgument("path cannot be empty".to_string()));
    }

    if path.len() > MAX_PATH_LEN {
        return Err(Error::InvalidArgument(format!(
            "path cannot exceed {MAX_PATH_LEN} characters"
        )));
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return Err(Error::InvalidArgument("path cannot be empty".to_string()));
    }

    for segment in &segments {
        validate_segment(segment)?;
    }

    Ok(segments.join("/"))
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(Error::InvalidArgument(format!(
            "path segment cannot exceed {MAX_SEGMENT_LEN} characters"
        )));
    }

    if segment == "." || segment == ".." {
        return Err(Error::InvalidArgument(
            "path cannot contain '.' or '..' segments".to_string(),
        ));
    }

    const INVALID_CHARS: &[char] = &['\0', '\n', '\r', '\\'];
    if segment.chars().any(|c| INVALID_CHARS.contains(&c)) {
        return Err(Error::InvalidArgument(
            "path segment contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

/// Returns true if `path` is `prefix` itself or lies beneath it.
/// Both arguments must already be normalized.
#[must_use]
pub fn is_within(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Rewrites `path` from under `old_prefix` to under `new_prefix`.
/// Returns None if `path` is not within `old_prefix`.
#[must_use]
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if !is_within(path, old_prefix) {
        return None;
    }
    Some(format!("{new_prefix}{}", &path[old_prefix.len()..]))
}

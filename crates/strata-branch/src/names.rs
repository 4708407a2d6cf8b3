//! Branch name validation.
//!
//! Valid branch names:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `@` (reserved for `path@timestamp` references)
//! - Must not contain `/` (the path separator)
//! - Must not contain `..`
//! - Must not start or end with `.`
//!
//! A branch path is `MAIN` followed by zero or more valid names joined by `/`.

use crate::error::{BranchError, Result};
use crate::types::{MAIN, PATH_SEPARATOR};

/// Characters that are forbidden anywhere in a branch name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\', '@'];

fn invalid(name: &str, reason: impl Into<String>) -> BranchError {
    BranchError::InvalidBranchName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a single branch name (one path component).
///
/// # Examples
///
/// ```
/// use strata_branch::names::validate_branch_name;
///
/// assert!(validate_branch_name("feature-a").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("a@1").is_err());
/// assert!(validate_branch_name("a/b").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "branch name must not be empty"));
    }

    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }

    if name.contains(PATH_SEPARATOR) {
        return Err(invalid(name, "must not contain the path separator '/'"));
    }

    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }

    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid(name, "must not start or end with '.'"));
    }

    Ok(())
}

/// Validate a full branch path such as `MAIN/a/b`.
pub fn validate_branch_path(path: &str) -> Result<()> {
    let mut components = path.split(PATH_SEPARATOR);
    if components.next() != Some(MAIN) {
        return Err(invalid(path, format!("branch path must start with {MAIN}")));
    }
    for component in components {
        validate_branch_name(component).map_err(|_| invalid(path, format!("invalid component {component:?}")))?;
    }
    Ok(())
}

//! Input validation utilities.
//!
//! Values that end up in file paths are checked here before use.

use crate::{CoreError, CoreResult};

/// Validates that a patient list name is safe to use as a file stem.
///
/// List names come from the credentials file and from `<list>.csv` file names.
/// They are joined onto the records directory, so this rejects anything that
/// could escape it:
/// - empty or whitespace-only names
/// - names longer than 64 characters
/// - characters outside ASCII alphanumerics, `-` and `_`
pub fn validate_list_name(name: &str) -> CoreResult<()> {
    const MAX_LIST_NAME_LEN: usize = 64;

    if name.trim().is_empty() {
        return Err(CoreError::InvalidInput("list name cannot be empty".into()));
    }

    if name.len() > MAX_LIST_NAME_LEN {
        return Err(CoreError::InvalidInput(format!(
            "list name exceeds maximum length of {} characters",
            MAX_LIST_NAME_LEN
        )));
    }

    let ok = name
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_'));

    if !ok {
        return Err(CoreError::InvalidInput(
            "list name contains invalid characters (only alphanumeric, '-', '_' allowed)".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        for name in ["clinic-a", "list_2", "Ward7"] {
            assert!(validate_list_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_path_like_names() {
        let long = "x".repeat(65);
        for name in ["", "  ", "../users", "a/b", "a.csv", long.as_str()] {
            assert!(validate_list_name(name).is_err(), "{name}");
        }
    }
}

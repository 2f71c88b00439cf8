//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest stored vote comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 500;

/// Rejects strings made only of whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a join code only holds ASCII letters and digits.
///
/// Case is not checked; codes are upper-cased before lookup.
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("Join code must contain only letters and digits".into());
        return Err(err);
    }
    Ok(())
}

/// Cut a comment down to [`MAX_COMMENT_CHARS`] characters.
pub fn truncate_comment(comment: String) -> String {
    match comment.char_indices().nth(MAX_COMMENT_CHARS) {
        Some((cut, _)) => comment[..cut].to_owned(),
        None => comment,
    }
}

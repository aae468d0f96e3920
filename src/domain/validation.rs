use crate::domain::error::DomainError;

pub const MAX_COMMENT_CHARS: usize = 2000;
pub const MAX_POST_TITLE_CHARS: usize = 200;
pub const MAX_POST_TEXT_CHARS: usize = 20_000;

/// Any non-empty text is a comment, whitespace included.
pub fn validate_comment_text(text: &str) -> Result<(), DomainError> {
    if text.is_empty() {
        return Err(DomainError::validation("comment text must not be empty"));
    }
    validate_max_length("comment text", text, MAX_COMMENT_CHARS)
}

/// Posts additionally need a title and body that are not blank.
pub fn validate_post_content(title: &str, text: &str) -> Result<(), DomainError> {
    validate_not_blank("post title", title)?;
    validate_max_length("post title", title, MAX_POST_TITLE_CHARS)?;
    validate_not_blank("post text", text)?;
    validate_max_length("post text", text, MAX_POST_TEXT_CHARS)
}

fn validate_not_blank(field: &'static str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_max_length(field: &'static str, value: &str, max: usize) -> Result<(), DomainError> {
    let length = value.chars().count();
    if length > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters, got {length}"
        )));
    }

    Ok(())
}

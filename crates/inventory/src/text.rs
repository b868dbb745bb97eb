//! Free-text input cleaning for names and reasons.

use loomledger_core::{DomainError, DomainResult};

/// Longest free-text value kept on items and log entries.
pub const MAX_TEXT_LEN: usize = 256;

/// Strip control characters and angle brackets, trim, and cap the length.
pub fn sanitize(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_control() && *c != '<' && *c != '>')
        .collect();
    cleaned.trim().chars().take(MAX_TEXT_LEN).collect()
}

/// Like [`sanitize`] but rejects values that end up empty.
pub fn required(field: &str, input: &str) -> DomainResult<String> {
    let value = sanitize(input);
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_and_control_characters() {
        assert_eq!(sanitize("  <b>cotton</b>\u{7}\n"), "bcotton/b");
    }

    #[test]
    fn caps_length() {
        let long = "x".repeat(MAX_TEXT_LEN + 50);
        assert_eq!(sanitize(&long).len(), MAX_TEXT_LEN);
    }

    #[test]
    fn required_rejects_blank_after_cleaning() {
        assert!(matches!(required("reason", " <> "), Err(DomainError::Validation(_))));
        assert_eq!(required("reason", "restock").unwrap(), "restock");
    }
}

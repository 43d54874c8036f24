//! Internal helpers for name normalization and input validation.
//!
//! These utilities are **not** part of the public API. Categories, merchants
//! and tags are unique per family by their normalized key, and AI suggestions
//! are mapped back onto existing records through the same key.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{EngineError, ResultEngine};

const MAX_NAME_LEN: usize = 128;

/// Collapse inner whitespace and trim. Rejects empty and overlong names.
pub(crate) fn normalize_display(input: &str, label: &str) -> ResultEngine<String> {
    let out = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if out.is_empty() {
        return Err(EngineError::InvalidName(format!(
            "{label} name must not be empty"
        )));
    }
    if out.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::InvalidName(format!(
            "{label} name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(out)
}

/// Lookup key: NFKD, combining marks stripped, lowercase, punctuation folded
/// into single spaces.
///
/// Returns `None` when nothing alphanumeric is left.
pub(crate) fn normalize_key(input: &str) -> Option<String> {
    let mut out = String::new();
    let mut prev_space = false;
    for ch in input.trim().nfkd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            prev_space = false;
        } else if !out.is_empty() && !prev_space {
            out.push(' ');
            prev_space = true;
        }
    }
    let normalized = out.trim_end();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}

/// Case-folded form used for case-insensitive matching. SQLite's `LOWER` and
/// `LIKE` only fold ASCII, so names are matched against this stored copy.
pub(crate) fn fold_case(input: &str) -> String {
    input.nfc().collect::<String>().to_lowercase()
}

pub(crate) fn require_key(input: &str, label: &str) -> ResultEngine<String> {
    normalize_key(input)
        .ok_or_else(|| EngineError::InvalidName(format!("{label} name must contain letters or digits")))
}

/// Escape `LIKE` wildcards so user input only ever matches literally.
///
/// Pair with `ESCAPE '\'`.
pub(crate) fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_folds_case_accents_and_punctuation() {
        assert_eq!(normalize_key("  Café--Bar ").as_deref(), Some("cafe bar"));
        assert_eq!(normalize_key("AMAZON.COM*MKTP").as_deref(), Some("amazon com mktp"));
        assert_eq!(normalize_key(" -- "), None);
    }

    #[test]
    fn fold_case_handles_accented_capitals() {
        assert_eq!(fold_case("CAFÉ NERO"), "café nero");
        assert_eq!(fold_case("CAFE\u{301}"), "café");
    }

    #[test]
    fn display_collapses_whitespace() {
        assert_eq!(normalize_display("  Eating   out ", "category").unwrap(), "Eating out");
        assert!(normalize_display("   ", "category").is_err());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("Amazon"), "Amazon");
    }
}

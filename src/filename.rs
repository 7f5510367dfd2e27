//! Sheet name validation.

/// Name reserved for the scratch sheet that is never persisted by a paid save.
pub const DEFAULT_FILE: &str = "default";
/// Placeholder name offered by fresh sheets.
pub const UNTITLED_FILE: &str = "Untitled";
/// Longest accepted sheet name, in characters.
pub const MAX_NAME_LEN: usize = 30;

/// Strips leading and trailing whitespace and byte order marks (U+FEFF).
pub fn trim_name(name: &str) -> &str {
    name.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
}

/// Returns `true` when `name` may be used for a saved sheet.
///
/// The name goes through [`trim_name`] first. Reserved names, empty names,
/// names longer than [`MAX_NAME_LEN`], and anything outside ASCII letters,
/// digits, `-` and space are rejected.
pub fn validate_name(name: &str) -> bool {
    let name = trim_name(name);
    if name == DEFAULT_FILE || name == UNTITLED_FILE {
        return false;
    }
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ' ')
}

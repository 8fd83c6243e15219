//! Value normalization for spreadsheet cells and run labels.

use std::sync::OnceLock;

use regex::Regex;

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Collapse internal whitespace and trim. Never fails; empty-ish input
/// yields an empty string.
pub fn norm_space(value: &str) -> String {
    ws_re().replace_all(value.trim(), " ").into_owned()
}

/// True when a cell has content beyond whitespace.
pub fn is_nonempty(value: &str) -> bool {
    !norm_space(value).is_empty()
}

/// Keep only the digits of telephone input.
pub fn norm_phone(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Extract the first float-compatible token, treating commas as decimal
/// separators. Returns an empty string when no number is present.
pub fn norm_float(value: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap());
    let text = norm_space(value).replace(',', ".");
    re.find(&text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Slug a run label down to `[A-Za-z0-9_-]`, or fall back when nothing
/// survives.
pub fn sanitize_label(candidate: &str, fallback: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());
    let slug = re.replace_all(candidate, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug.to_string()
    }
}

/// Clean a spreadsheet header: first line only, trimmed, whitespace to
/// underscores, lowercased.
pub fn clean_column_name(raw: &str) -> String {
    let first_line = raw.lines().next().unwrap_or("");
    let collapsed = ws_re().replace_all(first_line.trim(), "_");
    collapsed.trim_matches('_').to_lowercase()
}

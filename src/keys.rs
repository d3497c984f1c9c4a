//! Canonical path segments for school years and terms.
//!
//! Both functions are total: input that cannot be interpreted degrades to a
//! best-effort string instead of an error.

pub const FULL_YEAR_TERM: &str = "full_year";

/// `"2025"` -> `"SY-2025-2026"`, `"2025-2026"` -> `"SY-2025-2026"`.
/// Already-prefixed labels are returned unchanged. Anything that is neither a
/// range nor an integer is passed through as-is.
pub fn normalize_school_year(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if raw.starts_with("SY-") {
        return raw.to_string();
    }
    if raw.contains('-') {
        return format!("SY-{raw}");
    }
    match raw.parse::<i64>() {
        Ok(start) => match start.checked_add(1) {
            Some(end) => format!("SY-{start}-{end}"),
            None => raw.to_string(),
        },
        Err(_) => raw.to_string(),
    }
}

/// Free-text term name -> path segment. Empty input yields `""`; callers that
/// need a segment use [`term_key_or_default`].
pub fn normalize_term_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(trimmed.len());
    let mut in_ws = false;
    for ch in trimmed.chars() {
        if ch.is_whitespace() {
            if !in_ws {
                out.push('_');
            }
            in_ws = true;
            continue;
        }
        in_ws = false;
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            out.push(ch);
        }
    }
    out
}

pub fn term_key_or_default(raw: Option<&str>) -> String {
    let key = normalize_term_key(raw.unwrap_or(""));
    if key.is_empty() {
        FULL_YEAR_TERM.to_string()
    } else {
        key
    }
}

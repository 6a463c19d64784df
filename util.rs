//! Small helpers shared by more than one module.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, used for `indexes_meta.created_at_millis` (SPEC_FULL.md
/// §3). Never used for correctness-sensitive logic — purely an operational timestamp.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Sanitizes a full type name into a form valid as an SQL identifier: keeps ASCII alphanumerics
/// and underscores, replaces everything else (notably `::`, `<`, `>` in Rust's `type_name` output)
/// with `_`, and collapses runs of `_` (spec §4.B's `safe_type_name`).
pub fn sanitize_type_name(full_type_name: &str) -> String {
    let mut out = String::with_capacity(full_type_name.len());
    let mut last_was_sep = false;
    for c in full_type_name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "t".to_string()
    } else if trimmed.chars().next().unwrap().is_ascii_digit() {
        format!("t_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_generic_type_names() {
        let sanitized = sanitize_type_name("my_crate::models::Widget<u32>");
        assert!(sanitized.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert!(!sanitized.chars().next().unwrap().is_ascii_digit());
    }
}

//! Worksheet-name hygiene for generated sheets.
//!
//! Workbook formats cap sheet names at 31 characters, forbid
//! `: \ / ? * [ ]`, and treat names case-insensitively.

use std::collections::BTreeSet;

pub const MAX_SHEET_NAME_LEN: usize = 31;

const FORBIDDEN: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Replace forbidden characters with `_`, trim surrounding whitespace and
/// enforce the length cap. An all-invalid input degrades to `Sheet`.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        return "Sheet".to_string();
    }
    truncate_chars(&cleaned, MAX_SHEET_NAME_LEN)
}

/// Make `desired` unique against `taken` (lowercased names) by appending
/// `(2)`, `(3)`, ... while staying inside the length cap. The chosen name is
/// recorded into `taken` before returning.
pub fn unique_sheet_name(desired: &str, taken: &mut BTreeSet<String>) -> String {
    let base = sanitize_sheet_name(desired);
    if taken.insert(base.to_lowercase()) {
        return base;
    }
    for n in 2u32.. {
        let suffix = format!("({n})");
        let room = MAX_SHEET_NAME_LEN - suffix.chars().count();
        let candidate = format!("{}{suffix}", truncate_chars(&base, room));
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
    }
    unreachable!("suffix counter exhausted")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_forbidden_characters() {
        assert_eq!(sanitize_sheet_name("a/b:c"), "a_b_c");
        assert_eq!(sanitize_sheet_name("  report  "), "report");
        assert_eq!(sanitize_sheet_name("???"), "___");
        assert_eq!(sanitize_sheet_name(""), "Sheet");
    }

    #[test]
    fn caps_length_at_31_chars() {
        let long = "x".repeat(40);
        assert_eq!(sanitize_sheet_name(&long).chars().count(), 31);
    }

    #[test]
    fn uniquifies_case_insensitively() {
        let mut taken = BTreeSet::new();
        assert_eq!(unique_sheet_name("Data", &mut taken), "Data");
        assert_eq!(unique_sheet_name("data", &mut taken), "data(2)");
        assert_eq!(unique_sheet_name("DATA", &mut taken), "DATA(3)");
    }

    #[test]
    fn suffix_respects_length_cap() {
        let mut taken = BTreeSet::new();
        let long = "y".repeat(31);
        assert_eq!(unique_sheet_name(&long, &mut taken), long);
        let second = unique_sheet_name(&long, &mut taken);
        assert_eq!(second.chars().count(), 31);
        assert!(second.ends_with("(2)"));
    }
}

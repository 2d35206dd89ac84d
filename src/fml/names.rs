//! Name Resolution
//!
//! FML identifiers: variable aliases, group names and rule labels.
//!
//! Labels are per-action counters: the first `copy` rule is labelled
//! `copy`, the next ones `copy_1`, `copy_2`, ... A label already handed
//! out under another base (a group named `copy_1`) is skipped, so every
//! label in one compile pass is unique.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

// =============================================================================
// Labels
// =============================================================================

/// Hands out unique rule labels within one compile pass
#[derive(Debug, Default)]
pub struct LabelCounter {
    used: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl LabelCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next label for `base`, skipping any label already handed out
    pub fn next(&mut self, base: &str) -> String {
        let count = self.used.entry(base.to_string()).or_insert(0);
        loop {
            let label = if *count == 0 {
                base.to_string()
            } else {
                format!("{}_{}", base, count)
            };
            *count += 1;
            if self.issued.insert(label.clone()) {
                return label;
            }
        }
    }
}

// =============================================================================
// Identifiers
// =============================================================================

fn invalid_chars() -> &'static Regex {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    INVALID.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]+").expect("static pattern"))
}

/// Make `raw` a valid FML identifier: `[A-Za-z_][A-Za-z0-9_]*`
pub fn sanitize_identifier(raw: &str) -> String {
    let mut ident = invalid_chars().replace_all(raw.trim(), "_").into_owned();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

/// Convert a type name to snake_case (`CodeableConcept` -> `codeable_concept`)
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;

    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c == '-' || c == ' ' || c == '.' {
            result.push('_');
            prev_lower = false;
        } else {
            result.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }

    result
}

/// Alias given to a node the editor left unnamed: `Patient`, 0 -> `patient_0`
pub fn default_alias(resource: &str, index: usize) -> String {
    sanitize_identifier(&format!("{}_{}", to_snake_case(resource), index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_counter() {
        let mut labels = LabelCounter::new();
        assert_eq!(labels.next("copy"), "copy");
        assert_eq!(labels.next("create"), "create");
        assert_eq!(labels.next("copy"), "copy_1");
        assert_eq!(labels.next("copy"), "copy_2");
    }

    #[test]
    fn test_labels_never_repeat_across_bases() {
        let mut labels = LabelCounter::new();
        assert_eq!(labels.next("copy_1"), "copy_1");
        assert_eq!(labels.next("copy"), "copy");
        assert_eq!(labels.next("copy"), "copy_2");
        assert_eq!(labels.next("copy_1"), "copy_1_1");
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("patient_0"), "patient_0");
        assert_eq!(sanitize_identifier("my-group name"), "my_group_name");
        assert_eq!(sanitize_identifier("1st"), "_1st");
        assert_eq!(sanitize_identifier(""), "_");
    }

    #[test]
    fn test_default_alias() {
        assert_eq!(default_alias("Patient", 0), "patient_0");
        assert_eq!(default_alias("CodeableConcept", 2), "codeable_concept_2");
    }
}

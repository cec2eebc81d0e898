use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Prefix every ticket reference starts with.
pub const REFERENCE_PREFIX: &str = "OPD-";

static REFERENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)OPD-\s*[0-9]+").expect("reference pattern is valid"));

/// Pull every `OPD-<digits>` reference out of free-form pasted text.
///
/// Matching is case-insensitive and tolerates whitespace between the dash
/// and the digits. Only ASCII digits count. Each match is upper-cased with its whitespace removed, so
/// `opd- 0412` becomes `OPD-0412`. Duplicates are dropped, keeping the
/// position of the first occurrence.
pub fn extract_references(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut references = Vec::new();

    for found in REFERENCE_PATTERN.find_iter(text) {
        let normalized: String = found
            .as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        if seen.insert(normalized.clone()) {
            references.push(normalized);
        }
    }

    references
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_one_per_line() {
        let refs = extract_references("OPD-0412768\nOPD-0412869\nOPD-0413086\n");
        assert_eq!(refs, vec!["OPD-0412768", "OPD-0412869", "OPD-0413086"]);
    }

    #[test]
    fn test_ignores_quotes_and_commas() {
        let refs = extract_references(r#""OPD-0412768", 'OPD-0412869';(OPD-0413086)"#);
        assert_eq!(refs, vec!["OPD-0412768", "OPD-0412869", "OPD-0413086"]);
    }

    #[test]
    fn test_normalizes_case_and_inner_whitespace() {
        let refs = extract_references("opd-0412768 and Opd- 0412869 and OPD-\t77");
        assert_eq!(refs, vec!["OPD-0412768", "OPD-0412869", "OPD-77"]);
    }

    #[test]
    fn test_dedups_in_first_seen_order() {
        let refs = extract_references("OPD-2, OPD-1, opd-2, OPD-3, OPD-1");
        assert_eq!(refs, vec!["OPD-2", "OPD-1", "OPD-3"]);
    }

    #[test]
    fn test_leading_zeros_are_significant() {
        let refs = extract_references("OPD-012 OPD-12");
        assert_eq!(refs, vec!["OPD-012", "OPD-12"]);
    }

    #[test]
    fn test_rejects_prefix_without_digits() {
        assert!(extract_references("OPD- , OPD-abc, OPD").is_empty());
        assert!(extract_references("").is_empty());
    }

    #[test]
    fn test_embedded_in_longer_tokens() {
        // Matches are not anchored to word boundaries.
        let refs = extract_references("XOPD-55Y");
        assert_eq!(refs, vec!["OPD-55"]);
    }

    #[test]
    fn test_only_ascii_digits() {
        let refs = extract_references("OPD-\u{09e6}\u{09ea}\u{09e7}\u{09e8} OPD-12\u{ff13}");
        assert_eq!(refs, vec!["OPD-12"]);
    }
}

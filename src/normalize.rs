//! Name normalization for player matching.
//!
//! Two derived forms feed the resolver:
//! - a compact key (`normalize_name`) for exact and alias lookup, and
//! - a token list (`tokenize`) for word-overlap fuzzy comparison.
//!
//! Both are total and deterministic. Empty or whitespace-only input yields
//! an empty result; callers must refuse to look up an empty key.

use unicode_normalization::UnicodeNormalization;

/// Canonical comparison key: NFKC fold, lowercase, everything outside
/// `[a-z0-9]` dropped. Whitespace is removed entirely so "A.J. Brown" and
/// "AJ Brown" collapse to the same token (`ajbrown`).
///
/// Idempotent: `normalize_name(normalize_name(s)) == normalize_name(s)`.
pub fn normalize_name(s: &str) -> String {
    let folded: String = s.nfkc().collect();
    folded
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Lowercased word tokens for fuzzy set comparison. Punctuation acts as a
/// word boundary, so "J. Smith" tokenizes to `["j", "smith"]`.
pub fn tokenize(s: &str) -> Vec<String> {
    let folded: String = s.nfkc().collect();
    let spaced: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.chars().filter(|c| c.is_ascii_alphanumeric()).collect())
        .filter(|t: &String| !t.is_empty())
        .collect()
}

//! Token-overlap similarity for player names.
//!
//! Deliberately coarse: the score classes below are contract, not tuning.
//! Downstream thresholds (acceptance floor, ambiguity gap) are calibrated
//! against exactly these classes, so this must stay a reproducible
//! heuristic rather than an edit-distance metric.

use std::collections::HashSet;

use crate::normalize::{normalize_name, tokenize};

/// Score two free-text names in `[0, 1]`.
///
/// - `1.0` when the compact normalized forms are equal;
/// - `0.8`, flat, when one compact form contains the other;
/// - otherwise `|shared words| / max(|words a|, |words b|)` over the
///   tokenized word sets.
///
/// Either side normalizing to empty scores `0.0`; empty never matches.
pub fn similarity(a: &str, b: &str) -> f64 {
    let compact_a = normalize_name(a);
    let compact_b = normalize_name(b);
    if compact_a.is_empty() || compact_b.is_empty() {
        return 0.0;
    }
    if compact_a == compact_b {
        return 1.0;
    }
    if compact_a.contains(&compact_b) || compact_b.contains(&compact_a) {
        return 0.8;
    }

    let tokens_a: HashSet<String> = tokenize(a).into_iter().collect();
    let tokens_b: HashSet<String> = tokenize(b).into_iter().collect();
    let shared = tokens_a.intersection(&tokens_b).count();
    shared as f64 / tokens_a.len().max(tokens_b.len()) as f64
}

//! Cheap lexical prompt similarity.

use std::collections::HashSet;

/// Threshold used by callers that have no better value.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Whether two prompts are close enough to share a cached answer.
///
/// Comparison is case-insensitive on trimmed text. One prompt containing the
/// other counts as similar; otherwise the Jaccard index of the whitespace
/// separated word sets must reach `threshold`.
pub fn is_similar_prompt(a: &str, b: &str, threshold: f64) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.contains(&b) || b.contains(&a) {
        return true;
    }
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    if left.is_empty() || right.is_empty() {
        return false;
    }
    let shared = left.intersection(&right).count();
    let total = left.union(&right).count();
    shared as f64 / total as f64 >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_is_similar() {
        assert!(is_similar_prompt(
            "What is Rust?",
            "  what is rust? explain briefly",
            0.99
        ));
    }

    #[test]
    fn jaccard_threshold() {
        // 4 shared of 5 distinct words
        let a = "the quick brown fox";
        let b = "brown the quick fox jumps";
        assert!(is_similar_prompt(a, b, 0.8));
        let c = "the quick red fox";
        // {the, quick, fox} / {the, quick, brown, red, fox}
        assert!(!is_similar_prompt(a, c, 0.8));
        assert!(is_similar_prompt(a, c, 0.6));
    }

    #[test]
    fn empty_prompt_matches_by_substring_only() {
        assert!(is_similar_prompt("", "anything", DEFAULT_SIMILARITY_THRESHOLD));
        assert!(!is_similar_prompt("alpha beta", "gamma delta", 0.1));
    }
}

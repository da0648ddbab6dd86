//! Exact-hash and Jaccard-keyword deduplication over normalized idea strings.
//!
//! Ported from `NoveltyFilter` (madspark/utils/novelty_filter.py): the hash
//! pass catches byte-identical ideas (after normalization) cheaply; the
//! keyword-Jaccard pass catches near-duplicates phrased differently.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::state::IdeaText;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
    "would", "should", "could", "can", "may", "might", "this", "that", "these", "those",
];

/// Result of filtering one idea against everything accepted so far.
#[derive(Debug, Clone)]
pub struct NoveltyCheck {
    pub is_novel: bool,
    pub similarity_score: f64,
    pub similar_to: String,
}

struct Accepted {
    text: String,
    keywords: HashSet<String>,
}

/// Stateful filter. One instance per Run.
pub struct NoveltyFilter {
    threshold: f64,
    seen_hashes: HashSet<[u8; 16]>,
    accepted: Vec<Accepted>,
}

impl NoveltyFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold: threshold.clamp(0.0, 1.0), seen_hashes: HashSet::new(), accepted: Vec::new() }
    }

    pub fn reset(&mut self) {
        self.seen_hashes.clear();
        self.accepted.clear();
    }

    fn keywords_of(normalized: &str) -> HashSet<String> {
        normalized
            .split_whitespace()
            .map(str::to_string)
            .filter(|w| !STOP_WORDS.contains(&w.as_str()))
            .collect()
    }

    fn fingerprint(normalized: &str) -> [u8; 16] {
        let digest = Sha256::digest(normalized.as_bytes());
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        out
    }

    fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let intersection = a.intersection(b).count();
        let union = a.union(b).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }

    /// Filters one idea; accepted ideas are remembered for subsequent calls.
    pub fn filter(&mut self, idea: &IdeaText) -> NoveltyCheck {
        if idea.is_empty() {
            return NoveltyCheck {
                is_novel: false,
                similarity_score: 1.0,
                similar_to: "Empty".to_string(),
            };
        }

        let normalized = idea.normalized();
        let fingerprint = Self::fingerprint(normalized);
        if self.seen_hashes.contains(&fingerprint) {
            return NoveltyCheck {
                is_novel: false,
                similarity_score: 1.0,
                similar_to: "exact duplicate".to_string(),
            };
        }

        let keywords = Self::keywords_of(normalized);
        // No prior accepted ideas to compare against: nothing to be similar
        // to, so this one is always novel, even at threshold 0.0.
        let mut max_similarity = f64::NEG_INFINITY;
        let mut similar_to = String::new();
        for existing in &self.accepted {
            let similarity = Self::jaccard(&keywords, &existing.keywords);
            if similarity > max_similarity {
                max_similarity = similarity;
                similar_to = existing.text.clone();
            }
        }

        self.seen_hashes.insert(fingerprint);
        let is_novel = self.accepted.is_empty() || max_similarity < self.threshold;
        if is_novel {
            self.accepted.push(Accepted { text: idea.display().to_string(), keywords });
            NoveltyCheck { is_novel: true, similarity_score: max_similarity.max(0.0), similar_to: String::new() }
        } else {
            NoveltyCheck { is_novel: false, similarity_score: max_similarity, similar_to }
        }
    }

    /// Filters a list in order, preserving the order of survivors (spec.md §3
    /// invariant 3).
    pub fn filter_all(&mut self, ideas: &[IdeaText]) -> Vec<IdeaText> {
        ideas
            .iter()
            .filter(|idea| self.filter(idea).is_novel)
            .cloned()
            .collect()
    }
}

/// Jaccard similarity between two arbitrary texts (word-split, lowercased),
/// used outside the novelty filter for `isMeaningfulImprovement` (spec.md
/// §4.10/§8). Ported from `calculate_jaccard_similarity`.
pub fn jaccard_similarity(text1: &str, text2: &str) -> f64 {
    if text1.trim().is_empty() || text2.trim().is_empty() {
        return 0.0;
    }
    let words1: HashSet<String> = text1.to_lowercase().split_whitespace().map(str::to_string).collect();
    let words2: HashSet<String> = text2.to_lowercase().split_whitespace().map(str::to_string).collect();
    if words1.is_empty() || words2.is_empty() {
        return 0.0;
    }
    let intersection = words1.intersection(&words2).count();
    let union = words1.union(&words2).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// `isMeaningfulImprovement = NOT(similarity > 0.9 AND |scoreDelta| < 0.3)`.
pub fn is_meaningful_improvement(original: &str, improved: &str, score_delta: f64) -> (bool, f64) {
    if original.trim().is_empty() || improved.trim().is_empty() {
        return (true, 0.0);
    }
    let similarity = jaccard_similarity(original, improved);
    let minimal_change = score_delta.abs() < 0.3;
    (!(similarity > 0.9 && minimal_change), similarity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_duplicate_detected_after_normalization() {
        let mut filter = NoveltyFilter::new(0.8);
        let first = filter.filter(&IdeaText::new("Solar rooftop A"));
        assert!(first.is_novel);
        let dup = filter.filter(&IdeaText::new("solar rooftop a!"));
        assert!(!dup.is_novel);
        assert_eq!(dup.similar_to, "exact duplicate");
    }

    #[test]
    fn distinct_idea_is_novel() {
        let mut filter = NoveltyFilter::new(0.8);
        filter.filter(&IdeaText::new("Solar rooftop A"));
        let other = filter.filter(&IdeaText::new("Wind micro-turbines"));
        assert!(other.is_novel);
    }

    #[test]
    fn empty_idea_is_never_novel() {
        let mut filter = NoveltyFilter::new(0.8);
        let check = filter.filter(&IdeaText::new("   "));
        assert!(!check.is_novel);
        assert_eq!(check.similarity_score, 1.0);
    }

    #[test]
    fn threshold_one_only_removes_exact_duplicates() {
        let mut filter = NoveltyFilter::new(1.0);
        filter.filter(&IdeaText::new("build a community garden"));
        let near = filter.filter(&IdeaText::new("build a community gardens"));
        assert!(near.is_novel);
    }

    #[test]
    fn threshold_zero_keeps_only_first_idea() {
        let mut filter = NoveltyFilter::new(0.0);
        let survivors = filter.filter_all(&[
            IdeaText::new("alpha beta"),
            IdeaText::new("gamma delta"),
            IdeaText::new("epsilon zeta"),
        ]);
        assert_eq!(survivors.len(), 1);
    }

    #[test]
    fn filter_all_is_idempotent() {
        let ideas = vec![
            IdeaText::new("alpha beta"),
            IdeaText::new("alpha beta!"),
            IdeaText::new("gamma delta"),
        ];
        let mut first_pass = NoveltyFilter::new(0.8);
        let once = first_pass.filter_all(&ideas);
        let mut second_pass = NoveltyFilter::new(0.8);
        let twice = second_pass.filter_all(&once);
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn meaningful_improvement_formula() {
        let (meaningful, _) = is_meaningful_improvement("a b c", "a b c", 0.1);
        assert!(!meaningful);
        let (meaningful, _) = is_meaningful_improvement("a b c", "a b c", 5.0);
        assert!(meaningful);
        let (meaningful, _) = is_meaningful_improvement("a b c", "totally different text", 0.0);
        assert!(meaningful);
    }
}

//! Concept extraction strategies.
//!
//! The store never analyses text itself; it asks an injected
//! [`ConceptExtractor`] for `(concept, weight)` pairs. Two strategies ship
//! with the crate:
//!
//! - [`WhitespaceExtractor`] — lowercase, split on whitespace, keep words
//!   longer than three characters, weight `1.0` each. The store default.
//! - [`KeywordExtractor`] — strips punctuation and English stop-words and
//!   weights each keyword by relative term frequency.

use std::collections::HashMap;

use crate::types::WeightedConcept;

/// Turns memory content into a set of weighted concepts.
///
/// Implementations must return each concept text at most once and weights
/// in `(0.0, 1.0]`; the store rejects anything else.
pub trait ConceptExtractor: Send + Sync {
    /// Extract concepts from `content`.
    fn extract(&self, content: &str) -> Vec<WeightedConcept>;
}

/// Minimal tokenizer used when no richer extractor is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceExtractor;

impl ConceptExtractor for WhitespaceExtractor {
    fn extract(&self, content: &str) -> Vec<WeightedConcept> {
        let mut seen = Vec::<String>::new();
        for word in content.split_whitespace() {
            let word = word.to_lowercase();
            if word.chars().count() > 3 && !seen.contains(&word) {
                seen.push(word);
            }
        }
        seen.into_iter()
            .map(|text| WeightedConcept::new(text, 1.0))
            .collect()
    }
}

/// Stop-word aware keyword extractor with frequency weights.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    min_len: usize,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self { min_len: 3 }
    }
}

impl KeywordExtractor {
    /// Create an extractor keeping words of at least `min_len` characters.
    #[must_use]
    pub fn with_min_len(min_len: usize) -> Self {
        Self { min_len }
    }

    /// Concept texts for a retrieval query, most salient first.
    #[must_use]
    pub fn query_concepts(&self, query: &str) -> Vec<String> {
        self.extract(query).into_iter().map(|c| c.text).collect()
    }
}

fn keywords(text: &str, min_len: usize) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(move |w| w.chars().count() >= min_len && !is_stop_word(w))
}

impl ConceptExtractor for KeywordExtractor {
    fn extract(&self, content: &str) -> Vec<WeightedConcept> {
        let mut order = Vec::new();
        let mut counts: HashMap<String, u32> = HashMap::new();
        for word in keywords(content, self.min_len) {
            let count = counts.entry(word.clone()).or_insert(0);
            if *count == 0 {
                order.push(word);
            }
            *count += 1;
        }

        let max = counts.values().copied().max().unwrap_or(1);
        let mut concepts: Vec<WeightedConcept> = order
            .into_iter()
            .map(|word| {
                let weight = f64::from(counts[&word]) / f64::from(max);
                WeightedConcept::new(word, weight)
            })
            .collect();
        // Stable: ties keep first-occurrence order.
        concepts.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        concepts
    }
}

pub(crate) fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// English stop-words, sorted for binary search.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "ain", "all", "am", "an", "and", "any",
    "are", "aren", "aren't", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "couldn", "couldn't", "d", "did", "didn", "didn't",
    "do", "does", "doesn", "doesn't", "doing", "don", "don't", "down", "during", "each", "few",
    "for", "from", "further", "had", "hadn", "hadn't", "has", "hasn", "hasn't", "have", "haven",
    "haven't", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how",
    "i", "if", "in", "into", "is", "isn", "isn't", "it", "it's", "its", "itself", "just", "ll",
    "m", "ma", "me", "mightn", "mightn't", "more", "most", "mustn", "mustn't", "my", "myself",
    "needn", "needn't", "no", "nor", "not", "now", "o", "of", "off", "on", "once", "only", "or",
    "other", "our", "ours", "ourselves", "out", "over", "own", "re", "s", "same", "shan",
    "shan't", "she", "she's", "should", "should've", "shouldn", "shouldn't", "so", "some", "such",
    "t", "than", "that", "that'll", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "ve", "very", "was", "wasn", "wasn't", "we", "were", "weren", "weren't", "what", "when",
    "where", "which", "while", "who", "whom", "why", "will", "with", "won", "won't", "wouldn",
    "wouldn't", "y", "you", "you'd", "you'll", "you're", "you've", "your", "yours", "yourself",
    "yourselves",
];

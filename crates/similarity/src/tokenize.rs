use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use unicode_segmentation::UnicodeSegmentation;

/// Common English words removed from the token stream before n-grams are
/// formed.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "if", "in", "on", "at", "to", "for", "of", "with",
        "by", "from", "as", "is", "was", "are", "were", "been", "be", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "must",
        "shall", "can", "this", "that", "these", "those", "i", "you", "he", "she", "it", "we",
        "they", "them", "his", "her", "its", "our", "their", "what", "which", "who", "whom",
        "whose", "where", "when", "why", "how", "all", "each", "every", "both", "few", "more",
        "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
        "too", "very", "just", "also", "then", "there", "here", "about", "into", "over", "under",
        "again", "once", "because", "while", "during", "before", "after", "up", "down", "out",
        "off", "any",
    ]
    .into_iter()
    .collect()
});

/// Raw term-frequency histogram for one document.
///
/// This is the vectorizer's refit input: persisting it next to the vector
/// lets every stored vector be recomputed against a new vocabulary without
/// re-reading files that may have changed or vanished since indexing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermCounts {
    counts: HashMap<String, u32>,
}

impl TermCounts {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn get(&self, term: &str) -> u32 {
        self.counts.get(term).copied().unwrap_or(0)
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(t, c)| (t.as_str(), *c))
    }
}

/// Tokenize text into word n-gram counts.
///
/// Lowercased unicode words, stop words removed, single-character tokens
/// dropped, then every n-gram with `ngram_min <= n <= ngram_max` joined by
/// single spaces.
#[must_use]
pub fn term_counts(text: &str, ngram_min: usize, ngram_max: usize) -> TermCounts {
    let words: Vec<String> = text
        .unicode_words()
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(w.as_str()))
        .collect();

    let mut counts: HashMap<String, u32> = HashMap::new();
    for n in ngram_min..=ngram_max {
        if n == 0 || n > words.len() {
            continue;
        }
        for gram in words.windows(n) {
            *counts.entry(gram.join(" ")).or_insert(0) += 1;
        }
    }

    TermCounts { counts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unigrams_are_lowercased_and_stopword_filtered() {
        let counts = term_counts("The Quick quick Fox and the fox", 1, 1);
        assert_eq!(counts.get("quick"), 2);
        assert_eq!(counts.get("fox"), 2);
        assert_eq!(counts.get("the"), 0);
        assert_eq!(counts.get("and"), 0);
    }

    #[test]
    fn bigrams_join_adjacent_words() {
        let counts = term_counts("alpha beta gamma", 2, 2);
        assert_eq!(counts.get("alpha beta"), 1);
        assert_eq!(counts.get("beta gamma"), 1);
        assert_eq!(counts.get("alpha"), 0);
    }

    #[test]
    fn range_produces_all_orders() {
        let counts = term_counts("alpha beta gamma", 1, 3);
        assert_eq!(counts.get("alpha"), 1);
        assert_eq!(counts.get("alpha beta"), 1);
        assert_eq!(counts.get("alpha beta gamma"), 1);
    }

    #[test]
    fn empty_and_stopword_only_text_yield_nothing() {
        assert!(term_counts("", 1, 3).is_empty());
        assert!(term_counts("the and of it", 1, 1).is_empty());
    }

    #[test]
    fn single_character_tokens_are_dropped() {
        let counts = term_counts("x y alpha", 1, 1);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("alpha"), 1);
    }
}

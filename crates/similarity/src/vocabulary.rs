use crate::tokenize::TermCounts;
use crate::vector::SparseVector;
use docsentry_protocol::SimilarityConfig;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct TermInfo {
    dimension: u32,
    idf: f32,
}

/// Bounded, versioned vocabulary fit over the indexed corpus.
///
/// Two stored vectors are only comparable when they were computed against
/// the same vocabulary version; the engine re-fits and rewrites every vector
/// at index completion, which is the sole synchronization point.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    version: u64,
    terms: HashMap<String, TermInfo>,
}

impl Vocabulary {
    /// The pre-fit vocabulary: version 0, no terms, every transform yields
    /// the zero vector.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Fit a vocabulary over the whole corpus.
    ///
    /// Keeps the `n_features` terms with the highest document frequency
    /// (ties broken lexicographically), assigns dimensions in sorted-term
    /// order, and computes smoothed IDF: `ln((1 + N) / (1 + df)) + 1`.
    /// Deterministic for a given corpus and config.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(docs: &[&TermCounts], config: &SimilarityConfig, version: u64) -> Self {
        let mut document_frequency: HashMap<&str, u32> = HashMap::new();
        for doc in docs {
            for (term, _) in doc.terms() {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, u32)> = document_frequency.into_iter().collect();
        ranked.sort_unstable_by(|(a_term, a_df), (b_term, b_df)| {
            b_df.cmp(a_df).then_with(|| a_term.cmp(b_term))
        });
        ranked.truncate(config.n_features);
        ranked.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

        let total_docs = docs.len() as f64;
        let terms = ranked
            .into_iter()
            .enumerate()
            .map(|(dimension, (term, df))| {
                let idf = ((1.0 + total_docs) / (1.0 + f64::from(df))).ln() + 1.0;
                (
                    term.to_string(),
                    TermInfo {
                        dimension: dimension as u32,
                        idf: idf as f32,
                    },
                )
            })
            .collect();

        log::debug!(
            "vocabulary v{version} fit over {} documents",
            docs.len()
        );
        Self { version, terms }
    }

    /// Transform a term histogram into a TF-IDF vector over this vocabulary.
    ///
    /// Sublinear term frequency (`1 + ln(tf)`) scaled by IDF, then
    /// L2-normalized. Terms outside the vocabulary contribute nothing;
    /// empty input yields the zero vector.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn transform(&self, counts: &TermCounts) -> SparseVector {
        let weights: Vec<(u32, f32)> = counts
            .terms()
            .filter_map(|(term, count)| {
                let info = self.terms.get(term)?;
                let tf = 1.0 + f64::from(count).ln();
                Some((info.dimension, (tf * f64::from(info.idf)) as f32))
            })
            .collect();
        SparseVector::from_weights(weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::term_counts;
    use pretty_assertions::assert_eq;

    fn cfg(n_features: usize) -> SimilarityConfig {
        SimilarityConfig {
            n_features,
            ngram_min: 1,
            ngram_max: 1,
            ..SimilarityConfig::default()
        }
    }

    #[test]
    fn fit_assigns_stable_dimensions() {
        let a = term_counts("apple banana cherry", 1, 1);
        let b = term_counts("banana cherry durian", 1, 1);
        let config = cfg(100);

        let first = Vocabulary::fit(&[&a, &b], &config, 1);
        let second = Vocabulary::fit(&[&a, &b], &config, 2);

        assert_eq!(first.len(), 4);
        let va = first.transform(&a);
        let vb = second.transform(&a);
        assert_eq!(va, vb);
        assert_eq!(second.version(), 2);
    }

    #[test]
    fn feature_cap_keeps_highest_document_frequency() {
        let a = term_counts("shared alpha", 1, 1);
        let b = term_counts("shared beta", 1, 1);
        let c = term_counts("shared gamma", 1, 1);
        let vocab = Vocabulary::fit(&[&a, &b, &c], &cfg(2), 1);

        // "shared" has df 3, the others df 1; "alpha" wins the tie
        // lexicographically.
        assert_eq!(vocab.len(), 2);
        let v = vocab.transform(&term_counts("shared alpha beta gamma", 1, 1));
        assert_eq!(v.nnz(), 2);
    }

    #[test]
    fn rare_terms_weigh_more_than_common_ones() {
        let docs: Vec<TermCounts> = (0..10)
            .map(|i| {
                if i == 0 {
                    term_counts("common rare", 1, 1)
                } else {
                    term_counts("common filler", 1, 1)
                }
            })
            .collect();
        let refs: Vec<&TermCounts> = docs.iter().collect();
        let vocab = Vocabulary::fit(&refs, &cfg(100), 1);

        let query = term_counts("common rare", 1, 1);
        let with_rare = vocab.transform(&query);
        let only_common = vocab.transform(&term_counts("common common", 1, 1));

        // The rare-term document is better separated from a common-only one
        // than it is from itself.
        assert!(with_rare.cosine(&only_common) < 0.999);
        assert!((with_rare.cosine(&with_rare) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_terms_contribute_nothing() {
        let a = term_counts("alpha beta", 1, 1);
        let vocab = Vocabulary::fit(&[&a], &cfg(100), 1);
        let v = vocab.transform(&term_counts("delta epsilon", 1, 1));
        assert!(v.is_zero());
    }

    #[test]
    fn empty_vocabulary_transforms_to_zero() {
        let vocab = Vocabulary::empty();
        assert_eq!(vocab.version(), 0);
        let v = vocab.transform(&term_counts("anything at all here", 1, 1));
        assert!(v.is_zero());
    }
}

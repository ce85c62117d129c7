use crate::vector::SparseVector;
use docsentry_protocol::{MatchKind, SimilarityConfig};

/// One indexed document as the matcher sees it.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub id: i64,
    pub fingerprint: String,
    pub vector: Option<SparseVector>,
}

/// Best match for one scanned file.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub matched_id: i64,
    pub kind: MatchKind,
    pub score: f64,
}

/// Classify a candidate against the indexed corpus.
///
/// Fingerprint equality short-circuits to an exact match with score 1.0
/// before any vector work. Otherwise the maximum cosine score against the
/// corpus is classified by the configured thresholds. Equal best scores
/// resolve to the lowest indexed id, so results are reproducible.
///
/// With `require_multiple_matches`, a similarity-tier result is only
/// reported when at least two distinct indexed documents clear the
/// similarity threshold; exact and high-confidence tiers are exempt.
#[must_use]
pub fn best_match(
    candidate_fingerprint: &str,
    candidate_vector: Option<&SparseVector>,
    corpus: &[CorpusEntry],
    config: &SimilarityConfig,
) -> Option<MatchOutcome> {
    // Step 1: exact bytes. Scanning in ascending-id order makes the
    // tie-break implicit.
    let mut by_id: Vec<&CorpusEntry> = corpus.iter().collect();
    by_id.sort_unstable_by_key(|e| e.id);

    if let Some(entry) = by_id
        .iter()
        .find(|e| e.fingerprint == candidate_fingerprint)
    {
        return Some(MatchOutcome {
            matched_id: entry.id,
            kind: MatchKind::Exact,
            score: 1.0,
        });
    }

    // Step 2: vector similarity.
    let candidate = candidate_vector?;
    if candidate.is_zero() {
        return None;
    }

    let mut best: Option<(i64, f64)> = None;
    let mut above_threshold = 0usize;
    for entry in &by_id {
        let Some(vector) = &entry.vector else {
            continue;
        };
        let score = candidate.cosine(vector);
        if score >= config.similarity_threshold {
            above_threshold += 1;
        }
        // Strictly-greater keeps the lowest id on exact score ties.
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((entry.id, score));
        }
    }

    let (matched_id, score) = best?;
    let kind = if score >= config.exact_match_threshold {
        MatchKind::Exact
    } else if score >= config.high_confidence_threshold {
        MatchKind::HighConfidence
    } else if score >= config.similarity_threshold {
        MatchKind::Similarity
    } else {
        return None;
    };

    if kind == MatchKind::Similarity && config.require_multiple_matches && above_threshold < 2 {
        log::debug!(
            "similarity match suppressed: single corroborating document (score {score:.3})"
        );
        return None;
    }

    Some(MatchOutcome {
        matched_id,
        kind,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(id: i64, fingerprint: &str, vector: Option<SparseVector>) -> CorpusEntry {
        CorpusEntry {
            id,
            fingerprint: fingerprint.to_string(),
            vector,
        }
    }

    fn unit(dims: &[(u32, f32)]) -> SparseVector {
        SparseVector::from_weights(dims.to_vec())
    }

    fn config() -> SimilarityConfig {
        SimilarityConfig {
            require_multiple_matches: false,
            ..SimilarityConfig::default()
        }
    }

    #[test]
    fn fingerprint_equality_short_circuits_vectors() {
        let corpus = vec![entry(7, "fp-a", None)];
        // No vector on either side: the exact path must still fire.
        let outcome = best_match("fp-a", None, &corpus, &config()).unwrap();
        assert_eq!(outcome.kind, MatchKind::Exact);
        assert_eq!(outcome.score, 1.0);
        assert_eq!(outcome.matched_id, 7);
    }

    #[test]
    fn identical_vectors_classify_exact() {
        let v = unit(&[(0, 1.0), (1, 2.0)]);
        let corpus = vec![entry(1, "fp-a", Some(v.clone()))];
        let outcome = best_match("fp-other", Some(&v), &corpus, &config()).unwrap();
        assert_eq!(outcome.kind, MatchKind::Exact);
        assert!(outcome.score > 0.99);
    }

    #[test]
    fn thresholds_pick_the_tier() {
        // Candidate overlaps entry 1 heavily and entry 2 barely.
        let candidate = unit(&[(0, 1.0), (1, 1.0)]);
        let near = unit(&[(0, 1.0), (1, 1.0), (2, 0.4)]);
        let far = unit(&[(1, 1.0), (9, 3.0)]);
        let corpus = vec![
            entry(1, "fp-1", Some(near)),
            entry(2, "fp-2", Some(far)),
        ];
        let outcome = best_match("fp-x", Some(&candidate), &corpus, &config()).unwrap();
        assert_eq!(outcome.matched_id, 1);
        assert!(outcome.score >= 0.85, "score was {}", outcome.score);
        assert_ne!(outcome.kind, MatchKind::Similarity);
    }

    #[test]
    fn below_threshold_is_no_match() {
        let candidate = unit(&[(0, 1.0)]);
        let other = unit(&[(1, 1.0)]);
        let corpus = vec![entry(1, "fp-1", Some(other))];
        assert_eq!(best_match("fp-x", Some(&candidate), &corpus, &config()), None);
    }

    #[test]
    fn equal_scores_resolve_to_lowest_id() {
        let v = unit(&[(0, 1.0)]);
        let corpus = vec![
            entry(42, "fp-42", Some(v.clone())),
            entry(3, "fp-3", Some(v.clone())),
        ];
        let outcome = best_match("fp-x", Some(&v), &corpus, &config()).unwrap();
        assert_eq!(outcome.matched_id, 3);
    }

    #[test]
    fn zero_candidate_vector_never_matches() {
        let zero = SparseVector::zero();
        let corpus = vec![entry(1, "fp-1", Some(unit(&[(0, 1.0)])))];
        assert_eq!(best_match("fp-x", Some(&zero), &corpus, &config()), None);
        assert_eq!(best_match("fp-x", None, &corpus, &config()), None);
    }

    #[test]
    fn multiple_match_rule_suppresses_single_similarity_hit() {
        let cfg = SimilarityConfig {
            require_multiple_matches: true,
            similarity_threshold: 0.5,
            high_confidence_threshold: 0.95,
            exact_match_threshold: 0.99,
            ..SimilarityConfig::default()
        };
        // ~0.71 cosine: similarity tier.
        let candidate = unit(&[(0, 1.0), (1, 1.0)]);
        let partial = unit(&[(0, 1.0)]);

        let one_doc = vec![entry(1, "fp-1", Some(partial.clone()))];
        assert_eq!(best_match("fp-x", Some(&candidate), &one_doc, &cfg), None);

        let two_docs = vec![
            entry(1, "fp-1", Some(partial.clone())),
            entry(2, "fp-2", Some(unit(&[(1, 1.0)]))),
        ];
        let outcome = best_match("fp-x", Some(&candidate), &two_docs, &cfg).unwrap();
        assert_eq!(outcome.kind, MatchKind::Similarity);
        assert_eq!(outcome.matched_id, 1);
    }

    #[test]
    fn high_confidence_is_exempt_from_multiple_match_rule() {
        let cfg = SimilarityConfig {
            require_multiple_matches: true,
            ..SimilarityConfig::default()
        };
        let v = unit(&[(0, 1.0), (1, 0.2)]);
        let close = unit(&[(0, 1.0), (1, 0.19)]);
        let corpus = vec![entry(1, "fp-1", Some(close))];
        let outcome = best_match("fp-x", Some(&v), &corpus, &cfg).unwrap();
        assert!(matches!(
            outcome.kind,
            MatchKind::Exact | MatchKind::HighConfidence
        ));
    }

    #[test]
    fn raising_threshold_cannot_add_matches() {
        let candidate = unit(&[(0, 1.0), (1, 1.0), (2, 1.0)]);
        let corpus = vec![
            entry(1, "fp-1", Some(unit(&[(0, 1.0), (1, 1.0)]))),
            entry(2, "fp-2", Some(unit(&[(0, 1.0)]))),
            entry(3, "fp-3", Some(unit(&[(9, 1.0)]))),
        ];

        let mut previous = usize::MAX;
        for threshold in [0.1, 0.3, 0.5, 0.7, 0.9] {
            let cfg = SimilarityConfig {
                similarity_threshold: threshold,
                high_confidence_threshold: 0.95,
                exact_match_threshold: 0.99,
                require_multiple_matches: false,
                ..SimilarityConfig::default()
            };
            let matches = usize::from(
                best_match("fp-x", Some(&candidate), &corpus, &cfg).is_some(),
            );
            assert!(matches <= previous || previous == usize::MAX);
            previous = matches;
        }
    }
}

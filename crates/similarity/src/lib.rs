//! # DocSentry Similarity
//!
//! Vector-space similarity for near-duplicate detection: a bounded,
//! versioned TF-IDF vocabulary fit over the indexed corpus, sparse
//! L2-normalized term vectors, cosine scoring, and the threshold
//! classifier that turns scores into match tiers.
//!
//! The vocabulary is re-fit over the whole corpus when an index operation
//! completes: IDF statistics depend on every document, so per-file
//! incremental updates would drift. Scans hold the `Arc<Vocabulary>` they
//! acquired at start; a concurrent refit swaps the shared handle without
//! touching snapshots already handed out.

mod matcher;
mod tokenize;
mod vector;
mod vocabulary;

pub use matcher::{best_match, CorpusEntry, MatchOutcome};
pub use tokenize::{term_counts, TermCounts};
pub use vector::SparseVector;
pub use vocabulary::Vocabulary;

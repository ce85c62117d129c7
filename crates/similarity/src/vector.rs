use serde::{Deserialize, Serialize};

/// Sparse term-weight vector over a vocabulary.
///
/// Entries are `(dimension, weight)` pairs sorted by dimension; weights are
/// L2-normalized at construction so cosine similarity reduces to a dot
/// product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build from raw `(dimension, weight)` pairs, dropping zero weights,
    /// sorting by dimension, and L2-normalizing.
    #[must_use]
    pub fn from_weights(mut weights: Vec<(u32, f32)>) -> Self {
        weights.retain(|(_, w)| *w != 0.0);
        weights.sort_unstable_by_key(|(dim, _)| *dim);

        let norm = weights
            .iter()
            .map(|(_, w)| f64::from(*w) * f64::from(*w))
            .sum::<f64>()
            .sqrt();
        if norm > 0.0 {
            for (_, w) in &mut weights {
                *w = (f64::from(*w) / norm) as f32;
            }
        }
        Self { entries: weights }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Cosine similarity against another normalized vector.
    ///
    /// Defined as `0.0` when either side is the zero vector, never a
    /// numeric error. Clamped to `[0, 1]` to absorb floating-point drift.
    #[must_use]
    pub fn cosine(&self, other: &Self) -> f64 {
        if self.is_zero() || other.is_zero() {
            return 0.0;
        }

        let mut dot = 0.0f64;
        let (mut i, mut j) = (0usize, 0usize);
        while i < self.entries.len() && j < other.entries.len() {
            let (a_dim, a_w) = self.entries[i];
            let (b_dim, b_w) = other.entries[j];
            match a_dim.cmp(&b_dim) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    dot += f64::from(a_w) * f64::from(b_w);
                    i += 1;
                    j += 1;
                }
            }
        }
        dot.clamp(0.0, 1.0)
    }
}

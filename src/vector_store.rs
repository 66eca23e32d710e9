//! Flat nearest-neighbour index over embedded text

use crate::error::VectorStoreError;

/// Number of texts returned by a search when the caller has no preference
pub const DEFAULT_TOP_K: usize = 5;

/// In-memory `(embedding, text)` pairs, all of one dimension
#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    embeddings: Vec<Vec<f32>>,
    texts: Vec<String>,
    dimension: usize,
}

impl VectorStore {
    pub fn new(embeddings: Vec<Vec<f32>>, texts: Vec<String>) -> Result<Self, VectorStoreError> {
        if embeddings.len() != texts.len() {
            return Err(VectorStoreError::LengthMismatch {
                embeddings: embeddings.len(),
                texts: texts.len(),
            });
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        Ok(Self {
            embeddings,
            texts,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Up to `k` texts nearest to `query`, closest first. Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<&str>, VectorStoreError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(idx, e)| (idx, squared_l2(e, query)))
            .collect();
        // stable: equal distances stay in insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(idx, _)| self.texts[idx].as_str())
            .collect())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

//! Search index handles
//!
//! A catalog registers at most one index per (modality, granularity) pair.
//! Dense indexes are exact: an L2-normalized query is scanned against the
//! whole row matrix and scored by dot product, so results are deterministic
//! and ties resolve in catalog order.

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

use super::lexical::LexicalIndex;

/// How a query is matched against the archive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Dense embedding similarity
    Similarity,
    /// Sparse term-weighted text relevance
    Lexical,
}

/// Which catalog entities are retrieved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Frame,
    Shot,
}

/// Registry key for one index.
pub type IndexKey = (Modality, Granularity);

/// A registered index over catalog entities.
#[derive(Debug)]
pub enum SearchIndex {
    Dense(DenseIndex),
    Lexical(LexicalIndex),
}

impl SearchIndex {
    /// Number of indexed entities
    pub fn len(&self) -> usize {
        match self {
            SearchIndex::Dense(d) => d.len(),
            SearchIndex::Lexical(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row-major matrix of normalized vectors with per-row catalog ids.
#[derive(Debug)]
pub struct DenseIndex {
    dim: usize,
    /// Catalog id of row `i`
    ids: Vec<u32>,
    /// `ids.len() * dim` values, row-major
    data: Vec<f32>,
}

impl DenseIndex {
    /// Build from resolved catalog ids and a flat row-major vector block.
    pub fn new(dim: usize, ids: Vec<u32>, data: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(AppError::CatalogInconsistent {
                message: "dense index dimension must be positive".into(),
            });
        }
        if data.len() != ids.len() * dim {
            return Err(AppError::CatalogInconsistent {
                message: format!(
                    "dense index block holds {} values, expected {} rows x {} dims",
                    data.len(),
                    ids.len(),
                    dim
                ),
            });
        }
        Ok(Self { dim, ids, data })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Exact top-k scan. Returns `(catalog id, score)` pairs, descending
    /// score, ties broken by catalog order, at most `top_k` entries.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dim {
            return Err(AppError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim)
            .zip(self.ids.iter())
            .map(|(row, &id)| {
                let score: f32 = row.iter().zip(query.iter()).map(|(a, b)| a * b).sum();
                (id as usize, score)
            })
            .collect();

        sort_hits(&mut scored);
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Sort `(catalog id, score)` pairs descending by score, ties by catalog id.
pub(crate) fn sort_hits(hits: &mut [(usize, f32)]) {
    hits.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> DenseIndex {
        // Three orthogonal-ish rows in 2d, catalog ids 10, 11, 12
        DenseIndex::new(
            2,
            vec![10, 11, 12],
            vec![1.0, 0.0, 0.0, 1.0, 0.6, 0.8],
        )
        .unwrap()
    }

    #[test]
    fn test_search_descending_order() {
        let idx = index();
        let hits = idx.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].0, 10);
        assert!(hits[0].1 >= hits[1].1 && hits[1].1 >= hits[2].1);
    }

    #[test]
    fn test_search_truncates_to_top_k() {
        let idx = index();
        let hits = idx.search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 11);
    }

    #[test]
    fn test_ties_resolve_in_catalog_order() {
        let idx = DenseIndex::new(2, vec![7, 3], vec![1.0, 0.0, 1.0, 0.0]).unwrap();
        let hits = idx.search(&[1.0, 0.0], 2).unwrap();
        // Equal scores: lower catalog id first
        assert_eq!(hits[0].0, 3);
        assert_eq!(hits[1].0, 7);
    }

    #[test]
    fn test_dimension_mismatch_is_explicit() {
        let idx = index();
        let err = idx.search(&[1.0, 0.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_block_shape_validated() {
        let err = DenseIndex::new(3, vec![0, 1], vec![0.0; 5]).unwrap_err();
        assert!(err.is_fatal());
    }
}

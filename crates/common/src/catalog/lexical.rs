//! Sparse lexical search over recognized on-screen text
//!
//! The archive ships a term-weighted CSR matrix (one row per frame), a
//! companion row -> frame-path list, and a vectorizer artifact (vocabulary +
//! IDF weights). Queries are tokenized the same way the matrix was built and
//! scored by cosine similarity against the rows.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::Deserialize;

use crate::errors::{AppError, Result};

use super::index::sort_hits;

/// Tokenize text for lexical matching: lowercased unicode alphanumeric runs
/// plus a second pass over ASCII terms. Tokens shorter than two characters
/// are noise and dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    static ASCII_TERM: OnceLock<Regex> = OnceLock::new();
    let ascii_term = ASCII_TERM.get_or_init(|| Regex::new(r"[a-zA-Z_]{2,}").unwrap());

    let lowered = text.to_lowercase();

    let mut tokens: Vec<String> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_string())
        .collect();

    tokens.extend(ascii_term.find_iter(&lowered).map(|m| m.as_str().to_string()));
    tokens
}

/// Sparse query vector, indices strictly ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

/// Vectorizer artifact: token -> column plus per-column IDF weight.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorizerFile {
    pub vocabulary: HashMap<String, u32>,
    pub idf: Vec<f32>,
}

/// Turns raw query text into the same TF-IDF space as the lexical matrix.
#[derive(Debug)]
pub struct Vectorizer {
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
}

impl Vectorizer {
    pub fn from_file(file: VectorizerFile) -> Result<Self> {
        for (token, &col) in &file.vocabulary {
            if col as usize >= file.idf.len() {
                return Err(AppError::CatalogInconsistent {
                    message: format!(
                        "vectorizer vocabulary entry '{}' points at column {} but only {} IDF weights are present",
                        token,
                        col,
                        file.idf.len()
                    ),
                });
            }
        }
        Ok(Self {
            vocabulary: file.vocabulary,
            idf: file.idf,
        })
    }

    /// Vocabulary size (= lexical matrix column count)
    pub fn dim(&self) -> usize {
        self.idf.len()
    }

    /// TF-IDF transform with L2 normalization. Out-of-vocabulary tokens
    /// contribute nothing; an all-unknown query yields an empty vector.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for token in tokenize(text) {
            if let Some(&col) = self.vocabulary.get(&token) {
                *counts.entry(col).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(col, tf)| (col, tf * self.idf[col as usize]))
            .collect();
        entries.sort_by_key(|(col, _)| *col);

        let norm = entries.iter().map(|(_, v)| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, v) in entries.iter_mut() {
                *v /= norm;
            }
        }

        SparseVector {
            indices: entries.iter().map(|(c, _)| *c).collect(),
            values: entries.into_iter().map(|(_, v)| v).collect(),
        }
    }
}

/// CSR matrix artifact as stored on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct CsrFile {
    pub cols: usize,
    pub indptr: Vec<usize>,
    pub indices: Vec<u32>,
    pub data: Vec<f32>,
}

/// Read-only CSR matrix.
#[derive(Debug)]
pub struct CsrMatrix {
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f32>,
}

impl CsrMatrix {
    pub fn from_file(file: CsrFile) -> Result<Self> {
        if file.indptr.is_empty() || file.indptr[0] != 0 {
            return Err(AppError::CatalogInconsistent {
                message: "lexical matrix indptr must start at 0".into(),
            });
        }
        if file.indptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(AppError::CatalogInconsistent {
                message: "lexical matrix indptr must be non-decreasing".into(),
            });
        }
        let nnz = *file.indptr.last().unwrap();
        if file.indices.len() != nnz || file.data.len() != nnz {
            return Err(AppError::CatalogInconsistent {
                message: format!(
                    "lexical matrix holds {} indices / {} values, indptr expects {}",
                    file.indices.len(),
                    file.data.len(),
                    nnz
                ),
            });
        }
        if file.indices.iter().any(|&c| c as usize >= file.cols) {
            return Err(AppError::CatalogInconsistent {
                message: "lexical matrix column index out of range".into(),
            });
        }
        Ok(Self {
            cols: file.cols,
            indptr: file.indptr,
            indices: file.indices,
            data: file.data,
        })
    }

    pub fn rows(&self) -> usize {
        self.indptr.len() - 1
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn row(&self, i: usize) -> (&[u32], &[f32]) {
        let (lo, hi) = (self.indptr[i], self.indptr[i + 1]);
        (&self.indices[lo..hi], &self.data[lo..hi])
    }
}

/// Lexical index: CSR rows with per-row catalog ids and cached norms.
#[derive(Debug)]
pub struct LexicalIndex {
    matrix: CsrMatrix,
    /// Catalog id of row `i`
    ids: Vec<u32>,
    row_norms: Vec<f32>,
}

impl LexicalIndex {
    pub fn new(matrix: CsrMatrix, ids: Vec<u32>) -> Result<Self> {
        if ids.len() != matrix.rows() {
            return Err(AppError::CatalogInconsistent {
                message: format!(
                    "lexical path list has {} entries for a {}-row matrix",
                    ids.len(),
                    matrix.rows()
                ),
            });
        }
        let row_norms = (0..matrix.rows())
            .map(|i| {
                let (_, values) = matrix.row(i);
                values.iter().map(|v| v * v).sum::<f32>().sqrt()
            })
            .collect();
        Ok(Self {
            matrix,
            ids,
            row_norms,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Cosine similarity of the query against every row. Returns
    /// `(catalog id, score)` pairs, descending score, ties broken by catalog
    /// order, at most `top_k` entries.
    pub fn search(&self, query: &SparseVector, top_k: usize) -> Vec<(usize, f32)> {
        let query_norm = query.norm();

        let mut scored: Vec<(usize, f32)> = (0..self.matrix.rows())
            .map(|i| {
                let (cols, values) = self.matrix.row(i);
                let dot = sparse_dot(query, cols, values);
                let denom = query_norm * self.row_norms[i];
                let score = if denom > 0.0 { dot / denom } else { 0.0 };
                (self.ids[i] as usize, score)
            })
            .collect();

        sort_hits(&mut scored);
        scored.truncate(top_k);
        scored
    }
}

/// Merge-join dot product of a sparse query with one CSR row.
fn sparse_dot(query: &SparseVector, cols: &[u32], values: &[f32]) -> f32 {
    let mut dot = 0.0;
    let (mut i, mut j) = (0, 0);
    while i < query.indices.len() && j < cols.len() {
        match query.indices[i].cmp(&cols[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += query.values[i] * values[j];
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

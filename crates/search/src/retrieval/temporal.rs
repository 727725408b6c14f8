//! Temporal alignment
//!
//! Re-scores shot candidates against a multi-sentence query: each sentence
//! is one sub-query expected to correspond to one chronological event, and a
//! dynamic program finds the best assignment of sub-queries to frames under
//! a strict-advance constraint: sub-query `i` must land on a frame strictly
//! later than sub-query `i-1`'s frame. The first sub-query may match any
//! frame.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use shotscout_common::catalog::CatalogStore;
use shotscout_common::embeddings::{dot, Embedder};
use shotscout_common::errors::{AppError, Result};
use shotscout_common::metrics::record_alignment;

use super::{ShotHit, SkippedCandidate};

/// Alignment output: scored shots descending, plus every candidate that was
/// skipped and why. Skips shrink the output, they never fail the batch.
#[derive(Debug, Clone)]
pub struct AlignmentOutcome {
    pub hits: Vec<ShotHit>,
    pub skipped: Vec<SkippedCandidate>,
}

pub struct TemporalAligner {
    catalog: Arc<CatalogStore>,
    embedder: Arc<dyn Embedder>,
}

impl TemporalAligner {
    pub fn new(catalog: Arc<CatalogStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { catalog, embedder }
    }

    /// Score each candidate shot by how well the query's ordered sub-events
    /// match its frame sequence, and return shots sorted descending by that
    /// score.
    #[instrument(skip(self, shot_paths, query), fields(candidates = shot_paths.len()))]
    pub async fn align(&self, shot_paths: &[String], query: &str) -> Result<AlignmentOutcome> {
        let sub_queries = split_sub_queries(query);
        if sub_queries.is_empty() {
            return Err(AppError::EmptyQuery);
        }

        let sub_embs = self.embedder.encode_text_batch(&sub_queries).await?;
        debug!(sub_queries = sub_embs.len(), "Embedded sub-queries");

        let mut hits = Vec::new();
        let mut skipped = Vec::new();

        for shot_path in shot_paths {
            match self.score_shot(shot_path, &sub_embs) {
                Ok(score) => {
                    let shot = self.catalog.shot(shot_path)?;
                    hits.push(ShotHit::from_record(shot, score));
                }
                Err(SkipOrFail::Skip(reason)) => {
                    warn!(shot = %shot_path, reason = %reason, "Skipping shot");
                    skipped.push(SkippedCandidate {
                        path: shot_path.clone(),
                        reason,
                    });
                }
                Err(SkipOrFail::Fail(err)) => return Err(err),
            }
        }

        // Stable sort: equal scores keep first-seen candidate order
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        record_alignment(hits.len(), skipped.len());
        Ok(AlignmentOutcome { hits, skipped })
    }

    /// Resolve the shot's frame vectors and run the alignment DP. Missing
    /// metadata or vectors skip this one shot; a vector-space mismatch is a
    /// call-level failure.
    fn score_shot(
        &self,
        shot_path: &str,
        sub_embs: &[Vec<f32>],
    ) -> std::result::Result<f32, SkipOrFail> {
        let shot = self
            .catalog
            .shot(shot_path)
            .map_err(|e| SkipOrFail::Skip(e.to_string()))?;

        let block = self
            .catalog
            .video_block(&shot.collection, &shot.video)
            .map_err(|e| SkipOrFail::Skip(e.to_string()))?;

        if let Some(q) = sub_embs.first() {
            if q.len() != block.dim() {
                return Err(SkipOrFail::Fail(AppError::DimensionMismatch {
                    expected: block.dim(),
                    actual: q.len(),
                }));
            }
        }

        let mut frame_vecs = Vec::with_capacity(shot.frame_paths.len());
        for fp in &shot.frame_paths {
            match block.vector(fp) {
                Some(v) => frame_vecs.push(v),
                None => {
                    return Err(SkipOrFail::Skip(format!(
                        "no embedding for frame '{fp}'"
                    )))
                }
            }
        }

        let sims: Vec<Vec<f32>> = sub_embs
            .iter()
            .map(|q| frame_vecs.iter().map(|f| dot(q, f)).collect())
            .collect();

        Ok(alignment_score(&sims))
    }
}

enum SkipOrFail {
    Skip(String),
    Fail(AppError),
}

/// Split a query into trimmed, non-empty sentence sub-queries.
pub fn split_sub_queries(query: &str) -> Vec<String> {
    query
        .split(['.', '?', '!'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Order-preserving alignment score over an `M x F` similarity matrix.
///
/// `dp[0][j] = S[0][j]`; for `i >= 1`,
/// `dp[i][j] = S[i][j] + max(dp[i-1][0..j-1])`, with positions before the
/// first counting as negative infinity. The running prefix maximum keeps the
/// whole program at O(M*F). The result is `max(dp[M-1][*]) / M` so query
/// length does not bias the score; with fewer frames than sub-queries the
/// unreachable assignments stay at negative infinity.
pub fn alignment_score(sims: &[Vec<f32>]) -> f32 {
    let m = sims.len();
    if m == 0 {
        return f32::NEG_INFINITY;
    }
    let f = sims[0].len();
    if f == 0 {
        return f32::NEG_INFINITY;
    }

    let mut prev: Vec<f32> = sims[0].clone();
    for row in &sims[1..] {
        let mut current = vec![f32::NEG_INFINITY; f];
        let mut prefix_max = f32::NEG_INFINITY;
        for j in 1..f {
            // Best predecessor strictly before j
            prefix_max = prefix_max.max(prev[j - 1]);
            if prefix_max > f32::NEG_INFINITY {
                current[j] = row[j] + prefix_max;
            }
        }
        prev = current;
    }

    let best = prev.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    best / m as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::test_support::{catalog_with_frames, StubEmbedder};

    #[test]
    fn test_split_sub_queries() {
        let subs = split_sub_queries("A flock of birds flying. A bridge from above.  ");
        assert_eq!(subs, vec!["A flock of birds flying", "A bridge from above"]);
        assert!(split_sub_queries("...").is_empty());
    }

    #[test]
    fn test_single_sub_query_is_best_frame() {
        let sims = vec![vec![0.2, 0.9, 0.4]];
        assert!((alignment_score(&sims) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_score_averaged_over_sub_queries() {
        // Sub-query 1 peaks at frame 0, sub-query 2 at frame 2: total 1.7/2
        let sims = vec![vec![0.9, 0.1, 0.1], vec![0.1, 0.2, 0.8]];
        assert!((alignment_score(&sims) - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_ordering_constraint_rejects_reversed_peaks() {
        // Row maxima are at j=3 for sub-query 1 and j=2 for sub-query 2,
        // chronologically reversed, so the naive sum (0.9 + 0.95) must not
        // be reachable and an ordering-valid pair (j1 < j2) wins instead.
        let mut row1 = vec![0.1; 8];
        row1[3] = 0.9;
        row1[1] = 0.6;
        let mut row2 = vec![0.1; 8];
        row2[2] = 0.95;
        row2[4] = 0.5;
        let sims = vec![row1, row2];

        let score = alignment_score(&sims);
        let naive = (0.9 + 0.95) / 2.0;
        assert!(score < naive);
        // Best valid pairs: (1, 2) = 0.6 + 0.95 or (3, 4) = 0.9 + 0.5
        assert!((score - (0.6 + 0.95) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_fewer_frames_than_sub_queries_is_neg_infinity() {
        let sims = vec![vec![0.5], vec![0.5], vec![0.5]];
        assert_eq!(alignment_score(&sims), f32::NEG_INFINITY);
    }

    #[tokio::test]
    async fn test_align_ranks_by_best_frame_for_single_sentence() {
        let (catalog, _) = catalog_with_frames();
        // "query" embeds to [0, 1]: shot 2's frames dominate
        let embedder = Arc::new(StubEmbedder::with_mapping(&[("query", vec![0.0, 1.0])]));
        let aligner = TemporalAligner::new(catalog, embedder);
        let outcome = aligner
            .align(
                &[
                    "L01/V001/Shot_1.mp4".to_string(),
                    "L01/V001/Shot_2.mp4".to_string(),
                ],
                "query.",
            )
            .await
            .unwrap();
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.hits[0].path, "L01/V001/Shot_2.mp4");
        // Best single frame of shot 2 against [0, 1] is S2_F1 = [0, 1]
        assert!((outcome.hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_block_skips_shot_not_batch() {
        let (catalog, _) = catalog_with_frames();
        let embedder = Arc::new(StubEmbedder::with_mapping(&[("query", vec![0.0, 1.0])]));
        let aligner = TemporalAligner::new(catalog, embedder);
        let outcome = aligner
            .align(
                &[
                    "L01/V001/Shot_1.mp4".to_string(),
                    "L01/V009/Shot_9.mp4".to_string(),
                ],
                "query.",
            )
            .await
            .unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, "L01/V009/Shot_9.mp4");
    }

    #[tokio::test]
    async fn test_all_empty_sentences_rejected() {
        let (catalog, embedder) = catalog_with_frames();
        let aligner = TemporalAligner::new(catalog, embedder);
        let err = aligner
            .align(&["L01/V001/Shot_1.mp4".to_string()], " . . ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyQuery));
    }
}

//! Rerank fusion
//!
//! Improves precision of the top candidates with an external relevance
//! scorer that reasons over captions. Candidates are cut into fixed-size
//! batches dispatched through a bounded worker pool; a failed batch is
//! dropped whole and never disturbs the others. Returned verdicts are merged
//! back onto the originating records by path and the merged list is
//! re-sorted by the fusion score, with the earlier stage score preserved
//! alongside it.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{stream, StreamExt};
use tracing::{debug, instrument, warn};

use shotscout_common::errors::Result;
use shotscout_common::metrics::record_rerank;
use shotscout_common::scoring::{RelevanceScorer, ScoreItem};

use super::{BatchFailure, FusedHit, RerankSource};

/// Items submitted to the scorer per call
pub const RERANK_BATCH_SIZE: usize = 5;

/// Rerank output: fused hits descending by fusion score, plus every batch
/// that was dropped and why.
#[derive(Debug, Clone)]
pub struct RerankOutcome<T> {
    pub hits: Vec<FusedHit<T>>,
    pub failed_batches: Vec<BatchFailure>,
}

pub struct RerankFusion {
    scorer: Arc<dyn RelevanceScorer>,
}

impl RerankFusion {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    /// Re-score the top `top_k_rerank` candidates. Output is a subset of the
    /// input: items the scorer did not cover (or whose batch failed) are
    /// absent, never zero-scored.
    #[instrument(skip(self, query, items), fields(candidates = items.len()))]
    pub async fn rerank<T>(
        &self,
        query: &str,
        items: &[T],
        top_k_rerank: usize,
        pool_width: usize,
    ) -> Result<RerankOutcome<T>>
    where
        T: RerankSource + Clone,
    {
        let candidates = &items[..items.len().min(top_k_rerank)];
        let batches: Vec<Vec<ScoreItem>> = candidates
            .chunks(RERANK_BATCH_SIZE)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|item| ScoreItem {
                        path: item.path().to_string(),
                        caption_short: item.caption_short().to_string(),
                        caption_long: item.caption_long().to_string(),
                    })
                    .collect()
            })
            .collect();
        debug!(
            candidates = candidates.len(),
            batches = batches.len(),
            "Dispatching rerank batches"
        );

        let replies: Vec<(usize, Result<Vec<shotscout_common::scoring::ScoredItem>>)> =
            stream::iter(batches.into_iter().enumerate())
                .map(|(bid, batch)| {
                    let scorer = Arc::clone(&self.scorer);
                    let query = query.to_string();
                    async move {
                        let reply = scorer.score_batch(&query, &batch).await;
                        (bid, reply)
                    }
                })
                .buffer_unordered(pool_width.max(1))
                .collect()
                .await;

        let mut merged = Vec::new();
        let mut failed_batches = Vec::new();
        let batch_count = replies.len();
        for (bid, reply) in replies {
            match reply {
                Ok(scored) => merged.extend(scored),
                Err(e) => {
                    warn!(batch = bid, error = %e, "Rerank batch failed, dropping");
                    failed_batches.push(BatchFailure {
                        batch: bid,
                        reason: e.to_string(),
                    });
                }
            }
        }
        failed_batches.sort_by_key(|f| f.batch);

        // Merge verdicts back onto the originating records; candidate rank
        // doubles as the deterministic tie-break.
        let by_path: HashMap<&str, (usize, &T)> = candidates
            .iter()
            .enumerate()
            .map(|(rank, item)| (item.path(), (rank, item)))
            .collect();

        let mut hits: Vec<(usize, FusedHit<T>)> = merged
            .into_iter()
            .filter_map(|verdict| {
                by_path.get(verdict.path.as_str()).map(|&(rank, item)| {
                    (
                        rank,
                        FusedHit {
                            item: item.clone(),
                            fusion_score: verdict.score,
                            explanation: verdict.explanation,
                        },
                    )
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.1.fusion_score
                .cmp(&a.1.fusion_score)
                .then_with(|| a.0.cmp(&b.0))
        });

        record_rerank(batch_count, failed_batches.len());
        Ok(RerankOutcome {
            hits: hits.into_iter().map(|(_, hit)| hit).collect(),
            failed_batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::FrameHit;
    use async_trait::async_trait;
    use shotscout_common::errors::AppError;
    use shotscout_common::scoring::ScoredItem;

    fn frame_hit(path: &str, score: f32) -> FrameHit {
        FrameHit {
            path: path.to_string(),
            score,
            frame_number: 0,
            shot_path: "L01/V001/Shot_1.mp4".into(),
            source: "V001".into(),
            timestamp: 0.0,
            fps: 25.0,
            caption_short: format!("caption for {path}"),
            caption_long: String::new(),
            tags: vec![],
        }
    }

    /// Scores each covered path by a fixed table; errors on marked batches.
    struct TableScorer {
        scores: HashMap<String, u8>,
        fail_paths: Vec<String>,
    }

    #[async_trait]
    impl RelevanceScorer for TableScorer {
        async fn score_batch(
            &self,
            _query: &str,
            items: &[ScoreItem],
        ) -> shotscout_common::errors::Result<Vec<ScoredItem>> {
            if items.iter().any(|i| self.fail_paths.contains(&i.path)) {
                return Err(AppError::ScorerError {
                    message: "malformed reply".into(),
                });
            }
            Ok(items
                .iter()
                .filter_map(|i| {
                    self.scores.get(&i.path).map(|&score| ScoredItem {
                        path: i.path.clone(),
                        score,
                        explanation: format!("verdict for {}", i.path),
                    })
                })
                .collect())
        }
    }

    fn items(n: usize) -> Vec<FrameHit> {
        (0..n)
            .map(|i| frame_hit(&format!("F{i}.jpg"), 1.0 - i as f32 * 0.01))
            .collect()
    }

    #[tokio::test]
    async fn test_merge_sorts_by_fusion_score_and_keeps_stage_score() {
        let scores: HashMap<String, u8> =
            [("F0.jpg", 40u8), ("F1.jpg", 90), ("F2.jpg", 70)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
        let fusion = RerankFusion::new(Arc::new(TableScorer {
            scores,
            fail_paths: vec![],
        }));

        let input = items(3);
        let outcome = fusion.rerank("flood", &input, 10, 4).await.unwrap();

        assert_eq!(outcome.hits.len(), 3);
        assert_eq!(outcome.hits[0].item.path, "F1.jpg");
        assert_eq!(outcome.hits[0].fusion_score, 90);
        // Stage score preserved alongside the fusion score
        assert!((outcome.hits[0].item.score - 0.99).abs() < 1e-6);
        assert_eq!(outcome.hits[2].fusion_score, 40);
    }

    #[tokio::test]
    async fn test_failed_batch_is_isolated() {
        // 7 items -> batches [0..5) and [5..7); the second batch fails
        let scores: HashMap<String, u8> = (0..7)
            .map(|i| (format!("F{i}.jpg"), 50 + i as u8))
            .collect();
        let fusion = RerankFusion::new(Arc::new(TableScorer {
            scores,
            fail_paths: vec!["F5.jpg".to_string()],
        }));

        let input = items(7);
        let outcome = fusion.rerank("flood", &input, 10, 4).await.unwrap();

        assert_eq!(outcome.hits.len(), 5);
        assert!(outcome.hits.iter().all(|h| h.item.path != "F5.jpg"));
        assert_eq!(outcome.failed_batches.len(), 1);
        assert_eq!(outcome.failed_batches[0].batch, 1);
    }

    #[tokio::test]
    async fn test_output_is_subset_of_input_and_scored() {
        // Scorer only covers two of five submitted items
        let scores: HashMap<String, u8> =
            [("F1.jpg", 80u8), ("F3.jpg", 60)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
        let fusion = RerankFusion::new(Arc::new(TableScorer {
            scores: scores.clone(),
            fail_paths: vec![],
        }));

        let input = items(5);
        let outcome = fusion.rerank("flood", &input, 10, 2).await.unwrap();

        assert_eq!(outcome.hits.len(), 2);
        for hit in &outcome.hits {
            assert!(scores.contains_key(&hit.item.path));
            assert!(input.iter().any(|i| i.path == hit.item.path));
        }
    }

    #[tokio::test]
    async fn test_top_k_rerank_truncates_before_batching() {
        let scores: HashMap<String, u8> = (0..20)
            .map(|i| (format!("F{i}.jpg"), 99))
            .collect();
        let fusion = RerankFusion::new(Arc::new(TableScorer {
            scores,
            fail_paths: vec![],
        }));

        let input = items(20);
        let outcome = fusion.rerank("flood", &input, 8, 4).await.unwrap();

        assert_eq!(outcome.hits.len(), 8);
        // Ties on fusion score keep the original candidate order
        assert_eq!(outcome.hits[0].item.path, "F0.jpg");
        assert_eq!(outcome.hits[7].item.path, "F7.jpg");
    }

    #[tokio::test]
    async fn test_unknown_paths_in_reply_are_ignored() {
        struct NoisyScorer;

        #[async_trait]
        impl RelevanceScorer for NoisyScorer {
            async fn score_batch(
                &self,
                _query: &str,
                items: &[ScoreItem],
            ) -> shotscout_common::errors::Result<Vec<ScoredItem>> {
                let mut out: Vec<ScoredItem> = items
                    .iter()
                    .map(|i| ScoredItem {
                        path: i.path.clone(),
                        score: 75,
                        explanation: String::new(),
                    })
                    .collect();
                out.push(ScoredItem {
                    path: "hallucinated.jpg".into(),
                    score: 100,
                    explanation: String::new(),
                });
                Ok(out)
            }
        }

        let fusion = RerankFusion::new(Arc::new(NoisyScorer));
        let input = items(3);
        let outcome = fusion.rerank("flood", &input, 10, 2).await.unwrap();
        assert_eq!(outcome.hits.len(), 3);
        assert!(outcome.hits.iter().all(|h| h.item.path != "hallucinated.jpg"));
    }
}

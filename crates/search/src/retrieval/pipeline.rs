//! Retrieval pipeline
//!
//! Wires the three stages over shared ownership of the catalog and the
//! external capabilities. Each entry point is independently invocable;
//! `run` chains them the way the interactive driver does: candidate search,
//! optional temporal refinement over the collapsed shot set, optional rerank
//! of whatever came out last.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use shotscout_common::catalog::{CatalogStore, Granularity, Modality};
use shotscout_common::embeddings::Embedder;
use shotscout_common::errors::Result;
use shotscout_common::scoring::RelevanceScorer;

use super::multimodal::MultiModalSearch;
use super::planner::PlannedQuery;
use super::rerank::RerankFusion;
use super::temporal::{AlignmentOutcome, TemporalAligner};
use super::{
    BatchFailure, FrameHit, FusedHit, RerankOutcome, SearchRequest, SearchResults, ShotHit,
    SkippedCandidate,
};

/// One full pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Candidate search query
    pub query: String,

    /// Multi-sentence query for temporal alignment; defaults to `query`
    pub full_query: Option<String>,

    pub modality: Modality,
    pub granularity: Granularity,

    /// Candidate search breadth
    pub top_k: usize,

    /// Re-align candidates against frame sequences
    pub refine_temporal: bool,

    /// Re-score the leading candidates with the external scorer
    pub enable_rerank: bool,

    /// How many leading candidates the scorer sees
    pub top_k_rerank: usize,

    /// Scorer dispatch pool width
    pub pool_width: usize,
}

impl Default for PipelineRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            full_query: None,
            modality: Modality::Similarity,
            granularity: Granularity::Frame,
            top_k: 50,
            refine_temporal: false,
            enable_rerank: false,
            top_k_rerank: 50,
            pool_width: 8,
        }
    }
}

impl PipelineRequest {
    /// Wide-funnel defaults for planner-driven runs: a broad frame search
    /// feeding temporal refinement and a rerank of the leading candidates.
    pub fn from_plan(plan: PlannedQuery) -> Self {
        Self {
            query: plan.query,
            full_query: Some(plan.full_query),
            modality: Modality::Similarity,
            granularity: Granularity::Frame,
            top_k: 500,
            refine_temporal: plan.temporal,
            enable_rerank: true,
            top_k_rerank: 50,
            pool_width: 8,
        }
    }
}

/// Final ranked entities of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineResults {
    Frames(Vec<FrameHit>),
    Shots(Vec<ShotHit>),
    RerankedFrames(Vec<FusedHit<FrameHit>>),
    RerankedShots(Vec<FusedHit<ShotHit>>),
}

impl PipelineResults {
    pub fn len(&self) -> usize {
        match self {
            PipelineResults::Frames(v) => v.len(),
            PipelineResults::Shots(v) => v.len(),
            PipelineResults::RerankedFrames(v) => v.len(),
            PipelineResults::RerankedShots(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pipeline output plus the observability the stages accumulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub results: PipelineResults,
    /// Shots temporal alignment skipped, with reasons
    pub skipped: Vec<SkippedCandidate>,
    /// Rerank batches that were dropped, with reasons
    pub failed_batches: Vec<BatchFailure>,
}

pub struct RetrievalPipeline {
    search: MultiModalSearch,
    aligner: TemporalAligner,
    fusion: RerankFusion,
}

impl RetrievalPipeline {
    pub fn new(
        catalog: Arc<CatalogStore>,
        embedder: Arc<dyn Embedder>,
        scorer: Arc<dyn RelevanceScorer>,
    ) -> Self {
        Self {
            search: MultiModalSearch::new(Arc::clone(&catalog), Arc::clone(&embedder)),
            aligner: TemporalAligner::new(catalog, embedder),
            fusion: RerankFusion::new(scorer),
        }
    }

    /// Stage 1 entry point.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        self.search.search(request).await
    }

    /// Stage 2 entry point.
    pub async fn align(&self, shot_paths: &[String], query: &str) -> Result<AlignmentOutcome> {
        self.aligner.align(shot_paths, query).await
    }

    /// Stage 3 entry point over frame candidates.
    pub async fn rerank_frames(
        &self,
        query: &str,
        items: &[FrameHit],
        top_k_rerank: usize,
        pool_width: usize,
    ) -> Result<RerankOutcome<FrameHit>> {
        self.fusion
            .rerank(query, items, top_k_rerank, pool_width)
            .await
    }

    /// Stage 3 entry point over shot candidates.
    pub async fn rerank_shots(
        &self,
        query: &str,
        items: &[ShotHit],
        top_k_rerank: usize,
        pool_width: usize,
    ) -> Result<RerankOutcome<ShotHit>> {
        self.fusion
            .rerank(query, items, top_k_rerank, pool_width)
            .await
    }

    /// Chain the stages per request flags.
    #[instrument(skip(self, request), fields(refine = request.refine_temporal, rerank = request.enable_rerank))]
    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutput> {
        if request.refine_temporal {
            return self.run_with_refinement(request).await;
        }

        let results = self
            .search(&SearchRequest {
                query: request.query.clone(),
                modality: request.modality,
                granularity: request.granularity,
                top_k: request.top_k,
                collapse_to_shots: false,
            })
            .await?;

        let output = match results {
            SearchResults::Frames(hits) if request.enable_rerank => {
                let outcome = self
                    .rerank_frames(
                        &request.query,
                        &hits,
                        request.top_k_rerank,
                        request.pool_width,
                    )
                    .await?;
                PipelineOutput {
                    results: PipelineResults::RerankedFrames(outcome.hits),
                    skipped: vec![],
                    failed_batches: outcome.failed_batches,
                }
            }
            SearchResults::Shots(hits) if request.enable_rerank => {
                let outcome = self
                    .rerank_shots(
                        &request.query,
                        &hits,
                        request.top_k_rerank,
                        request.pool_width,
                    )
                    .await?;
                PipelineOutput {
                    results: PipelineResults::RerankedShots(outcome.hits),
                    skipped: vec![],
                    failed_batches: outcome.failed_batches,
                }
            }
            SearchResults::Frames(hits) => PipelineOutput {
                results: PipelineResults::Frames(hits),
                skipped: vec![],
                failed_batches: vec![],
            },
            SearchResults::Shots(hits) => PipelineOutput {
                results: PipelineResults::Shots(hits),
                skipped: vec![],
                failed_batches: vec![],
            },
            SearchResults::ShotCandidates(_) => unreachable!("collapse was not requested"),
        };

        info!(results = output.results.len(), "Pipeline run complete");
        Ok(output)
    }

    async fn run_with_refinement(&self, request: &PipelineRequest) -> Result<PipelineOutput> {
        let shot_paths = match request.granularity {
            Granularity::Frame => {
                let results = self
                    .search(&SearchRequest {
                        query: request.query.clone(),
                        modality: request.modality,
                        granularity: Granularity::Frame,
                        top_k: request.top_k,
                        collapse_to_shots: true,
                    })
                    .await?;
                match results {
                    SearchResults::ShotCandidates(paths) => paths,
                    _ => unreachable!("collapse was requested"),
                }
            }
            Granularity::Shot => {
                let results = self
                    .search(&SearchRequest {
                        query: request.query.clone(),
                        modality: request.modality,
                        granularity: Granularity::Shot,
                        top_k: request.top_k,
                        collapse_to_shots: false,
                    })
                    .await?;
                match results {
                    SearchResults::Shots(hits) => hits.into_iter().map(|h| h.path).collect(),
                    _ => unreachable!("shot granularity was requested"),
                }
            }
        };

        let full_query = request.full_query.as_deref().unwrap_or(&request.query);
        let aligned = self.align(&shot_paths, full_query).await?;

        let output = if request.enable_rerank {
            let outcome = self
                .rerank_shots(
                    &request.query,
                    &aligned.hits,
                    request.top_k_rerank,
                    request.pool_width,
                )
                .await?;
            PipelineOutput {
                results: PipelineResults::RerankedShots(outcome.hits),
                skipped: aligned.skipped,
                failed_batches: outcome.failed_batches,
            }
        } else {
            PipelineOutput {
                results: PipelineResults::Shots(aligned.hits),
                skipped: aligned.skipped,
                failed_batches: vec![],
            }
        };

        info!(
            results = output.results.len(),
            skipped = output.skipped.len(),
            "Pipeline run complete"
        );
        Ok(output)
    }
}

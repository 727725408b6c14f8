//! ShotScout Search
//!
//! The retrieval pipeline over the footage catalog:
//! - Candidate search: dense similarity or sparse lexical matching over
//!   frame/shot indexes
//! - Temporal alignment: DP matching of multi-sentence queries against
//!   ordered frame sequences
//! - Rerank fusion: batched external relevance scoring merged back onto the
//!   candidate set
//!
//! Construction is plain dependency injection: build a
//! [`CatalogStore`](shotscout_common::CatalogStore) once, pick an embedder
//! and a scorer, and hand all three to [`RetrievalPipeline`].

pub mod retrieval;

pub use retrieval::pipeline::{
    PipelineOutput, PipelineRequest, PipelineResults, RetrievalPipeline,
};
pub use retrieval::{
    AlignmentOutcome, BatchFailure, FrameHit, FusedHit, MultiModalSearch, PlannedQuery,
    QueryPlanner, RerankFusion, RerankOutcome, RerankSource, SearchRequest, SearchResults,
    ShotHit, SkippedCandidate, TemporalAligner, RERANK_BATCH_SIZE,
};

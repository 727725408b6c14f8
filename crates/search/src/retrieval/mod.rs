//! Three-stage retrieval over the footage catalog
//!
//! - Candidate search (dense similarity or sparse lexical matching)
//! - Temporal alignment of multi-sentence queries against frame sequences
//! - Rerank fusion via an external relevance scorer
//!
//! Stages are independently invocable; a caller may stop after any of them.
//! Scores are comparable within one stage only; each stage carries its own
//! score field and never averages with an earlier one.

mod multimodal;
mod planner;
mod rerank;
mod temporal;

pub mod pipeline;

pub use multimodal::MultiModalSearch;
pub use planner::{PlannedQuery, QueryPlanner};
pub use rerank::{RerankFusion, RerankOutcome, RERANK_BATCH_SIZE};
pub use temporal::{AlignmentOutcome, TemporalAligner};

use serde::{Deserialize, Serialize};
use shotscout_common::catalog::{Frame, Granularity, Modality, Shot};

/// Candidate search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text
    pub query: String,

    /// How the query is matched
    pub modality: Modality,

    /// Which entities are retrieved
    pub granularity: Granularity,

    /// Maximum results to return
    pub top_k: usize,

    /// Collapse frame results to their unique parent shots, first-seen
    /// order, for downstream temporal refinement. Frame granularity only.
    pub collapse_to_shots: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            modality: Modality::Similarity,
            granularity: Granularity::Frame,
            top_k: 50,
            collapse_to_shots: false,
        }
    }
}

/// A retrieved frame with its stage score and full metadata record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameHit {
    pub path: String,
    pub score: f32,
    pub frame_number: u32,
    pub shot_path: String,
    pub source: String,
    pub timestamp: f64,
    pub fps: f64,
    pub caption_short: String,
    pub caption_long: String,
    pub tags: Vec<String>,
}

impl FrameHit {
    pub(crate) fn from_record(frame: &Frame, score: f32) -> Self {
        Self {
            path: frame.path.clone(),
            score,
            frame_number: frame.frame_number,
            shot_path: frame.shot_path.clone(),
            source: frame.source.clone(),
            timestamp: frame.timestamp,
            fps: frame.fps,
            caption_short: frame.caption_short.clone(),
            caption_long: frame.caption_long.clone(),
            tags: frame.tags.clone(),
        }
    }
}

/// A retrieved shot with its stage score and full metadata record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShotHit {
    pub path: String,
    pub score: f32,
    pub shot_id: u32,
    pub fps: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub source: String,
    pub frame_paths: Vec<String>,
    pub caption_short: String,
    pub caption_long: String,
    pub tags: Vec<String>,
}

impl ShotHit {
    pub(crate) fn from_record(shot: &Shot, score: f32) -> Self {
        Self {
            path: shot.path.clone(),
            score,
            shot_id: shot.shot_id,
            fps: shot.fps,
            start_time: shot.start_time,
            end_time: shot.end_time,
            source: shot.source.clone(),
            frame_paths: shot.frame_paths.clone(),
            caption_short: shot.caption_short.clone(),
            caption_long: shot.caption_long.clone(),
            tags: shot.tags.clone(),
        }
    }
}

/// Candidate search output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SearchResults {
    /// Ranked frames, descending score
    Frames(Vec<FrameHit>),
    /// Ranked shots, descending score
    Shots(Vec<ShotHit>),
    /// Unique parent shot paths in first-seen rank order; scores dropped,
    /// the shot set (not its ranking) is what temporal alignment needs
    ShotCandidates(Vec<String>),
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self {
            SearchResults::Frames(v) => v.len(),
            SearchResults::Shots(v) => v.len(),
            SearchResults::ShotCandidates(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A candidate the rerank stage can submit to the relevance scorer
pub trait RerankSource {
    fn path(&self) -> &str;
    fn caption_short(&self) -> &str;
    fn caption_long(&self) -> &str;
}

impl RerankSource for FrameHit {
    fn path(&self) -> &str {
        &self.path
    }
    fn caption_short(&self) -> &str {
        &self.caption_short
    }
    fn caption_long(&self) -> &str {
        &self.caption_long
    }
}

impl RerankSource for ShotHit {
    fn path(&self) -> &str {
        &self.path
    }
    fn caption_short(&self) -> &str {
        &self.caption_short
    }
    fn caption_long(&self) -> &str {
        &self.caption_long
    }
}

/// A scored candidate with the fused relevance verdict attached. The
/// originating record (and its stage score) survives unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedHit<T> {
    pub item: T,
    /// Relevance on the scorer's 0-100 scale
    pub fusion_score: u8,
    pub explanation: String,
}

/// A temporal-alignment candidate that was skipped rather than scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub path: String,
    pub reason: String,
}

/// A rerank batch that was dropped after a scorer failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Zero-based batch ordinal
    pub batch: usize,
    pub reason: String,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use shotscout_common::catalog::{CatalogStore, Granularity, Modality, VectorBlock};
    use shotscout_common::embeddings::Embedder;
    use shotscout_common::errors::Result;

    /// Deterministic embedder: known texts map to canned vectors, anything
    /// else gets the default direction.
    pub struct StubEmbedder {
        pub dim: usize,
        pub map: HashMap<String, Vec<f32>>,
        pub default: Vec<f32>,
    }

    impl Default for StubEmbedder {
        fn default() -> Self {
            Self {
                dim: 2,
                map: HashMap::new(),
                default: vec![1.0, 0.0],
            }
        }
    }

    impl StubEmbedder {
        pub fn with_mapping(entries: &[(&str, Vec<f32>)]) -> Self {
            let dim = entries.first().map(|(_, v)| v.len()).unwrap_or(2);
            Self {
                dim,
                map: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                default: vec![0.0; dim],
            }
        }

        fn lookup(&self, text: &str) -> Vec<f32> {
            self.map
                .get(text.trim())
                .cloned()
                .unwrap_or_else(|| self.default.clone())
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self.lookup(text))
        }

        async fn encode_text_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| self.lookup(t)).collect())
        }

        async fn encode_image(&self, _image: &[u8]) -> Result<Vec<f32>> {
            Ok(self.default.clone())
        }

        fn model_name(&self) -> &str {
            "stub"
        }

        fn dimension(&self) -> usize {
            self.dim
        }
    }

    /// Two-shot catalog in 2d vector space with dense frame and shot
    /// indexes plus the frame-vector block. Against the stub's default
    /// query direction [1, 0] the frames rank S1_F0, S1_F1, S2_F0, S2_F1.
    pub fn catalog_with_frames() -> (Arc<CatalogStore>, Arc<dyn Embedder>) {
        let mut builder = CatalogStore::builder();

        let frame_vectors = [
            vec![1.0_f32, 0.0],
            vec![0.8, 0.6],
            vec![0.6, 0.8],
            vec![0.0, 1.0],
        ];
        let mut frame_paths = Vec::new();
        let mut block_data = Vec::new();

        for shot_id in 1..=2u32 {
            let shot_path = format!("L01/V001/Shot_{shot_id}.mp4");
            let mut frames = Vec::new();
            for f in 0..2u32 {
                let idx = ((shot_id - 1) * 2 + f) as usize;
                let path = format!("L01/V001/S{shot_id}_F{f}.jpg");
                frame_paths.push(path.clone());
                block_data.extend_from_slice(&frame_vectors[idx]);
                frames.push(shotscout_common::catalog::Frame {
                    path,
                    shot_path: shot_path.clone(),
                    frame_number: f,
                    timestamp: f as f64 * 0.4,
                    fps: 25.0,
                    source: "V001".into(),
                    tags: vec![],
                    caption_short: format!("shot {shot_id} frame {f}"),
                    caption_long: format!("long caption, shot {shot_id} frame {f}"),
                });
            }
            let shot = shotscout_common::catalog::Shot {
                path: shot_path,
                shot_id,
                collection: "L01".into(),
                video: "V001".into(),
                frame_paths: frames.iter().map(|fr| fr.path.clone()).collect(),
                start_time: 0.0,
                end_time: 0.8,
                fps: 25.0,
                source: "V001".into(),
                tags: vec![],
                caption_short: format!("shot {shot_id}"),
                caption_long: format!("long caption, shot {shot_id}"),
            };
            builder.add_shot(shot, frames);
        }

        builder.dense_index(
            Modality::Similarity,
            Granularity::Frame,
            2,
            frame_paths.clone(),
            block_data.clone(),
        );
        builder.dense_index(
            Modality::Similarity,
            Granularity::Shot,
            2,
            vec!["L01/V001/Shot_1.mp4".into(), "L01/V001/Shot_2.mp4".into()],
            vec![1.0, 0.0, 0.0, 1.0],
        );
        builder.video_block(
            "L01",
            "V001",
            VectorBlock::new(2, frame_paths, block_data).unwrap(),
        );

        let catalog = Arc::new(builder.build().unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::default());
        (catalog, embedder)
    }
}

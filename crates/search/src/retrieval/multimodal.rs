//! Candidate search
//!
//! Translates a text query plus a retrieval mode into a ranked candidate
//! list: encode the query (dense) or vectorize it (lexical), resolve the
//! registered index, take the top-k, then either enrich every hit with its
//! full metadata record or collapse frame hits to their unique parent shots
//! for temporal refinement.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument};

use shotscout_common::catalog::{CatalogStore, Granularity, Modality, SearchIndex};
use shotscout_common::embeddings::Embedder;
use shotscout_common::errors::{AppError, Result};
use shotscout_common::metrics::record_search;

use super::{FrameHit, SearchRequest, SearchResults, ShotHit};

pub struct MultiModalSearch {
    catalog: Arc<CatalogStore>,
    embedder: Arc<dyn Embedder>,
}

impl MultiModalSearch {
    pub fn new(catalog: Arc<CatalogStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { catalog, embedder }
    }

    /// Run one candidate search. Read-only; returns at most `top_k` results
    /// in strictly non-increasing score order (first-seen rank order when
    /// collapsed).
    #[instrument(skip(self, request), fields(modality = ?request.modality, granularity = ?request.granularity))]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        self.validate(request)?;
        let started = Instant::now();

        let hits = match request.modality {
            Modality::Similarity => {
                let query_vec = self.embedder.encode_text(&request.query).await?;
                let index = self
                    .catalog
                    .index(Modality::Similarity, request.granularity)?;
                match index {
                    SearchIndex::Dense(dense) => dense.search(&query_vec, request.top_k)?,
                    SearchIndex::Lexical(_) => {
                        return Err(AppError::Internal {
                            message: "similarity key resolved to a lexical index".into(),
                        })
                    }
                }
            }
            Modality::Lexical => {
                let index = self.catalog.index(Modality::Lexical, request.granularity)?;
                let vectorizer =
                    self.catalog
                        .vectorizer()
                        .ok_or(AppError::IndexNotFound {
                            modality: Modality::Lexical,
                            granularity: request.granularity,
                        })?;
                let sparse = vectorizer.transform(&request.query);
                match index {
                    SearchIndex::Lexical(lexical) => lexical.search(&sparse, request.top_k),
                    SearchIndex::Dense(_) => {
                        return Err(AppError::Internal {
                            message: "lexical key resolved to a dense index".into(),
                        })
                    }
                }
            }
        };

        debug!(hits = hits.len(), "Index search complete");

        let results = if request.collapse_to_shots {
            SearchResults::ShotCandidates(self.collapse_to_shots(&hits)?)
        } else {
            match request.granularity {
                Granularity::Frame => SearchResults::Frames(self.enrich_frames(&hits)?),
                Granularity::Shot => SearchResults::Shots(self.enrich_shots(&hits)?),
            }
        };

        record_search(
            started.elapsed().as_secs_f64(),
            modality_label(request.modality),
            granularity_label(request.granularity),
            results.len(),
        );
        Ok(results)
    }

    fn validate(&self, request: &SearchRequest) -> Result<()> {
        if request.query.trim().is_empty() {
            return Err(AppError::EmptyQuery);
        }
        if request.top_k == 0 {
            return Err(AppError::Validation {
                message: "top_k must be positive".into(),
            });
        }
        if request.collapse_to_shots && request.granularity != Granularity::Frame {
            return Err(AppError::Validation {
                message: "collapse_to_shots requires frame granularity".into(),
            });
        }
        Ok(())
    }

    /// Map ranked frame hits to their parent shots, keeping the first-seen
    /// order and dropping duplicates and scores.
    fn collapse_to_shots(&self, hits: &[(usize, f32)]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut shot_paths = Vec::new();
        for &(id, _) in hits {
            let frame = self.frame_record(id)?;
            if seen.insert(frame.shot_path.clone()) {
                shot_paths.push(frame.shot_path.clone());
            }
        }
        Ok(shot_paths)
    }

    fn enrich_frames(&self, hits: &[(usize, f32)]) -> Result<Vec<FrameHit>> {
        hits.iter()
            .map(|&(id, score)| Ok(FrameHit::from_record(self.frame_record(id)?, score)))
            .collect()
    }

    fn enrich_shots(&self, hits: &[(usize, f32)]) -> Result<Vec<ShotHit>> {
        hits.iter()
            .map(|&(id, score)| {
                let shot = self.catalog.shot_by_id(id).ok_or_else(|| AppError::Internal {
                    message: format!("index returned unknown shot id {id}"),
                })?;
                Ok(ShotHit::from_record(shot, score))
            })
            .collect()
    }

    fn frame_record(&self, id: usize) -> Result<&shotscout_common::catalog::Frame> {
        self.catalog.frame_by_id(id).ok_or_else(|| AppError::Internal {
            message: format!("index returned unknown frame id {id}"),
        })
    }
}

fn modality_label(modality: Modality) -> &'static str {
    match modality {
        Modality::Similarity => "similarity",
        Modality::Lexical => "lexical",
    }
}

fn granularity_label(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Frame => "frame",
        Granularity::Shot => "shot",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::test_support::{catalog_with_frames, StubEmbedder};
    use shotscout_common::catalog::{CsrFile, CsrMatrix, Vectorizer, VectorizerFile};
    use std::collections::HashMap;

    fn request(modality: Modality, granularity: Granularity, top_k: usize) -> SearchRequest {
        SearchRequest {
            query: "flood".into(),
            modality,
            granularity,
            top_k,
            collapse_to_shots: false,
        }
    }

    #[tokio::test]
    async fn test_similarity_scores_non_increasing() {
        let (catalog, embedder) = catalog_with_frames();
        let search = MultiModalSearch::new(catalog, embedder);
        let results = search
            .search(&request(Modality::Similarity, Granularity::Frame, 10))
            .await
            .unwrap();
        let SearchResults::Frames(hits) = results else {
            panic!("expected frame hits");
        };
        assert!(!hits.is_empty());
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_collapse_dedupes_preserving_first_seen_order() {
        let (catalog, embedder) = catalog_with_frames();
        let search = MultiModalSearch::new(catalog, embedder);
        let mut req = request(Modality::Similarity, Granularity::Frame, 10);
        req.collapse_to_shots = true;
        let results = search.search(&req).await.unwrap();
        let SearchResults::ShotCandidates(paths) = results else {
            panic!("expected shot candidates");
        };
        let unique: HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
        // Both test shots are represented, best-ranked shot first
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], "L01/V001/Shot_1.mp4");
    }

    #[tokio::test]
    async fn test_lexical_shot_is_index_not_found() {
        let (catalog, embedder) = catalog_with_frames();
        let search = MultiModalSearch::new(catalog, embedder);
        let err = search
            .search(&request(Modality::Lexical, Granularity::Shot, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IndexNotFound { .. }));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (catalog, embedder) = catalog_with_frames();
        let search = MultiModalSearch::new(catalog, embedder);
        let mut req = request(Modality::Similarity, Granularity::Frame, 10);
        req.query = "   ".into();
        assert!(matches!(
            search.search(&req).await.unwrap_err(),
            AppError::EmptyQuery
        ));
    }

    #[tokio::test]
    async fn test_collapse_at_shot_granularity_rejected() {
        let (catalog, embedder) = catalog_with_frames();
        let search = MultiModalSearch::new(catalog, embedder);
        let mut req = request(Modality::Similarity, Granularity::Shot, 10);
        req.collapse_to_shots = true;
        assert!(matches!(
            search.search(&req).await.unwrap_err(),
            AppError::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn test_lexical_flood_example() {
        // Catalog of three one-frame shots A/B/C whose lexical rows have
        // cosine 0.8 / 0.5 / 0.1 against a "flood" query; top_k = 2 must
        // return A then B.
        let mut builder = CatalogStore::builder();
        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            let shot_path = format!("L01/V001/Shot_{name}.mp4");
            let frame = shotscout_common::catalog::Frame {
                path: format!("{name}.jpg"),
                shot_path: shot_path.clone(),
                frame_number: i as u32,
                timestamp: i as f64,
                fps: 25.0,
                source: "V001".into(),
                tags: vec![],
                caption_short: format!("frame {name}"),
                caption_long: String::new(),
            };
            let shot = shotscout_common::catalog::Shot {
                path: shot_path,
                shot_id: i as u32,
                collection: "L01".into(),
                video: "V001".into(),
                frame_paths: vec![frame.path.clone()],
                start_time: 0.0,
                end_time: 1.0,
                fps: 25.0,
                source: "V001".into(),
                tags: vec![],
                caption_short: String::new(),
                caption_long: String::new(),
            };
            builder.add_shot(shot, vec![frame]);
        }

        let matrix = CsrMatrix::from_file(CsrFile {
            cols: 2,
            indptr: vec![0, 2, 4, 6],
            indices: vec![0, 1, 0, 1, 0, 1],
            data: vec![0.8, 0.6, 0.5, 0.866, 0.1, 0.995],
        })
        .unwrap();
        let mut vocabulary = HashMap::new();
        vocabulary.insert("flood".to_string(), 0u32);
        let vectorizer = Vectorizer::from_file(VectorizerFile {
            vocabulary,
            idf: vec![1.0, 1.0],
        })
        .unwrap();
        builder.lexical_index(
            matrix,
            vec!["A.jpg".into(), "B.jpg".into(), "C.jpg".into()],
            vectorizer,
        );
        let catalog = Arc::new(builder.build().unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::default());

        let search = MultiModalSearch::new(catalog, embedder);
        let results = search
            .search(&request(Modality::Lexical, Granularity::Frame, 2))
            .await
            .unwrap();
        let SearchResults::Frames(hits) = results else {
            panic!("expected frame hits");
        };
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "A.jpg");
        assert_eq!(hits[1].path, "B.jpg");
        assert!((hits[0].score - 0.8).abs() < 1e-3);
        assert!((hits[1].score - 0.5).abs() < 1e-3);
    }
}

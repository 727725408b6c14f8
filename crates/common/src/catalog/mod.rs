//! In-memory catalog of the footage archive
//!
//! The store is populated once at startup via [`CatalogStore::load`] and is
//! read-only
//! for the remainder of the process: no locks are needed after load, and no
//! stage mutates it. It owns every frame and shot record, the registered
//! search indexes, the lexical vectorizer, and the per-(collection, video)
//! frame-vector blocks used by temporal alignment.

mod index;
mod lexical;
mod loader;
mod models;

pub use index::{DenseIndex, Granularity, IndexKey, Modality, SearchIndex};
pub use lexical::{tokenize, CsrFile, CsrMatrix, LexicalIndex, SparseVector, Vectorizer, VectorizerFile};
pub use models::{Frame, PartitionFrame, PartitionShot, Shot};

use std::collections::HashMap;

use crate::config::CatalogConfig;
use crate::errors::{AppError, Result};

/// Ordered frame paths plus their matching vectors for one source video.
#[derive(Debug)]
pub struct VectorBlock {
    dim: usize,
    paths: Vec<String>,
    by_path: HashMap<String, usize>,
    /// `paths.len() * dim` values, row-major, L2-normalized rows
    data: Vec<f32>,
}

impl VectorBlock {
    pub fn new(dim: usize, paths: Vec<String>, data: Vec<f32>) -> Result<Self> {
        if data.len() != paths.len() * dim {
            return Err(AppError::CatalogInconsistent {
                message: format!(
                    "vector block holds {} values, expected {} rows x {} dims",
                    data.len(),
                    paths.len(),
                    dim
                ),
            });
        }
        let by_path = paths
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), i))
            .collect();
        Ok(Self {
            dim,
            paths,
            by_path,
            data,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Vector for one frame path, if the block covers it.
    pub fn vector(&self, path: &str) -> Option<&[f32]> {
        self.by_path
            .get(path)
            .map(|&i| &self.data[i * self.dim..(i + 1) * self.dim])
    }
}

/// Read-only, in-memory snapshot of all per-frame and per-shot metadata,
/// captions and search indexes.
#[derive(Debug)]
pub struct CatalogStore {
    frames: Vec<Frame>,
    frame_ids: HashMap<String, usize>,
    shots: Vec<Shot>,
    shot_ids: HashMap<String, usize>,
    indexes: HashMap<IndexKey, SearchIndex>,
    blocks: HashMap<(String, String), VectorBlock>,
    vectorizer: Option<Vectorizer>,
}

impl CatalogStore {
    /// Populate the store from the archive directories. Each source
    /// partition is one unit of bounded-pool work; any missing or malformed
    /// required source is fatal.
    pub async fn load(config: &CatalogConfig, max_workers: usize) -> Result<Self> {
        loader::load(config, max_workers).await
    }

    /// Start building an in-memory store. `load` uses the same builder, so
    /// embedded and test stores satisfy identical invariants.
    pub fn builder() -> CatalogStoreBuilder {
        CatalogStoreBuilder::default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn shot_count(&self) -> usize {
        self.shots.len()
    }

    /// Frame metadata by path.
    pub fn frame(&self, path: &str) -> Result<&Frame> {
        self.frame_ids
            .get(path)
            .map(|&i| &self.frames[i])
            .ok_or_else(|| AppError::FrameNotFound { path: path.into() })
    }

    /// Shot metadata by path.
    pub fn shot(&self, path: &str) -> Result<&Shot> {
        self.shot_ids
            .get(path)
            .map(|&i| &self.shots[i])
            .ok_or_else(|| AppError::ShotNotFound { path: path.into() })
    }

    /// Frame metadata by dense catalog id (index search results).
    pub fn frame_by_id(&self, id: usize) -> Option<&Frame> {
        self.frames.get(id)
    }

    /// Shot metadata by dense catalog id (index search results).
    pub fn shot_by_id(&self, id: usize) -> Option<&Shot> {
        self.shots.get(id)
    }

    /// The registered index for a (modality, granularity) pair. Only
    /// combinations that exist in the archive are registered; lexical search
    /// is frame-granularity only.
    pub fn index(&self, modality: Modality, granularity: Granularity) -> Result<&SearchIndex> {
        self.indexes
            .get(&(modality, granularity))
            .ok_or(AppError::IndexNotFound {
                modality,
                granularity,
            })
    }

    /// The frame-vector block for one source video.
    pub fn video_block(&self, collection: &str, video: &str) -> Result<&VectorBlock> {
        self.blocks
            .get(&(collection.to_string(), video.to_string()))
            .ok_or_else(|| AppError::BlockNotFound {
                collection: collection.into(),
                video: video.into(),
            })
    }

    /// A frame's embedding vector, resolved through its video's block.
    pub fn frame_vector(&self, path: &str) -> Result<Option<&[f32]>> {
        let frame = self.frame(path)?;
        let shot = self.shot(&frame.shot_path)?;
        match self.blocks.get(&(shot.collection.clone(), shot.video.clone())) {
            Some(block) => Ok(block.vector(path)),
            None => Ok(None),
        }
    }

    /// The lexical query vectorizer, present iff the lexical index is
    /// registered.
    pub fn vectorizer(&self) -> Option<&Vectorizer> {
        self.vectorizer.as_ref()
    }
}

/// Staged dense-index input: manifest paths still to be resolved against the
/// assembled catalog.
struct PendingDenseIndex {
    key: IndexKey,
    dim: usize,
    paths: Vec<String>,
    data: Vec<f32>,
    source_path: String,
}

/// Staged lexical input.
struct PendingLexical {
    matrix: CsrMatrix,
    paths: Vec<String>,
    vectorizer: Vectorizer,
    source_path: String,
}

/// Builds a [`CatalogStore`], enforcing the load-time invariants: non-empty
/// shots, unique paths, every index row resolvable to a catalog record.
#[derive(Default)]
pub struct CatalogStoreBuilder {
    shots: Vec<Shot>,
    frames: Vec<Frame>,
    dense: Vec<PendingDenseIndex>,
    lexical: Option<PendingLexical>,
    blocks: HashMap<(String, String), VectorBlock>,
}

impl CatalogStoreBuilder {
    /// Add one shot with its member frames (as parsed from a partition).
    pub fn add_shot(&mut self, shot: Shot, frames: Vec<Frame>) -> &mut Self {
        self.shots.push(shot);
        self.frames.extend(frames);
        self
    }

    /// Register a dense similarity index from entity paths and their
    /// vectors; paths are resolved to catalog ids at `build` time.
    pub fn dense_index(
        &mut self,
        modality: Modality,
        granularity: Granularity,
        dim: usize,
        paths: Vec<String>,
        data: Vec<f32>,
    ) -> &mut Self {
        self.dense.push(PendingDenseIndex {
            key: (modality, granularity),
            dim,
            paths,
            data,
            source_path: "<memory>".into(),
        });
        self
    }

    pub(crate) fn dense_index_from(
        &mut self,
        key: IndexKey,
        dim: usize,
        paths: Vec<String>,
        data: Vec<f32>,
        source_path: String,
    ) -> &mut Self {
        self.dense.push(PendingDenseIndex {
            key,
            dim,
            paths,
            data,
            source_path,
        });
        self
    }

    /// Register the frame-granularity lexical index.
    pub fn lexical_index(
        &mut self,
        matrix: CsrMatrix,
        paths: Vec<String>,
        vectorizer: Vectorizer,
    ) -> &mut Self {
        self.lexical = Some(PendingLexical {
            matrix,
            paths,
            vectorizer,
            source_path: "<memory>".into(),
        });
        self
    }

    pub(crate) fn lexical_index_from(
        &mut self,
        matrix: CsrMatrix,
        paths: Vec<String>,
        vectorizer: Vectorizer,
        source_path: String,
    ) -> &mut Self {
        self.lexical = Some(PendingLexical {
            matrix,
            paths,
            vectorizer,
            source_path,
        });
        self
    }

    /// Register the frame-vector block for one source video.
    pub fn video_block(
        &mut self,
        collection: &str,
        video: &str,
        block: VectorBlock,
    ) -> &mut Self {
        self.blocks
            .insert((collection.to_string(), video.to_string()), block);
        self
    }

    pub fn build(self) -> Result<CatalogStore> {
        let mut frame_ids = HashMap::with_capacity(self.frames.len());
        for (i, frame) in self.frames.iter().enumerate() {
            if frame_ids.insert(frame.path.clone(), i).is_some() {
                return Err(AppError::CatalogInconsistent {
                    message: format!("frame '{}' appears in more than one shot", frame.path),
                });
            }
        }

        let mut shot_ids = HashMap::with_capacity(self.shots.len());
        for (i, shot) in self.shots.iter().enumerate() {
            if shot.frame_paths.is_empty() {
                return Err(AppError::CatalogInconsistent {
                    message: format!("shot '{}' has no frames", shot.path),
                });
            }
            for fp in &shot.frame_paths {
                match frame_ids.get(fp) {
                    Some(&fid) if self.frames[fid].shot_path == shot.path => {}
                    _ => {
                        return Err(AppError::CatalogInconsistent {
                            message: format!(
                                "shot '{}' references frame '{}' it does not own",
                                shot.path, fp
                            ),
                        })
                    }
                }
            }
            if shot_ids.insert(shot.path.clone(), i).is_some() {
                return Err(AppError::CatalogInconsistent {
                    message: format!("shot '{}' appears in more than one partition", shot.path),
                });
            }
        }

        let mut indexes = HashMap::new();
        for pending in self.dense {
            let ids = resolve_rows(
                &pending.paths,
                pending.key.1,
                &frame_ids,
                &shot_ids,
                &pending.source_path,
            )?;
            let dense = DenseIndex::new(pending.dim, ids, pending.data)?;
            indexes.insert(pending.key, SearchIndex::Dense(dense));
        }

        let mut vectorizer = None;
        if let Some(pending) = self.lexical {
            let ids = resolve_rows(
                &pending.paths,
                Granularity::Frame,
                &frame_ids,
                &shot_ids,
                &pending.source_path,
            )?;
            let lex = LexicalIndex::new(pending.matrix, ids)?;
            indexes.insert((Modality::Lexical, Granularity::Frame), SearchIndex::Lexical(lex));
            vectorizer = Some(pending.vectorizer);
        }

        Ok(CatalogStore {
            frames: self.frames,
            frame_ids,
            shots: self.shots,
            shot_ids,
            indexes,
            blocks: self.blocks,
            vectorizer,
        })
    }
}

/// Map index-artifact row paths onto catalog ids; an unresolvable path means
/// the index and the metadata disagree, which is fatal.
fn resolve_rows(
    paths: &[String],
    granularity: Granularity,
    frame_ids: &HashMap<String, usize>,
    shot_ids: &HashMap<String, usize>,
    source_path: &str,
) -> Result<Vec<u32>> {
    let lookup = match granularity {
        Granularity::Frame => frame_ids,
        Granularity::Shot => shot_ids,
    };
    paths
        .iter()
        .map(|p| {
            lookup.get(p).map(|&i| i as u32).ok_or_else(|| {
                AppError::CatalogSource {
                    source_path: source_path.to_string(),
                    message: format!("index row '{}' is not in the catalog", p),
                }
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// One shot with `n` orthogonal test frames under the given video.
    pub fn sample_shot(collection: &str, video: &str, shot_id: u32, n: usize) -> (Shot, Vec<Frame>) {
        let shot_path = format!("{collection}/{video}/Shot_{shot_id}.mp4");
        let frames: Vec<Frame> = (0..n)
            .map(|i| Frame {
                path: format!("{collection}/{video}/S{shot_id}_F{i}.jpg"),
                shot_path: shot_path.clone(),
                frame_number: i as u32,
                timestamp: i as f64 * 0.5,
                fps: 25.0,
                source: video.to_string(),
                tags: vec![],
                caption_short: format!("frame {i}"),
                caption_long: format!("long caption for frame {i}"),
            })
            .collect();
        let shot = Shot {
            path: shot_path,
            shot_id,
            collection: collection.to_string(),
            video: video.to_string(),
            frame_paths: frames.iter().map(|f| f.path.clone()).collect(),
            start_time: 0.0,
            end_time: n as f64 * 0.5,
            fps: 25.0,
            source: video.to_string(),
            tags: vec![],
            caption_short: format!("shot {shot_id}"),
            caption_long: format!("long caption for shot {shot_id}"),
        };
        (shot, frames)
    }
}

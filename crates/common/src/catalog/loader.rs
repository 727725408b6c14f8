//! Catalog loading
//!
//! Each source partition is one unit of work; partitions own disjoint path
//! spaces, so the fan-out is a bounded pool with no shared mutable state.
//! Any unreadable or malformed required source aborts the load; the process
//! must not serve queries over a partially consistent catalog.

use std::fs;
use std::path::{Path, PathBuf};

use futures::{stream, StreamExt};
use tracing::{debug, info};

use crate::config::CatalogConfig;
use crate::errors::{AppError, Result};

use super::lexical::{CsrFile, CsrMatrix, Vectorizer, VectorizerFile};
use super::models::PartitionShot;
use super::{CatalogStore, Granularity, IndexKey, Modality, VectorBlock};

/// Dense index artifacts looked for under the index directory. Absent files
/// leave the combination unregistered; present-but-malformed is fatal.
const DENSE_INDEX_FILES: &[(IndexKey, &str)] = &[
    ((Modality::Similarity, Granularity::Frame), "sim_frame"),
    ((Modality::Similarity, Granularity::Shot), "sim_shot"),
];

/// Manifest sitting next to every raw `f32` vector block.
#[derive(serde::Deserialize)]
struct BlockManifest {
    dim: usize,
    paths: Vec<String>,
}

/// Populate a [`CatalogStore`] from the archive directories.
pub(super) async fn load(config: &CatalogConfig, max_workers: usize) -> Result<CatalogStore> {
    let max_workers = max_workers.max(1);
    let mut builder = CatalogStore::builder();

    // Shot partitions: <shots_dir>/<collection>/<video>.json
    let partition_files = scan_partitions(&config.shots_dir())?;
    info!(partitions = partition_files.len(), "Loading shot partitions");
    let partitions = run_pool(partition_files, max_workers, |path| {
        let (collection, video) = partition_key(&path)?;
        let shots = parse_partition_file(&path)?;
        Ok((collection, video, shots))
    })
    .await?;
    for (collection, video, shots) in partitions {
        for shot in shots {
            let (shot, frames) = shot.into_records(&collection, &video);
            builder.add_shot(shot, frames);
        }
    }

    // Frame-vector blocks: <vectors_dir>/<collection>/<video>.{json,f32}
    let block_files = scan_partitions(&config.vectors_dir())?;
    info!(blocks = block_files.len(), "Loading frame-vector blocks");
    let blocks = run_pool(block_files, max_workers, |path| {
        let (collection, video) = partition_key(&path)?;
        let (dim, paths, data) = read_vector_block(&path)?;
        let block = VectorBlock::new(dim, paths, data)?;
        Ok((collection, video, block))
    })
    .await?;
    for (collection, video, block) in blocks {
        builder.video_block(&collection, &video, block);
    }

    // Dense similarity indexes
    let index_dir = config.index_dir();
    for &(key, stem) in DENSE_INDEX_FILES {
        let manifest_path = index_dir.join(format!("{stem}.json"));
        if !manifest_path.exists() {
            debug!(index = stem, "Dense index not present, skipping");
            continue;
        }
        let (dim, paths, data) = read_vector_block(&manifest_path)?;
        info!(index = stem, rows = paths.len(), dim, "Loaded dense index");
        builder.dense_index_from(key, dim, paths, data, display(&manifest_path));
    }

    // Lexical artifacts: all three files or none
    let lexical_dir = config.lexical_dir();
    if lexical_dir.exists() {
        let matrix_path = lexical_dir.join("matrix.json");
        let paths_path = lexical_dir.join("paths.json");
        let vectorizer_path = lexical_dir.join("vectorizer.json");

        let matrix_file: CsrFile = read_json(&matrix_path)?;
        let matrix = CsrMatrix::from_file(matrix_file)?;
        let paths: Vec<String> = read_json(&paths_path)?;
        let vectorizer_file: VectorizerFile = read_json(&vectorizer_path)?;
        let vectorizer = Vectorizer::from_file(vectorizer_file)?;
        info!(rows = paths.len(), terms = vectorizer.dim(), "Loaded lexical index");
        builder.lexical_index_from(matrix, paths, vectorizer, display(&matrix_path));
    } else {
        debug!("Lexical directory not present, lexical search unavailable");
    }

    let store = builder.build()?;
    info!(
        frames = store.frame_count(),
        shots = store.shot_count(),
        "Catalog load complete"
    );
    Ok(store)
}

/// Run one blocking job per input path through a bounded worker pool.
async fn run_pool<T, F>(paths: Vec<PathBuf>, width: usize, job: F) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(PathBuf) -> Result<T> + Clone + Send + Sync + 'static,
{
    let results: Vec<Result<T>> = stream::iter(paths)
        .map(|path| {
            let job = job.clone();
            async move {
                tokio::task::spawn_blocking(move || job(path))
                    .await
                    .map_err(|e| AppError::Internal {
                        message: format!("catalog load task panicked: {e}"),
                    })?
            }
        })
        .buffer_unordered(width)
        .collect()
        .await;

    results.into_iter().collect()
}

/// Find `<collection>/<name>.json` partition files under a root.
fn scan_partitions(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(root).map_err(|e| AppError::CatalogSource {
        source_path: display(root),
        message: e.to_string(),
    })?;
    for entry in entries {
        let dir = entry
            .map_err(|e| AppError::CatalogSource {
                source_path: display(root),
                message: e.to_string(),
            })?
            .path();
        if !dir.is_dir() {
            continue;
        }
        let children = fs::read_dir(&dir).map_err(|e| AppError::CatalogSource {
            source_path: display(&dir),
            message: e.to_string(),
        })?;
        for child in children {
            let path = child
                .map_err(|e| AppError::CatalogSource {
                    source_path: display(&dir),
                    message: e.to_string(),
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Derive the `(collection, video)` key from a partition file location.
fn partition_key(path: &Path) -> Result<(String, String)> {
    let video = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string);
    let collection = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|s| s.to_str())
        .map(str::to_string);
    match (collection, video) {
        (Some(c), Some(v)) => Ok((c, v)),
        _ => Err(AppError::CatalogSource {
            source_path: display(path),
            message: "expected <collection>/<video>.json layout".into(),
        }),
    }
}

fn parse_partition_file(path: &Path) -> Result<Vec<PartitionShot>> {
    let text = fs::read_to_string(path).map_err(|e| AppError::CatalogSource {
        source_path: display(path),
        message: e.to_string(),
    })?;
    parse_partition(&text).map_err(|e| AppError::CatalogSource {
        source_path: display(path),
        message: e.to_string(),
    })
}

/// Parse one partition body.
pub fn parse_partition(text: &str) -> serde_json::Result<Vec<PartitionShot>> {
    serde_json::from_str(text)
}

/// Read a `<name>.json` manifest and its sibling `<name>.f32` block.
fn read_vector_block(manifest_path: &Path) -> Result<(usize, Vec<String>, Vec<f32>)> {
    let manifest: BlockManifest = read_json(manifest_path)?;
    if manifest.dim == 0 {
        return Err(AppError::CatalogSource {
            source_path: display(manifest_path),
            message: "vector dimension must be positive".into(),
        });
    }
    let block_path = manifest_path.with_extension("f32");
    let bytes = fs::read(&block_path).map_err(|e| AppError::CatalogSource {
        source_path: display(&block_path),
        message: e.to_string(),
    })?;
    let data = decode_f32_block(&bytes).map_err(|message| AppError::CatalogSource {
        source_path: display(&block_path),
        message,
    })?;
    if data.len() != manifest.dim * manifest.paths.len() {
        return Err(AppError::CatalogSource {
            source_path: display(&block_path),
            message: format!(
                "block holds {} values, manifest expects {} rows x {} dims",
                data.len(),
                manifest.paths.len(),
                manifest.dim
            ),
        });
    }
    Ok((manifest.dim, manifest.paths, data))
}

/// Decode a little-endian `f32` block.
pub fn decode_f32_block(bytes: &[u8]) -> std::result::Result<Vec<f32>, String> {
    if bytes.len() % 4 != 0 {
        return Err(format!("block length {} is not a multiple of 4", bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| AppError::CatalogSource {
        source_path: display(path),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| AppError::CatalogSource {
        source_path: display(path),
        message: e.to_string(),
    })
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partition() {
        let text = r#"[
            {
                "path": "L01/V001/Shot_0.mp4",
                "shot_id": 0,
                "start_time": 0.0,
                "end_time": 3.2,
                "fps": 25.0,
                "source": "V001",
                "tags": ["weather"],
                "caption_short": "a flooded street",
                "caption_long": "a street flooded after heavy rain, cars submerged",
                "frames": [
                    {
                        "path": "L01/V001/F000.jpg",
                        "frame_number": 0,
                        "timestamp": 0.0,
                        "caption_short": "flooded street",
                        "caption_long": "wide angle of a flooded street"
                    }
                ]
            }
        ]"#;
        let shots = parse_partition(text).unwrap();
        assert_eq!(shots.len(), 1);
        let (shot, frames) = shots[0].clone().into_records("L01", "V001");
        assert_eq!(shot.collection, "L01");
        assert_eq!(shot.frame_paths, vec!["L01/V001/F000.jpg"]);
        assert_eq!(frames[0].fps, 25.0);
        assert_eq!(frames[0].source, "V001");
    }

    #[test]
    fn test_parse_partition_missing_field_fails() {
        let text = r#"[{"path": "L01/V001/Shot_0.mp4", "shot_id": 0}]"#;
        assert!(parse_partition(text).is_err());
    }

    #[test]
    fn test_decode_f32_block_roundtrip() {
        let values = [1.0_f32, -0.5, 0.25];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(decode_f32_block(&bytes).unwrap(), values);
    }

    #[test]
    fn test_decode_f32_block_rejects_truncation() {
        assert!(decode_f32_block(&[0, 0, 0]).is_err());
    }

    #[test]
    fn test_partition_key() {
        let (c, v) = partition_key(Path::new("/data/shots/L01/V003.json")).unwrap();
        assert_eq!((c.as_str(), v.as_str()), ("L01", "V003"));
    }
}

//! Catalog entity records
//!
//! Frames and shots are immutable once loaded and owned exclusively by the
//! [`CatalogStore`](super::CatalogStore); everything else holds paths or
//! dense catalog ids into it.

use serde::{Deserialize, Serialize};

/// A single extracted image sampled from a source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Archive-relative frame path, the frame's identity
    pub path: String,

    /// Parent shot path (back-reference; the shot owns the membership list)
    pub shot_path: String,

    /// Ordinal position of the frame within its source video
    pub frame_number: u32,

    /// Seconds from the start of the source video
    pub timestamp: f64,

    /// Source video frame rate
    pub fps: f64,

    /// Source video identifier
    pub source: String,

    /// Editorial tags
    pub tags: Vec<String>,

    /// Short factual caption
    pub caption_short: String,

    /// Longer free-form caption
    pub caption_long: String,
}

/// A contiguous, fixed-length ordered sequence of frames representing one
/// coherent camera take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shot {
    /// Archive-relative shot path, the shot's identity
    pub path: String,

    /// Shot ordinal within its source video
    pub shot_id: u32,

    /// Archive collection the shot belongs to (e.g. "L01")
    pub collection: String,

    /// Video the shot was cut from (e.g. "V001")
    pub video: String,

    /// Ordered member frame paths; never empty
    pub frame_paths: Vec<String>,

    /// Shot start, seconds from the start of the source video
    pub start_time: f64,

    /// Shot end, seconds from the start of the source video
    pub end_time: f64,

    /// Source video frame rate
    pub fps: f64,

    /// Source video identifier
    pub source: String,

    /// Editorial tags
    pub tags: Vec<String>,

    /// Short factual caption
    pub caption_short: String,

    /// Longer free-form caption
    pub caption_long: String,
}

/// On-disk shot record inside a partition file. Frames are inlined so one
/// partition fully owns its key space.
#[derive(Debug, Clone, Deserialize)]
pub struct PartitionShot {
    pub path: String,
    pub shot_id: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub fps: f64,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub caption_short: String,
    pub caption_long: String,
    pub frames: Vec<PartitionFrame>,
}

/// On-disk frame record inside a partition file.
#[derive(Debug, Clone, Deserialize)]
pub struct PartitionFrame {
    pub path: String,
    pub frame_number: u32,
    pub timestamp: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub caption_short: String,
    pub caption_long: String,
}

impl PartitionShot {
    /// Build the owned shot plus its frames for a given partition location.
    pub(crate) fn into_records(self, collection: &str, video: &str) -> (Shot, Vec<Frame>) {
        let frames: Vec<Frame> = self
            .frames
            .iter()
            .map(|f| Frame {
                path: f.path.clone(),
                shot_path: self.path.clone(),
                frame_number: f.frame_number,
                timestamp: f.timestamp,
                fps: self.fps,
                source: self.source.clone(),
                tags: f.tags.clone(),
                caption_short: f.caption_short.clone(),
                caption_long: f.caption_long.clone(),
            })
            .collect();

        let shot = Shot {
            path: self.path,
            shot_id: self.shot_id,
            collection: collection.to_string(),
            video: video.to_string(),
            frame_paths: frames.iter().map(|f| f.path.clone()).collect(),
            start_time: self.start_time,
            end_time: self.end_time,
            fps: self.fps,
            source: self.source,
            tags: self.tags,
            caption_short: self.caption_short,
            caption_long: self.caption_long,
        };

        (shot, frames)
    }
}

pub mod compositor;
pub mod enhance;
pub mod geometry;
pub mod pipeline;
pub mod tiers;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("invalid geometry: {0}")]
    Geometry(String),
    #[error("enhancement failed: {0}")]
    Enhance(String),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image worker failed: {0}")]
    Worker(String),
    #[error("image processing timed out after {0:?}")]
    Timeout(Duration),
}

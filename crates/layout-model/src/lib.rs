//! DuoFeed Layout Model
//!
//! Defines the core data contracts for multi-feed compositing:
//! - **Geometry:** Canvas size, feed placement rectangles, crop insets
//! - **Feed:** Capture sources and the live per-feed compositing state
//! - **Policy:** Pure layout functions mapping a canvas to feed geometries
//!
//! All coordinates are integer pixels in output-canvas space.

pub mod applied;
pub mod feed;
pub mod geometry;
pub mod policy;

pub use applied::*;
pub use feed::*;
pub use geometry::*;
pub use policy::*;

/// Errors produced while parsing model values from configuration or CLI text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("unknown codec '{0}' (expected mjpeg, raw or h264)")]
    UnknownCodec(String),

    #[error("unknown layout policy '{0}' (expected equal-split, overlay or manual)")]
    UnknownPolicy(String),

    #[error("unknown crop edge '{0}' (expected left, right, top or bottom)")]
    UnknownEdge(String),

    #[error("invalid size '{0}' (expected WIDTHxHEIGHT, e.g. 1920x1080)")]
    InvalidSize(String),
}

//! Capture sources and per-feed compositing state.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geometry::{CropInsets, Geometry};
use crate::ModelError;

/// How a device delivers frames, which decides the decode chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureCodec {
    /// Motion JPEG (`image/jpeg`), decoded with `jpegdec`.
    #[default]
    Mjpeg,
    /// Uncompressed `video/x-raw`.
    Raw,
    /// H.264 elementary stream, parsed and decoded in software.
    H264,
}

impl fmt::Display for CaptureCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CaptureCodec::Mjpeg => "mjpeg",
            CaptureCodec::Raw => "raw",
            CaptureCodec::H264 => "h264",
        })
    }
}

impl FromStr for CaptureCodec {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mjpeg" | "mjpg" | "jpeg" => Ok(CaptureCodec::Mjpeg),
            "raw" | "yuyv" => Ok(CaptureCodec::Raw),
            "h264" | "avc" => Ok(CaptureCodec::H264),
            _ => Err(ModelError::UnknownCodec(s.to_string())),
        }
    }
}

/// Requested capture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub codec: CaptureCodec,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            codec: CaptureCodec::Mjpeg,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// A validated capture device plus the format requested from it.
///
/// Immutable once bound into a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSource {
    /// Identifier as the operator supplied it (`video0`).
    pub id: String,
    /// Canonical device path (`/dev/video0`).
    pub path: PathBuf,
    pub format: CaptureFormat,
}

/// Stable feed identifier, `feed<N>` by registration index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedName(String);

impl FeedName {
    pub fn from_index(index: usize) -> Self {
        Self(format!("feed{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Live compositing state of one feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub name: FeedName,

    /// Registration index; breaks z-order ties.
    pub index: usize,

    /// Source frame size the crop is validated against.
    pub source_width: u32,
    pub source_height: u32,

    pub crop: CropInsets,

    /// Current placement on the canvas.
    pub geometry: Geometry,

    /// Geometry from the last auto-layout pass; zoom is relative to this.
    pub base_geometry: Geometry,

    /// Opacity in `[0, 1]`.
    pub alpha: f64,

    /// Higher draws on top.
    pub z_order: u32,

    /// Multiplier on `base_geometry` size.
    pub zoom: f64,
}

impl Feed {
    /// Create a feed for the source at `index`, initially covering `geometry`.
    pub fn new(index: usize, source: &CaptureSource, crop: CropInsets, geometry: Geometry) -> Self {
        Self {
            name: FeedName::from_index(index),
            index,
            source_width: source.format.width,
            source_height: source.format.height,
            crop: crop.clamped(source.format.width, source.format.height),
            geometry,
            base_geometry: geometry,
            alpha: 1.0,
            z_order: index as u32,
            zoom: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> CaptureSource {
        CaptureSource {
            id: "video0".to_string(),
            path: PathBuf::from("/dev/video0"),
            format: CaptureFormat {
                width: 640,
                height: 480,
                ..CaptureFormat::default()
            },
        }
    }

    #[test]
    fn test_feed_names_follow_registration() {
        assert_eq!(FeedName::from_index(1).as_str(), "feed1");
        assert_eq!(FeedName::from("feed0"), FeedName::from_index(0));
    }

    #[test]
    fn test_new_feed_clamps_initial_crop() {
        let feed = Feed::new(
            1,
            &source(),
            CropInsets::new(700, 0, 0, 0),
            Geometry::new(0, 0, 10, 10),
        );
        assert_eq!(feed.crop.left, 639);
        assert_eq!(feed.z_order, 1);
        assert_eq!(feed.base_geometry, feed.geometry);
    }

    #[test]
    fn test_codec_parse() {
        assert_eq!("MJPG".parse::<CaptureCodec>().unwrap(), CaptureCodec::Mjpeg);
        assert_eq!("h264".parse::<CaptureCodec>().unwrap(), CaptureCodec::H264);
        assert!("vp9".parse::<CaptureCodec>().is_err());
    }
}

//! Declarative graph descriptions.
//!
//! A description is the line-oriented `gst-launch` text for the whole
//! session: one line for the compositor and its output chain, one line per
//! feed. Every stage that is tuned while the graph runs gets a stable name
//! here, and the same names are recorded in [`FeedBranch`] so the runtime can
//! build its lookup table without re-parsing the text.

use std::fmt;

use duofeed_common::error::{DuofeedError, DuofeedResult};
use duofeed_layout_model::{
    Canvas, CaptureCodec, CaptureSource, CropInsets, FeedName, Geometry, LayoutPolicy,
};
use serde::{Deserialize, Serialize};

use crate::backend::SelectedBackend;

/// Name of the compositing stage.
pub const COMPOSITOR_NAME: &str = "comp";
/// Name of the capsfilter pinning the compositor output to the canvas size.
pub const CANVAS_CAPS_NAME: &str = "canvas";
/// Name of the render stage.
pub const SINK_NAME: &str = "vsink";

/// A single element with its construction properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub factory: String,
    pub name: Option<String>,
    pub props: Vec<(String, String)>,
}

impl Stage {
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            name: None,
            props: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.props.push((key.into(), value.to_string()));
        self
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.factory)?;
        if let Some(name) = &self.name {
            write!(f, " name={name}")?;
        }
        for (key, value) in &self.props {
            write!(f, " {key}={}", quote_value(value))?;
        }
        Ok(())
    }
}

/// One link in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainElement {
    Stage(Stage),
    /// Caps filter shorthand (`video/x-raw,width=640`).
    Caps(String),
    /// Reference to a pad of a named stage (`comp.sink_0`).
    PadRef(String),
}

impl fmt::Display for ChainElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainElement::Stage(stage) => stage.fmt(f),
            ChainElement::Caps(caps) | ChainElement::PadRef(caps) => f.write_str(caps),
        }
    }
}

/// The per-feed part of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedBranch {
    pub feed: FeedName,
    pub source: CaptureSource,
    /// Name of the crop stage (`crop0`).
    pub crop_stage: String,
    /// Compositor sink pad this feed is linked to (`sink_0`).
    pub compositor_pad: String,
    /// Crop applied at construction.
    pub crop: CropInsets,
    /// Placement applied at construction.
    pub geometry: Geometry,
    pub chain: Vec<ChainElement>,
}

/// A complete session graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    pub backend: SelectedBackend,
    pub canvas: Canvas,
    pub policy: LayoutPolicy,
    pub output: Vec<ChainElement>,
    pub feeds: Vec<FeedBranch>,
}

impl GraphDescription {
    /// One line per chain, output chain first.
    pub fn lines(&self) -> Vec<String> {
        std::iter::once(&self.output)
            .chain(self.feeds.iter().map(|branch| &branch.chain))
            .map(|chain| join_chain(chain))
            .collect()
    }

    /// Launch text accepted by `gst::parse::launch`.
    pub fn to_launch(&self) -> String {
        self.lines().join("\n")
    }

    pub fn feed(&self, name: &FeedName) -> Option<&FeedBranch> {
        self.feeds.iter().find(|branch| &branch.feed == name)
    }
}

impl fmt::Display for GraphDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_launch())
    }
}

/// Builds a [`GraphDescription`] from validated sources.
#[derive(Debug, Clone)]
pub struct PipelineDescriptionBuilder {
    backend: SelectedBackend,
    canvas: Canvas,
    policy: LayoutPolicy,
    crops: Vec<CropInsets>,
}

impl PipelineDescriptionBuilder {
    pub fn new(backend: SelectedBackend, canvas: Canvas) -> Self {
        Self {
            backend,
            canvas,
            policy: LayoutPolicy::default(),
            crops: Vec::new(),
        }
    }

    /// Policy used to compute the initial compositor pad placement.
    pub fn with_policy(mut self, policy: LayoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Initial crop per source, by position. Missing entries mean no crop.
    pub fn with_crops(mut self, crops: Vec<CropInsets>) -> Self {
        self.crops = crops;
        self
    }

    pub fn build(&self, sources: &[CaptureSource]) -> DuofeedResult<GraphDescription> {
        if sources.is_empty() {
            return Err(DuofeedError::graph("no capture sources to composite"));
        }
        if self.canvas.is_empty() {
            return Err(DuofeedError::graph(format!(
                "invalid canvas size {}",
                self.canvas
            )));
        }
        for source in sources {
            let format = &source.format;
            if format.width == 0 || format.height == 0 || format.fps == 0 {
                return Err(DuofeedError::graph(format!(
                    "invalid capture format {}x{}@{} for {}",
                    format.width, format.height, format.fps, source.id
                )));
            }
        }

        let placements = self.policy.initial(self.canvas, sources.len());
        let feeds: Vec<FeedBranch> = sources
            .iter()
            .zip(placements)
            .enumerate()
            .map(|(index, (source, geometry))| self.feed_branch(index, source, geometry))
            .collect();

        let description = GraphDescription {
            backend: self.backend.clone(),
            canvas: self.canvas,
            policy: self.policy,
            output: self.output_chain(&feeds),
            feeds,
        };

        tracing::debug!(launch = %description, "Built graph description");
        Ok(description)
    }

    fn output_chain(&self, feeds: &[FeedBranch]) -> Vec<ChainElement> {
        let mut compositor = Stage::new("compositor")
            .named(COMPOSITOR_NAME)
            .prop("latency", 0)
            .prop("background", "transparent");
        for (z_order, branch) in feeds.iter().enumerate() {
            let pad = &branch.compositor_pad;
            let g = branch.geometry;
            compositor = compositor
                .prop(format!("{pad}::xpos"), g.x)
                .prop(format!("{pad}::ypos"), g.y)
                .prop(format!("{pad}::width"), g.width)
                .prop(format!("{pad}::height"), g.height)
                .prop(format!("{pad}::alpha"), 1)
                .prop(format!("{pad}::zorder"), z_order);
        }

        vec![
            ChainElement::Stage(compositor),
            ChainElement::Stage(
                Stage::new("capsfilter")
                    .named(CANVAS_CAPS_NAME)
                    .prop("caps", canvas_caps(self.canvas)),
            ),
            ChainElement::Stage(Stage::new("videoconvert")),
            ChainElement::Stage(self.backend.sink_stage(SINK_NAME)),
        ]
    }

    fn feed_branch(&self, index: usize, source: &CaptureSource, geometry: Geometry) -> FeedBranch {
        let format = source.format;
        let crop = self
            .crops
            .get(index)
            .copied()
            .unwrap_or_default()
            .clamped(format.width, format.height);
        let crop_stage = format!("crop{index}");
        let compositor_pad = format!("sink_{index}");

        let mut chain = vec![ChainElement::Stage(
            Stage::new("v4l2src")
                .named(format!("src{index}"))
                .prop("device", source.path.to_string_lossy())
                .prop("io-mode", 2)
                .prop("do-timestamp", "true"),
        )];

        let size = format!(
            "width={},height={},framerate={}/1",
            format.width, format.height, format.fps
        );
        match format.codec {
            CaptureCodec::Mjpeg => {
                chain.push(ChainElement::Caps(format!("image/jpeg,{size}")));
                chain.push(ChainElement::Stage(Stage::new("jpegdec")));
            }
            CaptureCodec::Raw => {
                chain.push(ChainElement::Caps(format!("video/x-raw,{size}")));
            }
            CaptureCodec::H264 => {
                chain.push(ChainElement::Caps(format!("video/x-h264,{size}")));
                chain.push(ChainElement::Stage(Stage::new("h264parse")));
                chain.push(ChainElement::Stage(Stage::new("avdec_h264")));
            }
        }

        chain.push(ChainElement::Stage(
            Stage::new("videocrop")
                .named(&crop_stage)
                .prop("left", crop.left)
                .prop("right", crop.right)
                .prop("top", crop.top)
                .prop("bottom", crop.bottom),
        ));
        chain.push(ChainElement::Stage(Stage::new("videoscale")));
        chain.push(ChainElement::Caps(format!(
            "video/x-raw,width={},height={},pixel-aspect-ratio=1/1",
            format.width, format.height
        )));
        // One-buffer leaky queue: a stalled feed drops its oldest frame
        // instead of blocking the compositor.
        chain.push(ChainElement::Stage(
            Stage::new("queue")
                .named(format!("queue{index}"))
                .prop("max-size-buffers", 1)
                .prop("max-size-bytes", 0)
                .prop("max-size-time", 0)
                .prop("leaky", "downstream"),
        ));
        chain.push(ChainElement::PadRef(format!(
            "{COMPOSITOR_NAME}.{compositor_pad}"
        )));

        FeedBranch {
            feed: FeedName::from_index(index),
            source: source.clone(),
            crop_stage,
            compositor_pad,
            crop,
            geometry,
            chain,
        }
    }
}

/// Caps string pinning the compositor output to `canvas`.
pub fn canvas_caps(canvas: Canvas) -> String {
    format!("video/x-raw,width={},height={}", canvas.width, canvas.height)
}

fn join_chain(chain: &[ChainElement]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ! ")
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '!' | '"' | '\'' | '=' | ',' | ';'));
    if needs_quotes && !value.starts_with("video/") {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use duofeed_layout_model::CaptureFormat;

    use super::*;
    use crate::backend::{BackendCapability, BackendKind};

    fn sources(n: usize) -> Vec<CaptureSource> {
        (0..n)
            .map(|i| CaptureSource {
                id: format!("video{}", i * 2),
                path: PathBuf::from(format!("/dev/video{}", i * 2)),
                format: CaptureFormat::default(),
            })
            .collect()
    }

    fn gl_builder(canvas: Canvas) -> PipelineDescriptionBuilder {
        PipelineDescriptionBuilder::new(
            SelectedBackend::new(BackendCapability::new("glimagesink", BackendKind::Accelerated)),
            canvas,
        )
    }

    #[test]
    fn test_one_line_per_feed_plus_output() {
        let description = gl_builder(Canvas::new(1280, 720)).build(&sources(2)).unwrap();
        let lines = description.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("compositor name=comp latency=0 background=transparent"));
        assert!(lines[0].ends_with("glimagesink name=vsink sync=false force-aspect-ratio=false"));
        assert!(lines[0].contains("capsfilter name=canvas caps=video/x-raw,width=1280,height=720"));
    }

    #[test]
    fn test_feed_stages_have_stable_names() {
        let description = gl_builder(Canvas::new(1280, 720)).build(&sources(2)).unwrap();
        let text = description.to_launch();
        for i in 0..2 {
            assert!(text.contains(&format!("videocrop name=crop{i}")));
            assert!(text.contains(&format!("! comp.sink_{i}")));
            assert_eq!(description.feeds[i].crop_stage, format!("crop{i}"));
            assert_eq!(description.feeds[i].compositor_pad, format!("sink_{i}"));
        }
        assert!(description.feed(&FeedName::from("feed1")).is_some());
    }

    #[test]
    fn test_queues_are_bounded_and_leaky() {
        let description = gl_builder(Canvas::new(1280, 720)).build(&sources(2)).unwrap();
        for line in &description.lines()[1..] {
            assert!(line.contains(
                "queue name=queue"
            ));
            assert!(line.contains(
                "max-size-buffers=1 max-size-bytes=0 max-size-time=0 leaky=downstream"
            ));
        }
    }

    #[test]
    fn test_mjpeg_feed_chain_matches_capture_format() {
        let description = gl_builder(Canvas::new(1280, 720)).build(&sources(1)).unwrap();
        assert_eq!(
            description.lines()[1],
            "v4l2src name=src0 device=/dev/video0 io-mode=2 do-timestamp=true \
             ! image/jpeg,width=1280,height=720,framerate=30/1 ! jpegdec \
             ! videocrop name=crop0 left=0 right=0 top=0 bottom=0 ! videoscale \
             ! video/x-raw,width=1280,height=720,pixel-aspect-ratio=1/1 \
             ! queue name=queue0 max-size-buffers=1 max-size-bytes=0 max-size-time=0 leaky=downstream \
             ! comp.sink_0"
        );
    }

    #[test]
    fn test_initial_pad_placement_is_equal_split() {
        let description = gl_builder(Canvas::new(1281, 720)).build(&sources(2)).unwrap();
        assert_eq!(description.feeds[0].geometry, Geometry::new(0, 0, 640, 720));
        assert_eq!(description.feeds[1].geometry, Geometry::new(640, 0, 641, 720));
        let output = &description.lines()[0];
        assert!(output.contains("sink_1::xpos=640 sink_1::ypos=0 sink_1::width=641"));
        assert!(output.contains("sink_1::alpha=1 sink_1::zorder=1"));
    }

    #[test]
    fn test_initial_crops_are_clamped() {
        let mut srcs = sources(2);
        srcs[0].format.width = 640;
        let description = gl_builder(Canvas::new(1280, 720))
            .with_crops(vec![CropInsets::new(40, 10_000, 0, 0)])
            .build(&srcs)
            .unwrap();
        assert_eq!(description.feeds[0].crop, CropInsets::new(40, 599, 0, 0));
        assert_eq!(description.feeds[1].crop, CropInsets::default());
    }

    #[test]
    fn test_h264_sources_get_parser_and_decoder() {
        let mut srcs = sources(1);
        srcs[0].format.codec = CaptureCodec::H264;
        let description = gl_builder(Canvas::new(1280, 720)).build(&srcs).unwrap();
        assert!(description.lines()[1].contains("video/x-h264,width=1280"));
        assert!(description.lines()[1].contains("! h264parse ! avdec_h264 !"));
    }

    #[test]
    fn test_device_paths_with_spaces_are_quoted() {
        let mut srcs = sources(1);
        srcs[0].path = PathBuf::from("/dev/v4l/by-id/usb-Capture Card-video-index0");
        let description = gl_builder(Canvas::new(1280, 720)).build(&srcs).unwrap();
        assert!(description.lines()[1]
            .contains("device=\"/dev/v4l/by-id/usb-Capture Card-video-index0\""));
    }

    #[test]
    fn test_rejects_empty_or_degenerate_input() {
        let builder = gl_builder(Canvas::new(1280, 720));
        assert!(matches!(
            builder.build(&[]),
            Err(DuofeedError::GraphConstruction { .. })
        ));
        assert!(gl_builder(Canvas::new(0, 720)).build(&sources(2)).is_err());
        let mut srcs = sources(1);
        srcs[0].format.fps = 0;
        assert!(builder.build(&srcs).is_err());
    }
}

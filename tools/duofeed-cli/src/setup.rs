//! Shared startup path: configuration plus flags to a graph description.

use clap::Args;
use duofeed_common::config::AppConfig;
use duofeed_layout_model::{Canvas, CaptureCodec, CaptureFormat, CropInsets, LayoutPolicy};
use duofeed_pipeline::{
    negotiate, BackendCapability, BackendProbe, DeviceValidator, GraphDescription,
    PipelineDescriptionBuilder,
};

/// Flags that override the configured sources and formats.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Capture sources (`video0`, `/dev/v4l/by-id/...`); defaults to the
    /// configured list
    pub sources: Vec<String>,

    /// Output canvas size, e.g. 1920x1080
    #[arg(long)]
    pub size: Option<Canvas>,

    /// Capture frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Capture codec: mjpeg|raw|h264
    #[arg(long)]
    pub codec: Option<CaptureCodec>,

    /// Layout policy: equal-split|overlay|manual
    #[arg(long)]
    pub policy: Option<LayoutPolicy>,
}

impl SourceArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if !self.sources.is_empty() {
            config.sources = self.sources.clone();
        }
        if let Some(size) = self.size {
            config.canvas.width = size.width;
            config.canvas.height = size.height;
        }
        if let Some(fps) = self.fps {
            config.capture.fps = fps;
        }
        if let Some(codec) = self.codec {
            config.capture.codec = codec.to_string();
        }
        if let Some(policy) = self.policy {
            config.layout.policy = policy.to_string();
        }
    }
}

pub fn capture_format(config: &AppConfig) -> anyhow::Result<CaptureFormat> {
    Ok(CaptureFormat {
        codec: config.capture.codec.parse()?,
        width: config.capture.width,
        height: config.capture.height,
        fps: config.capture.fps,
    })
}

pub fn crops(config: &AppConfig) -> Vec<CropInsets> {
    (0..config.sources.len())
        .map(|i| {
            let c = config.crop_for(i);
            CropInsets::new(c.left, c.right, c.top, c.bottom)
        })
        .collect()
}

/// Validate devices, negotiate a backend among `candidates`, and build the
/// description. Any failure here is fatal for the session.
pub fn build_description(
    config: &AppConfig,
    candidates: &[BackendCapability],
    probe: &dyn BackendProbe,
) -> anyhow::Result<GraphDescription> {
    config.validate()?;
    let format = capture_format(config)?;
    let policy: LayoutPolicy = config.layout.policy.parse()?;

    let sources = DeviceValidator::new(&config.device_root).validate(&config.sources, format)?;
    let backend = negotiate(candidates, probe)?;

    let canvas = Canvas::new(config.canvas.width, config.canvas.height);
    let description = PipelineDescriptionBuilder::new(backend, canvas)
        .with_policy(policy)
        .with_crops(crops(config))
        .build(&sources)?;
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = AppConfig::default();
        let args = SourceArgs {
            sources: vec!["/dev/video4".to_string()],
            size: Some(Canvas::new(1280, 720)),
            fps: Some(15),
            codec: Some(CaptureCodec::Raw),
            policy: Some(LayoutPolicy::FullOverlay),
        };
        args.apply(&mut config);

        assert_eq!(config.sources, vec!["/dev/video4".to_string()]);
        assert_eq!((config.canvas.width, config.canvas.height), (1280, 720));
        let format = capture_format(&config).unwrap();
        assert_eq!(format.codec, CaptureCodec::Raw);
        assert_eq!(format.fps, 15);
        assert_eq!(
            config.layout.policy.parse::<LayoutPolicy>().unwrap(),
            LayoutPolicy::FullOverlay
        );
    }

    #[test]
    fn test_empty_flags_keep_config() {
        let mut config = AppConfig::default();
        SourceArgs::default().apply(&mut config);
        assert_eq!(config.sources, AppConfig::default().sources);
    }

    #[test]
    fn test_crops_pad_missing_entries() {
        let mut config = AppConfig::default();
        config.layout.crops = vec![duofeed_common::config::CropConfig {
            left: 40,
            right: 53,
            ..Default::default()
        }];
        assert_eq!(
            crops(&config),
            vec![CropInsets::new(40, 53, 0, 0), CropInsets::default()]
        );
    }
}

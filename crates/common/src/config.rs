//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DuofeedError, DuofeedResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ordered capture source identifiers (`video0`, `/dev/video2`, ...).
    pub sources: Vec<String>,

    /// Directory bare source names are resolved under.
    pub device_root: PathBuf,

    /// Requested capture format, shared by every source.
    pub capture: CaptureDefaults,

    /// Initial output canvas size.
    pub canvas: CanvasConfig,

    /// Layout and live-control settings.
    pub layout: LayoutConfig,

    /// Rendering backend candidates, probed in priority order.
    pub backends: Vec<BackendCandidateConfig>,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default capture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDefaults {
    /// Codec delivered by the device: "mjpeg", "raw" or "h264".
    pub codec: String,

    /// Capture width in pixels.
    pub width: u32,

    /// Capture height in pixels.
    pub height: u32,

    /// Frame rate (frames per second).
    pub fps: u32,
}

/// Output canvas size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

/// Layout policy and control limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// "equal-split", "overlay" or "manual".
    pub policy: String,

    /// Smallest accepted zoom factor.
    pub zoom_min: f64,

    /// Largest accepted zoom factor.
    pub zoom_max: f64,

    /// Initial crop insets, one entry per source in order. Missing entries
    /// mean no crop.
    pub crops: Vec<CropConfig>,
}

/// Initial crop insets for one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// One rendering backend candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCandidateConfig {
    /// GStreamer element factory name of the video sink.
    pub factory: String,

    /// "native-widget", "accelerated" or "software".
    pub kind: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "duofeed=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: vec!["video0".to_string(), "video2".to_string()],
            device_root: PathBuf::from("/dev"),
            capture: CaptureDefaults::default(),
            canvas: CanvasConfig::default(),
            layout: LayoutConfig::default(),
            backends: default_backends(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            codec: "mjpeg".to_string(),
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            policy: "equal-split".to_string(),
            zoom_min: 0.5,
            zoom_max: 2.0,
            crops: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

fn default_backends() -> Vec<BackendCandidateConfig> {
    [
        ("gtksink", "native-widget"),
        ("glimagesink", "accelerated"),
        ("ximagesink", "software"),
    ]
    .into_iter()
    .map(|(factory, kind)| BackendCandidateConfig {
        factory: factory.to_string(),
        kind: kind.to_string(),
    })
    .collect()
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Unlike [`load`](Self::load), a
    /// missing or malformed file is an error.
    pub fn load_from(path: &Path) -> DuofeedResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| DuofeedError::config(format!("{}: {e}", path.display())))
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Reject configurations no session could start from.
    pub fn validate(&self) -> DuofeedResult<()> {
        if self.sources.is_empty() {
            return Err(DuofeedError::config("at least one capture source is required"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(DuofeedError::config(format!(
                "invalid capture size {}x{}",
                self.capture.width, self.capture.height
            )));
        }
        if self.capture.fps == 0 {
            return Err(DuofeedError::config("capture frame rate must be positive"));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(DuofeedError::config(format!(
                "invalid canvas size {}x{}",
                self.canvas.width, self.canvas.height
            )));
        }
        let (min, max) = (self.layout.zoom_min, self.layout.zoom_max);
        if !(min > 0.0 && min <= max && max.is_finite()) {
            return Err(DuofeedError::config(format!(
                "invalid zoom range [{min}, {max}]"
            )));
        }
        if self.backends.is_empty() {
            return Err(DuofeedError::config("no rendering backend candidates configured"));
        }
        Ok(())
    }

    /// Initial crop for the source at `index`.
    pub fn crop_for(&self, index: usize) -> CropConfig {
        self.layout.crops.get(index).copied().unwrap_or_default()
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("duofeed").join("config.json")
}

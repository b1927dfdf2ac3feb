//! Error types shared across DuoFeed crates.

/// Top-level error type for DuoFeed operations.
#[derive(Debug, thiserror::Error)]
pub enum DuofeedError {
    #[error("Capture device not found: {source_id} ({detail})")]
    DeviceNotFound { source_id: String, detail: String },

    #[error("No rendering backend available (tried: {})", .tried.join(", "))]
    NoBackendAvailable { tried: Vec<String> },

    #[error("Graph construction error: {message}")]
    GraphConstruction { message: String },

    #[error("Unknown feed: {feed}")]
    UnknownFeed { feed: String },

    #[error("Pipeline is not running")]
    PipelineNotRunning,

    #[error("Lifecycle error: {message}")]
    Lifecycle { message: String },

    #[error("Property write failed: {message}")]
    PropertyWrite { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using DuofeedError.
pub type DuofeedResult<T> = Result<T, DuofeedError>;

impl DuofeedError {
    pub fn device_not_found(source_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            source_id: source_id.into(),
            detail: detail.into(),
        }
    }

    pub fn graph(msg: impl Into<String>) -> Self {
        Self::GraphConstruction {
            message: msg.into(),
        }
    }

    pub fn unknown_feed(feed: impl Into<String>) -> Self {
        Self::UnknownFeed { feed: feed.into() }
    }

    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle {
            message: msg.into(),
        }
    }

    pub fn property_write(msg: impl Into<String>) -> Self {
        Self::PropertyWrite {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Errors that abort the session at startup; the operator has to fix
    /// the environment and restart.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound { .. }
                | Self::NoBackendAvailable { .. }
                | Self::GraphConstruction { .. }
                | Self::Config { .. }
        )
    }
}

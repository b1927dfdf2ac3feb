//! Rendering backend negotiation.
//!
//! A backend is a video sink element. Candidates are grouped into fixed
//! priority classes and probed in order; the first one present wins. The
//! chosen class decides how the rendered output reaches the screen.

use std::fmt;
use std::str::FromStr;

use duofeed_common::config::BackendCandidateConfig;
use duofeed_common::error::{DuofeedError, DuofeedResult};
use serde::{Deserialize, Serialize};

use crate::description::Stage;

/// Priority class of a rendering backend. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Hands over a ready-made toolkit widget.
    NativeWidget,
    /// Hardware accelerated, renders into a window handle.
    Accelerated,
    /// Basic software rendering into a window handle.
    Software,
}

impl BackendKind {
    pub fn embedding(&self) -> EmbeddingProtocol {
        match self {
            BackendKind::NativeWidget => EmbeddingProtocol::NativeWidget,
            BackendKind::Accelerated | BackendKind::Software => {
                EmbeddingProtocol::HandleEmbedding
            }
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::NativeWidget => "native-widget",
            BackendKind::Accelerated => "accelerated",
            BackendKind::Software => "software",
        })
    }
}

impl FromStr for BackendKind {
    type Err = DuofeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native-widget" | "widget" => Ok(BackendKind::NativeWidget),
            "accelerated" | "gl" => Ok(BackendKind::Accelerated),
            "software" | "basic" => Ok(BackendKind::Software),
            other => Err(DuofeedError::config(format!(
                "unknown backend kind '{other}'"
            ))),
        }
    }
}

/// How rendered output is attached to the operator's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProtocol {
    /// The sink provides a drawable widget; no handshake needed.
    NativeWidget,
    /// The sink must be given an OS window handle once a surface exists.
    HandleEmbedding,
}

/// One probe-able backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapability {
    /// Element factory name (`glimagesink`).
    pub factory: String,
    pub kind: BackendKind,
}

impl BackendCapability {
    pub fn new(factory: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            factory: factory.into(),
            kind,
        }
    }

    /// Default candidate list: GTK widget sink, then GL, then plain X11.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("gtksink", BackendKind::NativeWidget),
            Self::new("glimagesink", BackendKind::Accelerated),
            Self::new("ximagesink", BackendKind::Software),
        ]
    }

    /// Parse the configured candidate list.
    pub fn from_config(config: &[BackendCandidateConfig]) -> DuofeedResult<Vec<Self>> {
        config
            .iter()
            .map(|c| -> DuofeedResult<Self> {
                Ok(Self::new(c.factory.clone(), c.kind.parse()?))
            })
            .collect()
    }
}

/// The negotiated backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedBackend {
    pub capability: BackendCapability,
    pub embedding: EmbeddingProtocol,
}

impl SelectedBackend {
    pub fn new(capability: BackendCapability) -> Self {
        let embedding = capability.kind.embedding();
        Self {
            capability,
            embedding,
        }
    }

    pub fn factory(&self) -> &str {
        &self.capability.factory
    }

    /// The sink stage for the graph description.
    ///
    /// Feeds must fill their compositor slots, so aspect-ratio letterboxing is
    /// disabled. Window sinks render unsynchronized to keep latency down.
    pub fn sink_stage(&self, name: &str) -> Stage {
        let mut stage = Stage::new(self.factory()).named(name);
        if self.embedding == EmbeddingProtocol::HandleEmbedding {
            stage = stage.prop("sync", "false");
        }
        stage.prop("force-aspect-ratio", "false")
    }
}

/// Checks whether a backend can be instantiated on this machine.
pub trait BackendProbe {
    fn is_available(&self, capability: &BackendCapability) -> bool;
}

/// Pick the first available backend in priority order.
///
/// Candidates are stably sorted by class, so configuration order only matters
/// within a class. An empty list or no available candidate is fatal.
pub fn negotiate(
    candidates: &[BackendCapability],
    probe: &dyn BackendProbe,
) -> DuofeedResult<SelectedBackend> {
    let mut ordered: Vec<&BackendCapability> = candidates.iter().collect();
    ordered.sort_by_key(|c| c.kind);

    for capability in &ordered {
        if probe.is_available(capability) {
            let selected = SelectedBackend::new((*capability).clone());
            tracing::info!(
                backend = %capability.factory,
                kind = %capability.kind,
                embedding = ?selected.embedding,
                "Selected rendering backend"
            );
            return Ok(selected);
        }
        tracing::debug!(backend = %capability.factory, "Rendering backend unavailable");
    }

    Err(DuofeedError::NoBackendAvailable {
        tried: ordered.iter().map(|c| c.factory.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Installed(&'static [&'static str]);

    impl BackendProbe for Installed {
        fn is_available(&self, capability: &BackendCapability) -> bool {
            self.0.contains(&capability.factory.as_str())
        }
    }

    #[test]
    fn test_prefers_widget_backend() {
        let selected = negotiate(
            &BackendCapability::defaults(),
            &Installed(&["ximagesink", "gtksink", "glimagesink"]),
        )
        .unwrap();
        assert_eq!(selected.factory(), "gtksink");
        assert_eq!(selected.embedding, EmbeddingProtocol::NativeWidget);
    }

    #[test]
    fn test_priority_ignores_candidate_order() {
        let candidates = vec![
            BackendCapability::new("ximagesink", BackendKind::Software),
            BackendCapability::new("glimagesink", BackendKind::Accelerated),
        ];
        let selected = negotiate(&candidates, &Installed(&["ximagesink", "glimagesink"])).unwrap();
        assert_eq!(selected.factory(), "glimagesink");
        assert_eq!(selected.embedding, EmbeddingProtocol::HandleEmbedding);
    }

    #[test]
    fn test_falls_back_to_software() {
        let selected =
            negotiate(&BackendCapability::defaults(), &Installed(&["ximagesink"])).unwrap();
        assert_eq!(selected.capability.kind, BackendKind::Software);
    }

    #[test]
    fn test_empty_candidates_is_fatal() {
        let err = negotiate(&[], &Installed(&["gtksink"])).unwrap_err();
        assert!(matches!(err, DuofeedError::NoBackendAvailable { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_nothing_installed_names_every_candidate() {
        let err = negotiate(&BackendCapability::defaults(), &Installed(&[])).unwrap_err();
        match err {
            DuofeedError::NoBackendAvailable { tried } => {
                assert_eq!(tried, vec!["gtksink", "glimagesink", "ximagesink"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_window_sinks_render_unsynchronized() {
        let gl = SelectedBackend::new(BackendCapability::new("glimagesink", BackendKind::Accelerated));
        assert_eq!(
            gl.sink_stage("vsink").to_string(),
            "glimagesink name=vsink sync=false force-aspect-ratio=false"
        );
        let gtk = SelectedBackend::new(BackendCapability::new("gtksink", BackendKind::NativeWidget));
        assert_eq!(
            gtk.sink_stage("vsink").to_string(),
            "gtksink name=vsink force-aspect-ratio=false"
        );
    }

    #[test]
    fn test_parses_configured_candidates() {
        let config = duofeed_common::config::AppConfig::default();
        let parsed = BackendCapability::from_config(&config.backends).unwrap();
        assert_eq!(parsed, BackendCapability::defaults());
    }
}

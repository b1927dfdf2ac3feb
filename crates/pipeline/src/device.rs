//! Capture device validation.
//!
//! Every requested source must resolve to an existing device node before any
//! graph is built; a session never starts with a partial set of feeds.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use duofeed_common::error::{DuofeedError, DuofeedResult};
use duofeed_layout_model::{CaptureFormat, CaptureSource};

/// Resolves operator-supplied source identifiers to device paths.
#[derive(Debug, Clone)]
pub struct DeviceValidator {
    /// Directory bare names (`video0`) are resolved under.
    device_root: PathBuf,
}

impl Default for DeviceValidator {
    fn default() -> Self {
        Self::new("/dev")
    }
}

impl DeviceValidator {
    pub fn new(device_root: impl Into<PathBuf>) -> Self {
        Self {
            device_root: device_root.into(),
        }
    }

    /// Resolve every id in order, failing on the first one that does not
    /// exist. Each resolved source is bound to `format`.
    pub fn validate<S: AsRef<str>>(
        &self,
        source_ids: &[S],
        format: CaptureFormat,
    ) -> DuofeedResult<Vec<CaptureSource>> {
        if source_ids.is_empty() {
            return Err(DuofeedError::config("no capture sources requested"));
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(source_ids.len());

        for id in source_ids {
            let id = id.as_ref();
            let path = self.resolve(id)?;
            if !seen.insert(path.clone()) {
                return Err(DuofeedError::config(format!(
                    "capture source {id} resolves to {} which is already in use",
                    path.display()
                )));
            }
            tracing::debug!(source = id, path = %path.display(), "Resolved capture source");
            resolved.push(CaptureSource {
                id: id.to_string(),
                path,
                format,
            });
        }

        tracing::info!(count = resolved.len(), "All capture sources resolved");
        Ok(resolved)
    }

    /// Resolve a single id to its canonical path.
    pub fn resolve(&self, id: &str) -> DuofeedResult<PathBuf> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(DuofeedError::device_not_found(id, "empty source id"));
        }

        let candidate = if trimmed.contains('/') {
            PathBuf::from(trimmed)
        } else {
            self.device_root.join(trimmed)
        };

        std::fs::canonicalize(&candidate).map_err(|e| {
            tracing::warn!(source = id, path = %candidate.display(), error = %e, "Capture device missing");
            DuofeedError::device_not_found(id, format!("{}: {e}", candidate.display()))
        })
    }

    pub fn device_root(&self) -> &Path {
        &self.device_root
    }
}

/// List `video*` nodes under `root`, sorted by name.
pub fn list_video_devices(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut devices: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("video"))
        .map(|entry| entry.path())
        .collect();
    devices.sort();
    devices
}

//! Layout policies: pure functions from a canvas to feed placements.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geometry::{Canvas, Geometry};
use crate::ModelError;

/// How feeds are arranged on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutPolicy {
    /// Side by side, equal widths, full height, no gaps or overlaps.
    #[default]
    EqualSplit,
    /// Every feed covers the whole canvas; blend with alpha and z-order.
    FullOverlay,
    /// The operator places feeds; resizes rescale placements proportionally.
    Manual,
}

impl LayoutPolicy {
    /// Compute placements for `current.len()` feeds.
    ///
    /// `Manual` returns `current` unchanged; the auto policies ignore it
    /// except for its length.
    pub fn arrange(&self, canvas: Canvas, current: &[Geometry]) -> Vec<Geometry> {
        match self {
            LayoutPolicy::EqualSplit => equal_split(canvas, current.len()),
            LayoutPolicy::FullOverlay => vec![canvas.full(); current.len()],
            LayoutPolicy::Manual => current.to_vec(),
        }
    }

    /// Placements for `n` freshly registered feeds. `Manual` has nothing to
    /// keep yet and starts from the equal split.
    pub fn initial(&self, canvas: Canvas, n: usize) -> Vec<Geometry> {
        match self {
            LayoutPolicy::Manual => equal_split(canvas, n),
            _ => self.arrange(canvas, &vec![canvas.full(); n]),
        }
    }

    /// Whether a canvas resize re-runs the policy (as opposed to rescaling).
    pub fn relayouts_on_resize(&self) -> bool {
        !matches!(self, LayoutPolicy::Manual)
    }
}

impl fmt::Display for LayoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LayoutPolicy::EqualSplit => "equal-split",
            LayoutPolicy::FullOverlay => "overlay",
            LayoutPolicy::Manual => "manual",
        })
    }
}

impl FromStr for LayoutPolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equal-split" | "split" | "side-by-side" => Ok(LayoutPolicy::EqualSplit),
            "overlay" | "full-overlay" => Ok(LayoutPolicy::FullOverlay),
            "manual" => Ok(LayoutPolicy::Manual),
            _ => Err(ModelError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Horizontal equal split.
///
/// Feed `i` spans `[i*W/n, (i+1)*W/n)`. Boundaries are computed from the
/// canvas width rather than accumulated slot widths, so the slots always sum
/// to exactly `W`. With two feeds this is `w0 = W/2`, `w1 = W - w0`.
pub fn equal_split(canvas: Canvas, n: usize) -> Vec<Geometry> {
    if n == 0 {
        return Vec::new();
    }
    let width = canvas.width as u64;
    let height = canvas.height.max(1);
    let boundary = |i: usize| (width * i as u64 / n as u64) as i64;

    (0..n)
        .map(|i| {
            let x0 = boundary(i);
            let x1 = boundary(i + 1);
            Geometry::new(x0 as i32, 0, (x1 - x0) as u32, height)
        })
        .collect()
}

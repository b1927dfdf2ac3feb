//! Outcome of a live control write.

use serde::{Deserialize, Serialize};

/// The value a setter actually applied.
///
/// UI controls must display `value()` rather than what they requested, so the
/// control and the feed never disagree after a clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Applied<T> {
    /// The requested value was in range and applied unchanged.
    AsRequested(T),
    /// The requested value was out of range; this is what was applied.
    ClampAdjusted(T),
}

impl<T: Copy> Applied<T> {
    /// Build from a requested and an effective value.
    pub fn from_clamp(requested: T, applied: T) -> Self
    where
        T: PartialEq,
    {
        if requested == applied {
            Applied::AsRequested(applied)
        } else {
            Applied::ClampAdjusted(applied)
        }
    }

    pub fn value(&self) -> T {
        match self {
            Applied::AsRequested(v) | Applied::ClampAdjusted(v) => *v,
        }
    }

    pub fn was_clamped(&self) -> bool {
        matches!(self, Applied::ClampAdjusted(_))
    }
}

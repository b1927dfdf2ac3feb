//! Canvas, placement rectangles, and crop insets.
//!
//! All values are integer pixels. Placement coordinates live in canvas space;
//! crop insets live in source-frame space.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// The output surface feeds are composited onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The rectangle covering the whole canvas.
    pub fn full(&self) -> Geometry {
        Geometry::new(0, 0, self.width.max(1), self.height.max(1))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Canvas {
    type Err = ModelError;

    /// Parse `WIDTHxHEIGHT`, case-insensitive on the separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (w, h) = lower
            .split_once('x')
            .ok_or_else(|| ModelError::InvalidSize(s.to_string()))?;
        let width = w
            .parse::<u32>()
            .map_err(|_| ModelError::InvalidSize(s.to_string()))?;
        let height = h
            .parse::<u32>()
            .map_err(|_| ModelError::InvalidSize(s.to_string()))?;
        if width == 0 || height == 0 {
            return Err(ModelError::InvalidSize(s.to_string()));
        }
        Ok(Self { width, height })
    }
}

/// A feed's placement on the canvas.
///
/// `x`/`y` may be negative or exceed the canvas (a zoomed feed can hang off
/// the edge); `width`/`height` are always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Same origin, size multiplied by `factor` and rounded.
    pub fn zoomed(&self, factor: f64) -> Self {
        Self::new(
            self.x,
            self.y,
            scale_len(self.width, factor),
            scale_len(self.height, factor),
        )
    }

    /// Scale the edges independently on each axis.
    ///
    /// Edges are rounded rather than sizes, so rectangles that touch before
    /// scaling still touch afterwards.
    pub fn rescaled(&self, sx: f64, sy: f64) -> Self {
        let (x, right) = (scale_edge(self.x as i64, sx), scale_edge(self.right(), sx));
        let (y, bottom) = (scale_edge(self.y as i64, sy), scale_edge(self.bottom(), sy));
        Self::new(
            clamp_i32(x),
            clamp_i32(y),
            clamp_u32(right - x),
            clamp_u32(bottom - y),
        )
    }

    /// Move the origin, keeping the size.
    pub fn moved_to(&self, x: i32, y: i32) -> Self {
        Self { x, y, ..*self }
    }

    /// Whether two rectangles share any pixel.
    pub fn overlaps(&self, other: &Geometry) -> bool {
        (self.x as i64) < other.right()
            && (other.x as i64) < self.right()
            && (self.y as i64) < other.bottom()
            && (other.y as i64) < self.bottom()
    }
}

fn scale_edge(edge: i64, factor: f64) -> i64 {
    (edge as f64 * factor).round() as i64
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

fn clamp_u32(v: i64) -> u32 {
    v.clamp(0, u32::MAX as i64) as u32
}

fn scale_len(len: u32, factor: f64) -> u32 {
    let scaled = (len as f64 * factor).round();
    if scaled >= u32::MAX as f64 {
        u32::MAX
    } else {
        (scaled as u32).max(1)
    }
}

/// One edge of a source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropEdge {
    Left,
    Right,
    Top,
    Bottom,
}

impl CropEdge {
    pub const ALL: [CropEdge; 4] = [
        CropEdge::Left,
        CropEdge::Right,
        CropEdge::Top,
        CropEdge::Bottom,
    ];

    /// The edge sharing this edge's axis.
    pub fn opposite(&self) -> CropEdge {
        match self {
            CropEdge::Left => CropEdge::Right,
            CropEdge::Right => CropEdge::Left,
            CropEdge::Top => CropEdge::Bottom,
            CropEdge::Bottom => CropEdge::Top,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        matches!(self, CropEdge::Left | CropEdge::Right)
    }

    /// Property name on the crop stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            CropEdge::Left => "left",
            CropEdge::Right => "right",
            CropEdge::Top => "top",
            CropEdge::Bottom => "bottom",
        }
    }
}

impl fmt::Display for CropEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CropEdge {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(CropEdge::Left),
            "right" | "r" => Ok(CropEdge::Right),
            "top" | "t" => Ok(CropEdge::Top),
            "bottom" | "b" => Ok(CropEdge::Bottom),
            _ => Err(ModelError::UnknownEdge(s.to_string())),
        }
    }
}

/// Pixels trimmed from each edge of a source frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropInsets {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl CropInsets {
    pub fn new(left: u32, right: u32, top: u32, bottom: u32) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    pub fn get(&self, edge: CropEdge) -> u32 {
        match edge {
            CropEdge::Left => self.left,
            CropEdge::Right => self.right,
            CropEdge::Top => self.top,
            CropEdge::Bottom => self.bottom,
        }
    }

    pub fn set(&mut self, edge: CropEdge, value: u32) {
        match edge {
            CropEdge::Left => self.left = value,
            CropEdge::Right => self.right = value,
            CropEdge::Top => self.top = value,
            CropEdge::Bottom => self.bottom = value,
        }
    }

    /// Largest inset `edge` may take so that at least one source pixel
    /// survives on that axis, given the current opposite inset.
    pub fn max_safe(&self, edge: CropEdge, source_width: u32, source_height: u32) -> u32 {
        let dim = if edge.is_horizontal() {
            source_width
        } else {
            source_height
        };
        dim.saturating_sub(1)
            .saturating_sub(self.get(edge.opposite()))
    }

    /// Clamp every inset into the safe range. Left and top win over right and
    /// bottom when the pair does not fit.
    pub fn clamped(&self, source_width: u32, source_height: u32) -> Self {
        let max_w = source_width.saturating_sub(1);
        let max_h = source_height.saturating_sub(1);
        let left = self.left.min(max_w);
        let top = self.top.min(max_h);
        Self {
            left,
            right: self.right.min(max_w - left),
            top,
            bottom: self.bottom.min(max_h - top),
        }
    }

    /// Whether the frame keeps at least one pixel on both axes.
    pub fn fits(&self, source_width: u32, source_height: u32) -> bool {
        (self.left as u64 + self.right as u64) < source_width as u64
            && (self.top as u64 + self.bottom as u64) < source_height as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_parse() {
        let canvas: Canvas = "1920x1080".parse().unwrap();
        assert_eq!(canvas, Canvas::new(1920, 1080));
        assert_eq!("1280X720".parse::<Canvas>().unwrap(), Canvas::new(1280, 720));
        assert!("1920".parse::<Canvas>().is_err());
        assert!("0x720".parse::<Canvas>().is_err());
        assert!("axb".parse::<Canvas>().is_err());
    }

    #[test]
    fn test_geometry_never_collapses() {
        let g = Geometry::new(0, 0, 0, 0);
        assert_eq!((g.width, g.height), (1, 1));
        let tiny = Geometry::new(0, 0, 3, 3).zoomed(0.01);
        assert_eq!((tiny.width, tiny.height), (1, 1));
    }

    #[test]
    fn test_zoom_keeps_origin() {
        let g = Geometry::new(640, 10, 640, 720).zoomed(1.5);
        assert_eq!(g, Geometry::new(640, 10, 960, 1080));
    }

    #[test]
    fn test_rescale() {
        let g = Geometry::new(640, 0, 640, 720).rescaled(0.5, 0.5);
        assert_eq!(g, Geometry::new(320, 0, 320, 360));
    }

    #[test]
    fn test_rescale_keeps_neighbours_touching() {
        let sx = 901.0 / 1280.0;
        let a = Geometry::new(0, 0, 640, 720).rescaled(sx, 1.0);
        let b = Geometry::new(640, 0, 640, 720).rescaled(sx, 1.0);
        assert_eq!(a.right(), b.x as i64);
        assert_eq!(b.right(), 901);
    }

    #[test]
    fn test_adjacent_rects_do_not_overlap() {
        let a = Geometry::new(0, 0, 640, 720);
        let b = Geometry::new(640, 0, 641, 720);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&Geometry::new(639, 0, 10, 10)));
    }

    #[test]
    fn test_max_safe_inset() {
        let crop = CropInsets::default();
        assert_eq!(crop.max_safe(CropEdge::Left, 640, 480), 639);
        let crop = CropInsets::new(0, 100, 0, 0);
        assert_eq!(crop.max_safe(CropEdge::Left, 640, 480), 539);
        assert_eq!(crop.max_safe(CropEdge::Top, 640, 480), 479);
        let crop = CropInsets::new(0, 0, 0, 479);
        assert_eq!(crop.max_safe(CropEdge::Top, 640, 480), 0);
    }

    #[test]
    fn test_clamped_insets_fit() {
        let crop = CropInsets::new(600, 600, 10, 10).clamped(640, 480);
        assert!(crop.fits(640, 480));
        assert_eq!(crop.left, 600);
        assert_eq!(crop.right, 39);
    }

    #[test]
    fn test_edge_parse_and_opposite() {
        assert_eq!("Left".parse::<CropEdge>().unwrap(), CropEdge::Left);
        assert_eq!("b".parse::<CropEdge>().unwrap(), CropEdge::Bottom);
        assert!("middle".parse::<CropEdge>().is_err());
        for edge in CropEdge::ALL {
            assert_eq!(edge.opposite().opposite(), edge);
        }
    }
}

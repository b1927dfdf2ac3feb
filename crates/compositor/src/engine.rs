//! The compositing layout engine.
//!
//! Owns the live per-feed state (placement, crop, opacity, stacking, zoom)
//! and pushes every change through the shared [`HandleSlot`]. In-memory state
//! is updated before the write is attempted, so a failed or rejected write
//! leaves the engine consistent with what the operator asked for; geometry
//! that could not be written is re-sent by the next layout pass.
//!
//! Manual placements are anchored to the canvas they were made on. Every
//! resize scales from that anchor, never from the previous rounded result.

use duofeed_common::error::{DuofeedError, DuofeedResult};
use duofeed_layout_model::{Applied, Canvas, CropEdge, Feed, FeedName, Geometry, LayoutPolicy};
use duofeed_pipeline::{GraphDescription, HandleSlot, PropertyWrite};
use serde::{Deserialize, Serialize};

/// Allowed zoom multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    pub fn new(min: f64, max: f64) -> DuofeedResult<Self> {
        if !(min.is_finite() && max.is_finite()) || min <= 0.0 || min > max {
            return Err(DuofeedError::config(format!(
                "invalid zoom range [{min}, {max}]"
            )));
        }
        Ok(Self { min, max })
    }

    /// NaN resets to 1.0 (clamped into the range).
    pub fn clamp(&self, factor: f64) -> f64 {
        if factor.is_nan() {
            return 1.0_f64.clamp(self.min, self.max);
        }
        factor.clamp(self.min, self.max)
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 0.5, max: 2.0 }
    }
}

/// A control value as stored by the engine, plus the outcome of writing it
/// to the pipeline. The stored value stands even when the write failed.
#[derive(Debug)]
#[must_use]
pub struct Update<T> {
    pub applied: Applied<T>,
    pub write: DuofeedResult<()>,
}

impl<T: Copy> Update<T> {
    /// The applied value, or the write error.
    pub fn into_result(self) -> DuofeedResult<Applied<T>> {
        self.write.map(|()| self.applied)
    }
}

#[derive(Debug, Clone)]
struct FeedState {
    feed: Feed,
    /// Geometry the pipeline last accepted.
    synced: Option<Geometry>,
    /// Base placement on `anchor_canvas`.
    anchor: Geometry,
}

pub struct CompositingLayoutEngine {
    /// Registration order.
    feeds: Vec<FeedState>,
    policy: LayoutPolicy,
    canvas: Canvas,
    canvas_synced: Option<Canvas>,
    anchor_canvas: Canvas,
    zoom: ZoomRange,
    slot: HandleSlot,
}

impl CompositingLayoutEngine {
    /// Take over the feeds of a freshly built graph. The description's
    /// initial placement, crop and canvas count as already written.
    pub fn from_description(
        description: &GraphDescription,
        zoom: ZoomRange,
        slot: HandleSlot,
    ) -> Self {
        let feeds = description
            .feeds
            .iter()
            .enumerate()
            .map(|(index, branch)| FeedState {
                feed: Feed::new(index, &branch.source, branch.crop, branch.geometry),
                synced: Some(branch.geometry),
                anchor: branch.geometry,
            })
            .collect();

        Self {
            feeds,
            policy: description.policy,
            canvas: description.canvas,
            canvas_synced: Some(description.canvas),
            anchor_canvas: description.canvas,
            zoom,
            slot,
        }
    }

    pub fn feed(&self, name: &FeedName) -> Option<&Feed> {
        self.feeds
            .iter()
            .map(|s| &s.feed)
            .find(|feed| &feed.name == name)
    }

    /// Feeds in registration order.
    pub fn feeds(&self) -> impl Iterator<Item = &Feed> {
        self.feeds.iter().map(|s| &s.feed)
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn policy(&self) -> LayoutPolicy {
        self.policy
    }

    pub fn zoom_range(&self) -> ZoomRange {
        self.zoom
    }

    /// Feeds bottom to top. Equal z-orders keep registration order.
    pub fn draw_order(&self) -> Vec<&Feed> {
        let mut order: Vec<&Feed> = self.feeds().collect();
        order.sort_by_key(|feed| feed.z_order);
        order
    }

    /// Recompute base geometry with the active policy and re-apply each
    /// feed's zoom. Only geometry that differs from what the pipeline last
    /// accepted is written.
    pub fn apply_layout(&mut self, canvas: Canvas) -> DuofeedResult<()> {
        if canvas.is_empty() {
            tracing::debug!(canvas = %canvas, "Ignoring empty canvas");
            return Ok(());
        }
        self.canvas = canvas;

        let bases: Vec<Geometry> = self.feeds.iter().map(|s| s.feed.base_geometry).collect();
        let arranged = self.policy.arrange(canvas, &bases);
        for (state, base) in self.feeds.iter_mut().zip(arranged) {
            state.feed.base_geometry = base;
            state.feed.geometry = base.zoomed(state.feed.zoom);
        }
        self.reanchor();

        tracing::debug!(canvas = %canvas, policy = %self.policy, "Layout applied");
        self.sync()
    }

    /// Drop every zoom and re-run the active policy.
    pub fn reset_layout(&mut self) -> DuofeedResult<()> {
        for state in &mut self.feeds {
            state.feed.zoom = 1.0;
        }
        self.apply_layout(self.canvas)
    }

    pub fn set_policy(&mut self, policy: LayoutPolicy) -> DuofeedResult<()> {
        if policy != self.policy {
            tracing::info!(from = %self.policy, to = %policy, "Layout policy changed");
        }
        self.policy = policy;
        self.apply_layout(self.canvas)
    }

    /// Auto policies re-run; `Manual` scales every placement with the canvas.
    pub fn on_canvas_resized(&mut self, canvas: Canvas) -> DuofeedResult<()> {
        if self.policy.relayouts_on_resize() {
            return self.apply_layout(canvas);
        }
        if canvas.is_empty() {
            tracing::debug!(canvas = %canvas, "Ignoring empty canvas");
            return Ok(());
        }

        let sx = canvas.width as f64 / self.anchor_canvas.width as f64;
        let sy = canvas.height as f64 / self.anchor_canvas.height as f64;
        for state in &mut self.feeds {
            state.feed.base_geometry = state.anchor.rescaled(sx, sy);
            state.feed.geometry = state.feed.base_geometry.zoomed(state.feed.zoom);
        }
        self.canvas = canvas;

        tracing::debug!(canvas = %canvas, anchor = %self.anchor_canvas, sx, sy, "Manual layout rescaled");
        self.sync()
    }

    /// Clamp `value` so at least one source pixel survives on the edge's
    /// axis, then write it to the feed's crop stage.
    pub fn set_crop(
        &mut self,
        name: &FeedName,
        edge: CropEdge,
        value: i64,
    ) -> DuofeedResult<Update<u32>> {
        let index = self.index_of(name)?;
        let feed = &mut self.feeds[index].feed;

        let max = feed
            .crop
            .max_safe(edge, feed.source_width, feed.source_height);
        let applied = value.clamp(0, max as i64) as u32;
        feed.crop.set(edge, applied);

        let result = if applied as i64 == value {
            Applied::AsRequested(applied)
        } else {
            Applied::ClampAdjusted(applied)
        };
        tracing::debug!(feed = %name, edge = %edge, requested = value, applied, "Crop");

        Ok(Update {
            applied: result,
            write: self.write(name, PropertyWrite::Crop { edge, value: applied }),
        })
    }

    /// Clamp to `[0, 1]`; NaN becomes 0.
    pub fn set_alpha(&mut self, name: &FeedName, value: f64) -> DuofeedResult<Update<f64>> {
        let index = self.index_of(name)?;
        let applied = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
        self.feeds[index].feed.alpha = applied;
        tracing::debug!(feed = %name, requested = value, applied, "Alpha");

        Ok(Update {
            applied: Applied::from_clamp(value, applied),
            write: self.write(name, PropertyWrite::Alpha(applied)),
        })
    }

    pub fn set_z_order(&mut self, name: &FeedName, value: u32) -> DuofeedResult<Update<u32>> {
        let index = self.index_of(name)?;
        self.feeds[index].feed.z_order = value;
        tracing::debug!(feed = %name, value, "Z-order");

        Ok(Update {
            applied: Applied::AsRequested(value),
            write: self.write(name, PropertyWrite::ZOrder(value)),
        })
    }

    /// Resize the feed to its base size times `factor`, keeping its origin.
    /// The factor is stored and re-applied by every later layout pass.
    pub fn set_zoom(&mut self, name: &FeedName, factor: f64) -> DuofeedResult<Update<f64>> {
        let index = self.index_of(name)?;
        let applied = self.zoom.clamp(factor);

        let feed = &mut self.feeds[index].feed;
        feed.zoom = applied;
        feed.geometry = feed.base_geometry.zoomed(applied);
        tracing::debug!(feed = %name, requested = factor, applied, geometry = ?feed.geometry, "Zoom");

        Ok(Update {
            applied: Applied::from_clamp(factor, applied),
            write: self.sync_feed(index),
        })
    }

    /// Move the feed's origin, clamped to the canvas.
    pub fn set_position(
        &mut self,
        name: &FeedName,
        x: i32,
        y: i32,
    ) -> DuofeedResult<Update<(i32, i32)>> {
        let index = self.index_of(name)?;
        let max_x = i32::try_from(self.canvas.width).unwrap_or(i32::MAX);
        let max_y = i32::try_from(self.canvas.height).unwrap_or(i32::MAX);
        let applied = (x.clamp(0, max_x), y.clamp(0, max_y));

        let feed = &mut self.feeds[index].feed;
        feed.geometry = feed.geometry.moved_to(applied.0, applied.1);
        feed.base_geometry = feed.base_geometry.moved_to(applied.0, applied.1);
        tracing::debug!(feed = %name, x = applied.0, y = applied.1, "Position");
        self.reanchor();

        Ok(Update {
            applied: Applied::from_clamp((x, y), applied),
            write: self.sync_feed(index),
        })
    }

    /// Push every feed's full state into a freshly built graph, which starts
    /// from the description's defaults. All writes are attempted; the first
    /// failure is reported.
    pub fn restore(&mut self) -> DuofeedResult<()> {
        self.canvas_synced = None;
        for state in &mut self.feeds {
            state.synced = None;
        }

        let mut first_error = None;
        for state in &self.feeds {
            let feed = &state.feed;
            let writes = CropEdge::ALL
                .iter()
                .map(|&edge| PropertyWrite::Crop {
                    edge,
                    value: feed.crop.get(edge),
                })
                .chain([PropertyWrite::Alpha(feed.alpha), PropertyWrite::ZOrder(feed.z_order)]);
            for write in writes {
                if let Err(e) = self.write(&feed.name, write) {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Err(e) = self.sync() {
            first_error.get_or_insert(e);
        }

        tracing::debug!(feeds = self.feeds.len(), "Feed state restored");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Make the current canvas and base placements the reference for later
    /// manual rescales.
    fn reanchor(&mut self) {
        self.anchor_canvas = self.canvas;
        for state in &mut self.feeds {
            state.anchor = state.feed.base_geometry;
        }
    }

    fn index_of(&self, name: &FeedName) -> DuofeedResult<usize> {
        self.feeds
            .iter()
            .position(|s| &s.feed.name == name)
            .ok_or_else(|| DuofeedError::unknown_feed(name.as_str()))
    }

    fn write(&self, name: &FeedName, write: PropertyWrite) -> DuofeedResult<()> {
        self.slot.with(|handle| handle.write(name, write))
    }

    fn sync_feed(&mut self, index: usize) -> DuofeedResult<()> {
        let state = &self.feeds[index];
        let geometry = state.feed.geometry;
        if state.synced == Some(geometry) {
            return Ok(());
        }
        self.write(&state.feed.name, PropertyWrite::Geometry(geometry))?;
        self.feeds[index].synced = Some(geometry);
        Ok(())
    }

    /// Push the canvas and every unsynced geometry. All feeds are attempted;
    /// the first failure is reported.
    fn sync(&mut self) -> DuofeedResult<()> {
        let mut first_error = None;

        if self.canvas_synced != Some(self.canvas) {
            let canvas = self.canvas;
            match self.slot.with(|handle| handle.set_canvas(canvas)) {
                Ok(()) => self.canvas_synced = Some(canvas),
                Err(e) => first_error = Some(e),
            }
        }

        for index in 0..self.feeds.len() {
            if let Err(e) = self.sync_feed(index) {
                tracing::warn!(feed = %self.feeds[index].feed.name, error = %e, "Geometry write failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for CompositingLayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositingLayoutEngine")
            .field("feeds", &self.feeds.len())
            .field("policy", &self.policy)
            .field("canvas", &self.canvas)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use duofeed_layout_model::{CaptureFormat, CaptureSource, CropInsets};
    use duofeed_pipeline::{
        BackendCapability, BackendKind, MemoryLog, MemoryRuntime, PipelineDescriptionBuilder,
        PipelineLifecycleController, SelectedBackend,
    };
    use tokio::sync::mpsc;

    use super::*;

    struct Rig {
        engine: CompositingLayoutEngine,
        controller: PipelineLifecycleController,
        log: MemoryLog,
    }

    fn sources(n: usize) -> Vec<CaptureSource> {
        (0..n)
            .map(|i| CaptureSource {
                id: format!("video{i}"),
                path: PathBuf::from(format!("/dev/video{i}")),
                format: CaptureFormat {
                    width: 640,
                    height: 480,
                    ..CaptureFormat::default()
                },
            })
            .collect()
    }

    fn description(canvas: Canvas, policy: LayoutPolicy) -> GraphDescription {
        PipelineDescriptionBuilder::new(
            SelectedBackend::new(BackendCapability::new("gtksink", BackendKind::NativeWidget)),
            canvas,
        )
        .with_policy(policy)
        .build(&sources(2))
        .unwrap()
    }

    fn rig_with(runtime: MemoryRuntime, canvas: Canvas, policy: LayoutPolicy) -> Rig {
        let description = description(canvas, policy);

        let log = runtime.log();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut controller = PipelineLifecycleController::new(Box::new(runtime), tx);
        controller.build(&description).unwrap();
        controller.start().unwrap();

        let engine =
            CompositingLayoutEngine::from_description(&description, ZoomRange::default(), controller.slot());
        Rig {
            engine,
            controller,
            log,
        }
    }

    fn rig(canvas: Canvas) -> Rig {
        rig_with(MemoryRuntime::new(), canvas, LayoutPolicy::EqualSplit)
    }

    fn feed0() -> FeedName {
        FeedName::from_index(0)
    }

    fn feed1() -> FeedName {
        FeedName::from_index(1)
    }

    fn geometry(engine: &CompositingLayoutEngine, name: &FeedName) -> Geometry {
        engine.feed(name).unwrap().geometry
    }

    #[test]
    fn test_two_feeds_split_720p_evenly() {
        let mut rig = rig(Canvas::new(1280, 720));
        rig.engine.apply_layout(Canvas::new(1280, 720)).unwrap();
        assert_eq!(geometry(&rig.engine, &feed0()), Geometry::new(0, 0, 640, 720));
        assert_eq!(geometry(&rig.engine, &feed1()), Geometry::new(640, 0, 640, 720));
    }

    #[test]
    fn test_odd_width_remainder_goes_to_second_feed() {
        let mut rig = rig(Canvas::new(1280, 720));
        rig.engine.on_canvas_resized(Canvas::new(1281, 720)).unwrap();
        let g0 = geometry(&rig.engine, &feed0());
        let g1 = geometry(&rig.engine, &feed1());
        assert_eq!(g0.width, 640);
        assert_eq!(g1.width, 641);
        assert_eq!(g0.right(), g1.x as i64);
        assert_eq!(g1.right(), 1281);
    }

    #[test]
    fn test_apply_layout_is_idempotent() {
        let mut rig = rig(Canvas::new(1920, 1080));
        rig.engine.apply_layout(Canvas::new(1000, 500)).unwrap();
        let after_first = rig.log.write_count();
        let before: Vec<Feed> = rig.engine.feeds().cloned().collect();

        rig.engine.apply_layout(Canvas::new(1000, 500)).unwrap();
        let after: Vec<Feed> = rig.engine.feeds().cloned().collect();

        assert_eq!(before, after);
        assert_eq!(rig.log.write_count(), after_first);
        assert_eq!(rig.log.canvases(), vec![Canvas::new(1000, 500)]);
    }

    #[test]
    fn test_crop_is_clamped_to_leave_a_pixel() {
        let mut rig = rig(Canvas::new(1280, 720));
        let update = rig.engine.set_crop(&feed0(), CropEdge::Left, 10_000).unwrap();
        assert_eq!(update.applied, Applied::ClampAdjusted(639));
        assert!(update.write.is_ok());

        let update = rig.engine.set_crop(&feed0(), CropEdge::Right, 5).unwrap();
        assert_eq!(update.applied, Applied::ClampAdjusted(0));

        let crop = rig.engine.feed(&feed0()).unwrap().crop;
        assert!(crop.fits(640, 480));
    }

    #[test]
    fn test_crop_in_range_applies_as_requested() {
        let mut rig = rig(Canvas::new(1280, 720));
        let applied = rig
            .engine
            .set_crop(&feed1(), CropEdge::Top, 40)
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(applied, Applied::AsRequested(40));
        assert_eq!(
            rig.log.writes().last().unwrap(),
            &(feed1(), PropertyWrite::Crop { edge: CropEdge::Top, value: 40 })
        );
    }

    #[test]
    fn test_negative_crop_clamps_to_zero() {
        let mut rig = rig(Canvas::new(1280, 720));
        assert_eq!(
            rig.engine.set_crop(&feed0(), CropEdge::Bottom, -3).unwrap().applied,
            Applied::ClampAdjusted(0)
        );
    }

    #[test]
    fn test_alpha_is_always_in_unit_range() {
        let mut rig = rig(Canvas::new(1280, 720));
        let mut alpha = |value: f64| rig.engine.set_alpha(&feed0(), value).unwrap().applied;
        assert_eq!(alpha(1.7), Applied::ClampAdjusted(1.0));
        assert_eq!(alpha(-0.2), Applied::ClampAdjusted(0.0));
        assert_eq!(alpha(0.25), Applied::AsRequested(0.25));
        assert!(alpha(f64::NAN).was_clamped());
        assert_eq!(rig.engine.feed(&feed0()).unwrap().alpha, 0.0);
    }

    #[test]
    fn test_z_order_ties_keep_registration_order() {
        let mut rig = rig(Canvas::new(1280, 720));
        rig.engine.set_z_order(&feed0(), 5).unwrap().into_result().unwrap();
        rig.engine.set_z_order(&feed1(), 5).unwrap().into_result().unwrap();
        let order: Vec<&str> = rig.engine.draw_order().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(order, vec!["feed0", "feed1"]);

        rig.engine.set_z_order(&feed0(), 9).unwrap().into_result().unwrap();
        let order: Vec<&str> = rig.engine.draw_order().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(order, vec!["feed1", "feed0"]);
    }

    #[test]
    fn test_zoom_is_relative_to_base_and_keeps_origin() {
        let mut rig = rig(Canvas::new(1280, 720));
        rig.engine.set_zoom(&feed1(), 1.5).unwrap().into_result().unwrap();
        rig.engine.set_zoom(&feed1(), 1.5).unwrap().into_result().unwrap();
        assert_eq!(geometry(&rig.engine, &feed1()), Geometry::new(640, 0, 960, 1080));

        let update = rig.engine.set_zoom(&feed1(), 3.0).unwrap();
        assert_eq!(update.applied, Applied::ClampAdjusted(2.0));
        assert_eq!(geometry(&rig.engine, &feed1()), Geometry::new(640, 0, 1280, 1440));
    }

    #[test]
    fn test_resize_after_zoom_uses_new_base() {
        let mut rig = rig(Canvas::new(1280, 720));
        rig.engine.set_zoom(&feed0(), 0.5).unwrap().into_result().unwrap();
        rig.engine.on_canvas_resized(Canvas::new(1920, 1080)).unwrap();
        assert_eq!(
            rig.engine.feed(&feed0()).unwrap().base_geometry,
            Geometry::new(0, 0, 960, 1080)
        );
        assert_eq!(geometry(&rig.engine, &feed0()), Geometry::new(0, 0, 480, 540));
    }

    #[test]
    fn test_reset_layout_drops_zoom() {
        let mut rig = rig(Canvas::new(1280, 720));
        rig.engine.set_zoom(&feed0(), 2.0).unwrap().into_result().unwrap();
        rig.engine.reset_layout().unwrap();
        assert_eq!(rig.engine.feed(&feed0()).unwrap().zoom, 1.0);
        assert_eq!(geometry(&rig.engine, &feed0()), Geometry::new(0, 0, 640, 720));
    }

    #[test]
    fn test_position_is_clamped_to_canvas() {
        let mut rig = rig(Canvas::new(1280, 720));
        assert_eq!(
            rig.engine.set_position(&feed0(), 10, 20).unwrap().applied,
            Applied::AsRequested((10, 20))
        );
        assert_eq!(
            rig.engine.set_position(&feed0(), -5, 9000).unwrap().applied,
            Applied::ClampAdjusted((0, 720))
        );
    }

    #[test]
    fn test_overlay_policy_stacks_full_canvas() {
        let mut rig = rig(Canvas::new(1280, 720));
        rig.engine.set_policy(LayoutPolicy::FullOverlay).unwrap();
        for feed in rig.engine.feeds() {
            assert_eq!(feed.geometry, Geometry::new(0, 0, 1280, 720));
        }
    }

    #[test]
    fn test_manual_policy_rescales_on_resize() {
        let mut rig = rig_with(
            MemoryRuntime::new(),
            Canvas::new(1000, 500),
            LayoutPolicy::Manual,
        );
        rig.engine.set_position(&feed1(), 600, 100).unwrap().into_result().unwrap();
        rig.engine.on_canvas_resized(Canvas::new(2000, 1000)).unwrap();
        assert_eq!(geometry(&rig.engine, &feed1()), Geometry::new(1200, 200, 1000, 1000));
        assert_eq!(rig.engine.canvas(), Canvas::new(2000, 1000));
    }

    #[test]
    fn test_manual_drag_down_and_back_does_not_drift() {
        let mut rig = rig_with(
            MemoryRuntime::new(),
            Canvas::new(1280, 720),
            LayoutPolicy::Manual,
        );
        let original: Vec<Geometry> = rig.engine.feeds().map(|f| f.geometry).collect();

        for width in (900..1280).rev().chain(901..=1280) {
            rig.engine.on_canvas_resized(Canvas::new(width, 720)).unwrap();
            let g0 = geometry(&rig.engine, &feed0());
            let g1 = geometry(&rig.engine, &feed1());
            assert_eq!(g0.right(), g1.x as i64, "gap or overlap at width {width}");
            assert_eq!(g1.right(), width as i64, "feed1 off canvas at width {width}");
        }
        let after: Vec<Geometry> = rig.engine.feeds().map(|f| f.geometry).collect();
        assert_eq!(after, original);

        rig.engine.on_canvas_resized(Canvas::new(3, 2)).unwrap();
        rig.engine.on_canvas_resized(Canvas::new(1280, 720)).unwrap();
        let after: Vec<Geometry> = rig.engine.feeds().map(|f| f.geometry).collect();
        assert_eq!(after, original);
    }

    #[test]
    fn test_manual_rescale_follows_latest_placement() {
        let mut rig = rig_with(
            MemoryRuntime::new(),
            Canvas::new(1000, 500),
            LayoutPolicy::Manual,
        );
        rig.engine.on_canvas_resized(Canvas::new(500, 250)).unwrap();
        rig.engine.set_position(&feed1(), 100, 50).unwrap().into_result().unwrap();
        rig.engine.on_canvas_resized(Canvas::new(1000, 500)).unwrap();
        assert_eq!(geometry(&rig.engine, &feed1()), Geometry::new(200, 100, 500, 500));
        assert_eq!(geometry(&rig.engine, &feed0()), Geometry::new(0, 0, 500, 500));
    }

    #[test]
    fn test_unknown_feed_is_rejected() {
        let mut rig = rig(Canvas::new(1280, 720));
        let ghost = FeedName::from("feed7");
        assert!(matches!(
            rig.engine.set_alpha(&ghost, 0.5).unwrap_err(),
            DuofeedError::UnknownFeed { .. }
        ));
        assert!(matches!(
            rig.engine.set_crop(&ghost, CropEdge::Left, 1).unwrap_err(),
            DuofeedError::UnknownFeed { .. }
        ));
        assert_eq!(rig.log.write_count(), 0);
    }

    #[test]
    fn test_failed_geometry_is_resent_on_next_layout() {
        let mut rig = rig(Canvas::new(1280, 720));
        rig.controller.stop();

        let err = rig.engine.apply_layout(Canvas::new(800, 600)).unwrap_err();
        assert!(matches!(err, DuofeedError::PipelineNotRunning));
        assert_eq!(geometry(&rig.engine, &feed0()), Geometry::new(0, 0, 400, 600));

        rig.controller
            .build(&description(Canvas::new(1280, 720), LayoutPolicy::EqualSplit))
            .unwrap();

        rig.engine.apply_layout(Canvas::new(800, 600)).unwrap();
        let geometry_writes = rig
            .log
            .writes()
            .into_iter()
            .filter(|(_, w)| matches!(w, PropertyWrite::Geometry(_)))
            .count();
        assert_eq!(geometry_writes, 2);
    }

    #[test]
    fn test_write_failure_still_reports_clamped_value() {
        let runtime = MemoryRuntime::new().with_fail_writes();
        let mut rig = rig_with(runtime, Canvas::new(1280, 720), LayoutPolicy::EqualSplit);

        let update = rig.engine.set_crop(&feed0(), CropEdge::Left, 10_000).unwrap();
        assert_eq!(update.applied, Applied::ClampAdjusted(639));
        assert!(matches!(update.write, Err(DuofeedError::PropertyWrite { .. })));
        assert_eq!(rig.engine.feed(&feed0()).unwrap().crop, CropInsets::new(639, 0, 0, 0));

        let update = rig.engine.set_alpha(&feed1(), 3.0).unwrap();
        assert_eq!(update.applied, Applied::ClampAdjusted(1.0));
        assert!(update.into_result().is_err());
    }

    #[test]
    fn test_restore_pushes_full_state_into_new_graph() {
        let mut rig = rig(Canvas::new(1280, 720));
        rig.engine.set_crop(&feed0(), CropEdge::Left, 40).unwrap().into_result().unwrap();
        rig.engine.set_alpha(&feed1(), 0.5).unwrap().into_result().unwrap();
        rig.engine.set_zoom(&feed1(), 0.5).unwrap().into_result().unwrap();
        rig.controller.stop();

        rig.controller
            .build(&description(Canvas::new(1280, 720), LayoutPolicy::EqualSplit))
            .unwrap();
        let before = rig.log.write_count();
        rig.engine.restore().unwrap();
        let writes = rig.log.writes().split_off(before);

        assert!(writes.contains(&(feed0(), PropertyWrite::Crop { edge: CropEdge::Left, value: 40 })));
        assert!(writes.contains(&(feed1(), PropertyWrite::Alpha(0.5))));
        assert!(writes.contains(&(
            feed1(),
            PropertyWrite::Geometry(Geometry::new(640, 0, 320, 360))
        )));
        assert!(writes.contains(&(
            feed0(),
            PropertyWrite::Geometry(Geometry::new(0, 0, 640, 720))
        )));
        assert_eq!(rig.log.canvases().last(), Some(&Canvas::new(1280, 720)));
    }

    #[test]
    fn test_stop_during_write_does_not_deadlock() {
        let runtime = MemoryRuntime::new().with_write_delay(Duration::from_millis(200));
        let Rig {
            mut engine,
            mut controller,
            ..
        } = rig_with(runtime, Canvas::new(1280, 720), LayoutPolicy::EqualSplit);

        let (started_tx, started_rx) = std_mpsc::channel();
        let writer = std::thread::spawn(move || {
            started_tx.send(()).unwrap();
            let first = engine.set_alpha(&FeedName::from_index(0), 0.5).unwrap();
            (engine, first)
        });

        started_rx.recv().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        controller.stop();

        let (mut engine, first) = writer.join().unwrap();
        assert!(first.write.is_ok() || matches!(first.write, Err(DuofeedError::PipelineNotRunning)));

        let second = engine.set_alpha(&FeedName::from_index(0), 0.7).unwrap();
        assert_eq!(second.applied, Applied::AsRequested(0.7));
        assert!(matches!(second.write, Err(DuofeedError::PipelineNotRunning)));
        assert_eq!(engine.feed(&FeedName::from_index(0)).unwrap().alpha, 0.7);
    }

    #[test]
    fn test_zoom_range_rejects_inverted_bounds() {
        assert!(ZoomRange::new(2.0, 0.5).is_err());
        assert!(ZoomRange::new(0.0, 1.0).is_err());
        assert_eq!(ZoomRange::new(0.5, 2.0).unwrap(), ZoomRange::default());
    }
}

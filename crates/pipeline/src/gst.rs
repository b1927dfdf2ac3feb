//! GStreamer realization of the pipeline seam.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use duofeed_common::error::{DuofeedError, DuofeedResult};
use duofeed_layout_model::{Canvas, FeedName};
use gst::glib;
use gst::prelude::*;
use gst_video::prelude::*;
use gstreamer as gst;
use gstreamer_video as gst_video;

use crate::backend::{BackendCapability, BackendProbe, EmbeddingProtocol};
use crate::description::{GraphDescription, CANVAS_CAPS_NAME, COMPOSITOR_NAME, SINK_NAME};
use crate::handle::{
    GraphState, HandleRequestOrigin, PipelineEvent, PipelineEventSender, PipelineHandle,
    PipelineRuntime, PropertyWrite, SurfaceHandle,
};

/// Probes backends through the GStreamer element registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct GstProbe;

impl BackendProbe for GstProbe {
    fn is_available(&self, capability: &BackendCapability) -> bool {
        element_available(&capability.factory)
    }
}

/// Whether an element factory is registered.
pub fn element_available(factory: &str) -> bool {
    if let Err(e) = init_gstreamer() {
        tracing::warn!(error = %e, "Cannot query the element registry");
        return false;
    }
    gst::ElementFactory::find(factory).is_some()
}

/// Realizes descriptions with `gst::parse::launch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GstRuntime;

impl PipelineRuntime for GstRuntime {
    fn realize(
        &self,
        description: &GraphDescription,
        events: PipelineEventSender,
    ) -> DuofeedResult<Box<dyn PipelineHandle>> {
        init_gstreamer()?;

        let launch = description.to_launch();
        let element = gst::parse::launch(&launch)
            .map_err(|e| DuofeedError::graph(format!("Failed to build pipeline: {e}")))?;

        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| DuofeedError::graph("Launch string did not produce a pipeline"))?;

        let handle = GstPipelineHandle::from_pipeline(pipeline, description, events)?;
        Ok(Box::new(handle))
    }
}

/// Live stages of one feed.
struct FeedStages {
    pad: gst::Pad,
    crop: gst::Element,
}

/// A parsed pipeline plus the name-to-stage table built once at construction.
pub struct GstPipelineHandle {
    pipeline: gst::Pipeline,
    canvas_caps: gst::Element,
    sink: gst::Element,
    stages: HashMap<FeedName, FeedStages>,
    /// Read by the bus sync handler when the sink asks for a window.
    surface: Arc<Mutex<Option<SurfaceHandle>>>,
    released: bool,
}

impl GstPipelineHandle {
    pub fn from_pipeline(
        pipeline: gst::Pipeline,
        description: &GraphDescription,
        events: PipelineEventSender,
    ) -> DuofeedResult<Self> {
        let compositor = by_name(&pipeline, COMPOSITOR_NAME)?;
        let canvas_caps = by_name(&pipeline, CANVAS_CAPS_NAME)?;
        let sink = by_name(&pipeline, SINK_NAME)?;

        let mut stages = HashMap::with_capacity(description.feeds.len());
        for branch in &description.feeds {
            let crop = by_name(&pipeline, &branch.crop_stage)?;
            let pad = compositor
                .static_pad(&branch.compositor_pad)
                .ok_or_else(|| {
                    DuofeedError::graph(format!(
                        "compositor has no pad {} for {}",
                        branch.compositor_pad, branch.feed
                    ))
                })?;
            stages.insert(branch.feed.clone(), FeedStages { pad, crop });
        }

        let surface = Arc::new(Mutex::new(None));
        install_bus_handler(&pipeline, Arc::clone(&surface), events.clone())?;

        let accepts_handle = sink.dynamic_cast_ref::<gst_video::VideoOverlay>().is_some();
        if description.backend.embedding == EmbeddingProtocol::HandleEmbedding {
            if !accepts_handle {
                return Err(DuofeedError::graph(format!(
                    "{} does not accept window handles",
                    description.backend.factory()
                )));
            }
            // Live sources only negotiate caps once playing, so the sink's own
            // prepare-window-handle message arrives too late to gate the
            // Paused -> Playing transition. An overlay-capable sink is
            // announced as requesting a handle as soon as it exists.
            let _ = events.send(PipelineEvent::HandleRequested(HandleRequestOrigin::Realize));
        }

        tracing::info!(
            feeds = stages.len(),
            sink = %description.backend.factory(),
            "Pipeline realized"
        );

        Ok(Self {
            pipeline,
            canvas_caps,
            sink,
            stages,
            surface,
            released: false,
        })
    }

    fn stages(&self, feed: &FeedName) -> DuofeedResult<&FeedStages> {
        self.stages
            .get(feed)
            .ok_or_else(|| DuofeedError::property_write(format!("no stages for {feed}")))
    }
}

impl PipelineHandle for GstPipelineHandle {
    fn write(&mut self, feed: &FeedName, write: PropertyWrite) -> DuofeedResult<()> {
        if self.released {
            return Err(DuofeedError::PipelineNotRunning);
        }
        let stages = self.stages(feed)?;
        match write {
            PropertyWrite::Geometry(g) => {
                set_checked(&stages.pad, "xpos", g.x)?;
                set_checked(&stages.pad, "ypos", g.y)?;
                set_checked(&stages.pad, "width", to_gint(g.width))?;
                set_checked(&stages.pad, "height", to_gint(g.height))?;
            }
            PropertyWrite::Alpha(alpha) => set_checked(&stages.pad, "alpha", alpha)?,
            PropertyWrite::ZOrder(z) => set_checked(&stages.pad, "zorder", z)?,
            PropertyWrite::Crop { edge, value } => {
                set_checked(&stages.crop, edge.as_str(), to_gint(value))?
            }
        }
        tracing::trace!(feed = %feed, ?write, "Property write");
        Ok(())
    }

    fn set_canvas(&mut self, canvas: Canvas) -> DuofeedResult<()> {
        if self.released {
            return Err(DuofeedError::PipelineNotRunning);
        }
        let caps = gst::Caps::builder("video/x-raw")
            .field("width", to_gint(canvas.width))
            .field("height", to_gint(canvas.height))
            .build();
        set_checked(&self.canvas_caps, "caps", &caps)
    }

    fn set_state(&mut self, state: GraphState) -> DuofeedResult<()> {
        if self.released {
            return Err(DuofeedError::PipelineNotRunning);
        }
        let target = match state {
            GraphState::Null => gst::State::Null,
            GraphState::Ready => gst::State::Ready,
            GraphState::Paused => gst::State::Paused,
            GraphState::Playing => gst::State::Playing,
        };
        let success = self.pipeline.set_state(target).map_err(|e| {
            DuofeedError::graph(format!("Failed to set pipeline to {target:?}: {e:?}"))
        })?;
        tracing::debug!(state = ?target, ?success, "Pipeline state change");
        Ok(())
    }

    fn embed_surface(&mut self, surface: SurfaceHandle) -> DuofeedResult<()> {
        if self.released {
            return Err(DuofeedError::PipelineNotRunning);
        }
        *self.surface.lock().unwrap_or_else(PoisonError::into_inner) = Some(surface);
        let overlay = self
            .sink
            .dynamic_cast_ref::<gst_video::VideoOverlay>()
            .ok_or_else(|| DuofeedError::property_write("sink does not accept window handles"))?;
        // SAFETY: the windowing layer only reports a surface once it is
        // realized, and keeps it alive until shutdown, which releases this
        // pipeline first.
        unsafe { overlay.set_window_handle(surface.0) };
        tracing::info!(handle = surface.0, "Window handle handed to sink");
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(error = ?e, "Failed to set pipeline to Null during release");
        }
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
        tracing::info!("Pipeline released");
    }
}

impl Drop for GstPipelineHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Forward bus traffic to the session without touching feed state here; the
/// handler runs on streaming threads.
fn install_bus_handler(
    pipeline: &gst::Pipeline,
    surface: Arc<Mutex<Option<SurfaceHandle>>>,
    events: PipelineEventSender,
) -> DuofeedResult<()> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| DuofeedError::graph("pipeline has no bus"))?;

    bus.set_sync_handler(move |_, msg| {
        if gst_video::is_video_overlay_prepare_window_handle_message(msg) {
            // The handle has to be set from inside this callback, before the
            // sink decides to open a window of its own.
            let current = *surface.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(SurfaceHandle(handle)) = current {
                if let Some(overlay) = msg
                    .src()
                    .and_then(|src| src.dynamic_cast_ref::<gst_video::VideoOverlay>())
                {
                    // SAFETY: see `embed_surface`.
                    unsafe { overlay.set_window_handle(handle) };
                }
            }
            let _ = events.send(PipelineEvent::HandleRequested(HandleRequestOrigin::Sink));
            return gst::BusSyncReply::Drop;
        }

        match msg.view() {
            gst::MessageView::Error(err) => {
                let source = err
                    .src()
                    .map(|s| s.path_string().to_string())
                    .unwrap_or_default();
                tracing::error!(source = %source, error = %err.error(), "Pipeline error");
                let _ = events.send(PipelineEvent::Error {
                    source,
                    message: err.error().to_string(),
                });
            }
            gst::MessageView::Warning(warning) => {
                tracing::warn!(error = %warning.error(), "Pipeline warning");
            }
            gst::MessageView::Eos(_) => {
                let _ = events.send(PipelineEvent::EndOfStream);
            }
            _ => {}
        }
        gst::BusSyncReply::Drop
    });
    Ok(())
}

fn by_name(pipeline: &gst::Pipeline, name: &str) -> DuofeedResult<gst::Element> {
    pipeline
        .by_name(name)
        .ok_or_else(|| DuofeedError::graph(format!("pipeline has no stage named {name}")))
}

fn set_checked<O: IsA<glib::Object>>(
    object: &O,
    name: &str,
    value: impl Into<glib::Value>,
) -> DuofeedResult<()> {
    if object.find_property(name).is_none() {
        return Err(DuofeedError::property_write(format!(
            "{} has no property '{name}'",
            object.as_ref().type_().name()
        )));
    }
    object.set_property(name, value);
    Ok(())
}

fn to_gint(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn init_gstreamer() -> DuofeedResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(DuofeedError::graph(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

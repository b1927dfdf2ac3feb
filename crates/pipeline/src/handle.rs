//! The seam between the layout engine and a realized media graph.
//!
//! [`PipelineRuntime`] turns a [`GraphDescription`] into a live
//! [`PipelineHandle`]. The handle is parked in a [`HandleSlot`] shared by the
//! lifecycle controller (which owns it) and the layout engine (which writes
//! through it). Every access takes the slot's lock, which is what serializes
//! property writes and lets `stop()` wait out a write in progress.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use duofeed_common::error::{DuofeedError, DuofeedResult};
use duofeed_layout_model::{Canvas, CropEdge, FeedName, Geometry};
use tokio::sync::mpsc;

use crate::description::GraphDescription;

/// Runtime state of the underlying graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Null,
    Ready,
    Paused,
    Playing,
}

/// A typed property write against one feed's stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyWrite {
    /// Compositor pad `xpos`/`ypos`/`width`/`height`.
    Geometry(Geometry),
    /// Compositor pad `alpha`.
    Alpha(f64),
    /// Compositor pad `zorder`.
    ZOrder(u32),
    /// One inset on the feed's crop stage.
    Crop { edge: CropEdge, value: u32 },
}

/// An OS-level drawable handle (X11 window id, HWND, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub usize);

/// Who asked for a window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRequestOrigin {
    /// The sink posted prepare-window-handle.
    Sink,
    /// Announced by the runtime when the graph was realized, ahead of the
    /// sink's own request.
    Realize,
}

/// Notifications raised by the running graph, possibly from streaming
/// threads. They must be handled on the session's event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The render stage asked for a window handle.
    HandleRequested(HandleRequestOrigin),
    /// A stage posted an error.
    Error { source: String, message: String },
    /// The graph drained.
    EndOfStream,
}

pub type PipelineEventSender = mpsc::UnboundedSender<PipelineEvent>;
pub type PipelineEventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// A realized graph.
///
/// Writes are fire-and-forget: the runtime applies them on its own schedule.
pub trait PipelineHandle: Send {
    /// Apply a property write to `feed`'s stages.
    fn write(&mut self, feed: &FeedName, write: PropertyWrite) -> DuofeedResult<()>;

    /// Re-pin the compositor output size.
    fn set_canvas(&mut self, canvas: Canvas) -> DuofeedResult<()>;

    /// Drive the graph to `state`.
    fn set_state(&mut self, state: GraphState) -> DuofeedResult<()>;

    /// Hand the render stage the surface to draw into.
    fn embed_surface(&mut self, surface: SurfaceHandle) -> DuofeedResult<()>;

    /// Tear the graph down. Must be safe to call more than once.
    fn release(&mut self);
}

/// Realizes graph descriptions.
pub trait PipelineRuntime: Send {
    fn realize(
        &self,
        description: &GraphDescription,
        events: PipelineEventSender,
    ) -> DuofeedResult<Box<dyn PipelineHandle>>;
}

/// Shared, lock-protected home of the current pipeline handle.
#[derive(Clone, Default)]
pub struct HandleSlot {
    inner: Arc<Mutex<Option<Box<dyn PipelineHandle>>>>,
}

impl HandleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the installed handle, or report `PipelineNotRunning`.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut dyn PipelineHandle) -> DuofeedResult<R>,
    ) -> DuofeedResult<R> {
        let mut guard = self.lock();
        match guard.as_deref_mut() {
            Some(handle) => f(handle),
            None => Err(DuofeedError::PipelineNotRunning),
        }
    }

    /// Install a freshly realized handle, releasing any previous one.
    pub fn install(&self, handle: Box<dyn PipelineHandle>) {
        let previous = self.lock().replace(handle);
        if let Some(mut previous) = previous {
            previous.release();
        }
    }

    /// Remove the handle. Waits for a write in progress to finish.
    pub fn take(&self) -> Option<Box<dyn PipelineHandle>> {
        self.lock().take()
    }

    pub fn is_installed(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn PipelineHandle>>> {
        // A panicking writer leaves the handle itself intact.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for HandleSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}

//! In-memory pipeline runtime.
//!
//! Records every operation instead of driving GStreamer, so the lifecycle
//! and layout logic can be exercised without capture hardware or a display.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use duofeed_common::error::{DuofeedError, DuofeedResult};
use duofeed_layout_model::{Canvas, FeedName};

use crate::description::GraphDescription;
use crate::handle::{
    GraphState, HandleRequestOrigin, PipelineEvent, PipelineEventSender, PipelineHandle,
    PipelineRuntime, PropertyWrite, SurfaceHandle,
};

/// Everything the in-memory handle was asked to do.
#[derive(Debug, Default)]
struct Journal {
    writes: Vec<(FeedName, PropertyWrite)>,
    states: Vec<GraphState>,
    surfaces: Vec<SurfaceHandle>,
    canvases: Vec<Canvas>,
    releases: usize,
}

/// Shared view of a [`MemoryRuntime`]'s journal.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Mutex<Journal>>,
}

impl MemoryLog {
    fn lock(&self) -> MutexGuard<'_, Journal> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn writes(&self) -> Vec<(FeedName, PropertyWrite)> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn states(&self) -> Vec<GraphState> {
        self.lock().states.clone()
    }

    pub fn surfaces(&self) -> Vec<SurfaceHandle> {
        self.lock().surfaces.clone()
    }

    pub fn canvases(&self) -> Vec<Canvas> {
        self.lock().canvases.clone()
    }

    pub fn releases(&self) -> usize {
        self.lock().releases
    }
}

/// Behaviour knobs for the in-memory runtime.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuntime {
    log: MemoryLog,
    /// Reject every description.
    pub fail_realize: bool,
    /// Fail every property write.
    pub fail_writes: bool,
    /// Emit `HandleRequested` as soon as the graph is realized.
    pub request_handle_on_realize: bool,
    /// Block inside each property write for this long.
    pub write_delay: Option<Duration>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MemoryLog {
        self.log.clone()
    }

    pub fn with_fail_realize(mut self) -> Self {
        self.fail_realize = true;
        self
    }

    pub fn with_fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn with_handle_request_on_realize(mut self) -> Self {
        self.request_handle_on_realize = true;
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }
}

impl PipelineRuntime for MemoryRuntime {
    fn realize(
        &self,
        description: &GraphDescription,
        events: PipelineEventSender,
    ) -> DuofeedResult<Box<dyn PipelineHandle>> {
        if self.fail_realize {
            return Err(DuofeedError::graph("in-memory runtime refused the description"));
        }
        if description.feeds.is_empty() {
            return Err(DuofeedError::graph("description has no feeds"));
        }
        if self.request_handle_on_realize {
            let _ = events.send(PipelineEvent::HandleRequested(HandleRequestOrigin::Realize));
        }
        Ok(Box::new(MemoryHandle {
            log: self.log.clone(),
            feeds: description.feeds.iter().map(|b| b.feed.clone()).collect(),
            fail_writes: self.fail_writes,
            write_delay: self.write_delay,
        }))
    }
}

/// Handle produced by [`MemoryRuntime`].
pub struct MemoryHandle {
    log: MemoryLog,
    feeds: Vec<FeedName>,
    fail_writes: bool,
    write_delay: Option<Duration>,
}

impl PipelineHandle for MemoryHandle {
    fn write(&mut self, feed: &FeedName, write: PropertyWrite) -> DuofeedResult<()> {
        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }
        if !self.feeds.contains(feed) {
            return Err(DuofeedError::property_write(format!("no stages for {feed}")));
        }
        if self.fail_writes {
            return Err(DuofeedError::property_write("in-memory write failure"));
        }
        self.log.lock().writes.push((feed.clone(), write));
        Ok(())
    }

    fn set_canvas(&mut self, canvas: Canvas) -> DuofeedResult<()> {
        self.log.lock().canvases.push(canvas);
        Ok(())
    }

    fn set_state(&mut self, state: GraphState) -> DuofeedResult<()> {
        self.log.lock().states.push(state);
        Ok(())
    }

    fn embed_surface(&mut self, surface: SurfaceHandle) -> DuofeedResult<()> {
        self.log.lock().surfaces.push(surface);
        Ok(())
    }

    fn release(&mut self) {
        let mut journal = self.log.lock();
        journal.states.push(GraphState::Null);
        journal.releases += 1;
    }
}

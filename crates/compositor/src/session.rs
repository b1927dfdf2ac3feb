//! A live compositing session.
//!
//! The session owns the lifecycle controller, the layout engine and the
//! pipeline event receiver. Its run loop is the single place where operator
//! input and pipeline notifications touch feed state.

use duofeed_common::error::{DuofeedError, DuofeedResult};
use duofeed_layout_model::{Applied, Canvas, CropEdge, FeedName, LayoutPolicy};
use duofeed_pipeline::{
    GraphDescription, HandleRequestOrigin, LifecycleState, PipelineEvent, PipelineEventReceiver,
    PipelineLifecycleController, PipelineRuntime, SurfaceHandle,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::engine::{CompositingLayoutEngine, ZoomRange};

/// Live control input.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Crop {
        feed: FeedName,
        edge: CropEdge,
        value: i64,
    },
    Alpha {
        feed: FeedName,
        value: f64,
    },
    ZOrder {
        feed: FeedName,
        value: u32,
    },
    Zoom {
        feed: FeedName,
        factor: f64,
    },
    Position {
        feed: FeedName,
        x: i32,
        y: i32,
    },
    Policy(LayoutPolicy),
    ResetLayout,
    /// Tear the graph down and realize the same description again, keeping
    /// every feed's live state.
    Rebuild,
}

/// What a control command actually applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlOutcome {
    Crop {
        feed: FeedName,
        edge: CropEdge,
        applied: Applied<u32>,
    },
    Alpha {
        feed: FeedName,
        applied: Applied<f64>,
    },
    ZOrder {
        feed: FeedName,
        applied: Applied<u32>,
    },
    Zoom {
        feed: FeedName,
        applied: Applied<f64>,
    },
    Position {
        feed: FeedName,
        applied: Applied<(i32, i32)>,
    },
    Layout {
        policy: LayoutPolicy,
        canvas: Canvas,
    },
    Rebuilt {
        state: LifecycleState,
    },
}

/// A control outcome plus the status of the pipeline write behind it.
///
/// The outcome holds even when the write failed; the engine keeps the value
/// and re-sends geometry on the next layout pass.
#[derive(Debug)]
pub struct ControlReport {
    pub outcome: ControlOutcome,
    pub write_error: Option<DuofeedError>,
}

impl ControlReport {
    fn new(outcome: ControlOutcome, write: DuofeedResult<()>) -> Self {
        Self {
            outcome,
            write_error: write.err(),
        }
    }
}

/// Everything the session reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The windowing layer realized a drawable surface.
    SurfacePrepared(SurfaceHandle),
    CanvasResized { width: u32, height: u32 },
    Control(ControlCommand),
    Pipeline(PipelineEvent),
    ShutdownRequested,
}

/// Result of handling one event.
#[derive(Debug)]
pub enum SessionStep {
    Continue,
    Applied(ControlReport),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionOptions {
    pub zoom: ZoomRange,
    /// Start without waiting for a host surface; the sink opens its own
    /// window.
    pub standalone: bool,
}

pub struct Session {
    engine: CompositingLayoutEngine,
    controller: PipelineLifecycleController,
    pipeline_events: PipelineEventReceiver,
    description: GraphDescription,
    standalone: bool,
}

impl Session {
    /// Realize `description` and start it.
    pub fn start(
        description: &GraphDescription,
        runtime: Box<dyn PipelineRuntime>,
        options: SessionOptions,
    ) -> DuofeedResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut controller = PipelineLifecycleController::new(runtime, tx);
        controller.build(description)?;

        let engine =
            CompositingLayoutEngine::from_description(description, options.zoom, controller.slot());

        let state = if options.standalone {
            controller.start_standalone()?
        } else {
            controller.start()?
        };
        tracing::info!(
            feeds = description.feeds.len(),
            canvas = %description.canvas,
            ?state,
            "Session started"
        );

        Ok(Self {
            engine,
            controller,
            pipeline_events: rx,
            description: description.clone(),
            standalone: options.standalone,
        })
    }

    pub fn engine(&self) -> &CompositingLayoutEngine {
        &self.engine
    }

    pub fn state(&self) -> LifecycleState {
        self.controller.state()
    }

    /// Apply one event. Recoverable failures come back as `Err` with the
    /// session still usable; fatal ones have already stopped the pipeline.
    pub fn handle(&mut self, event: SessionEvent) -> DuofeedResult<SessionStep> {
        match event {
            SessionEvent::SurfacePrepared(surface) => {
                self.controller.surface_prepared(surface)?;
                Ok(SessionStep::Continue)
            }
            SessionEvent::CanvasResized { width, height } => {
                self.engine.on_canvas_resized(Canvas::new(width, height))?;
                Ok(SessionStep::Continue)
            }
            SessionEvent::Control(command) => self.apply(command).map(SessionStep::Applied),
            SessionEvent::Pipeline(PipelineEvent::HandleRequested(origin)) => {
                if origin == HandleRequestOrigin::Realize {
                    tracing::debug!("Window handle request announced at realize, ahead of the sink");
                }
                self.controller.handle_requested()?;
                Ok(SessionStep::Continue)
            }
            SessionEvent::Pipeline(PipelineEvent::Error { source, message }) => {
                let error = DuofeedError::graph(format!("{source}: {message}"));
                self.controller.fail(&error);
                Err(error)
            }
            SessionEvent::Pipeline(PipelineEvent::EndOfStream) => {
                tracing::info!("Pipeline reached end of stream");
                self.controller.stop();
                Ok(SessionStep::Shutdown)
            }
            SessionEvent::ShutdownRequested => {
                self.controller.stop();
                Ok(SessionStep::Shutdown)
            }
        }
    }

    /// Apply one control command.
    ///
    /// `Err` means nothing was applied (unknown feed, failed rebuild). A value
    /// that was applied but not written comes back in the report.
    pub fn apply(&mut self, command: ControlCommand) -> DuofeedResult<ControlReport> {
        let report = match command {
            ControlCommand::Crop { feed, edge, value } => {
                let update = self.engine.set_crop(&feed, edge, value)?;
                ControlReport::new(
                    ControlOutcome::Crop {
                        feed,
                        edge,
                        applied: update.applied,
                    },
                    update.write,
                )
            }
            ControlCommand::Alpha { feed, value } => {
                let update = self.engine.set_alpha(&feed, value)?;
                ControlReport::new(
                    ControlOutcome::Alpha {
                        feed,
                        applied: update.applied,
                    },
                    update.write,
                )
            }
            ControlCommand::ZOrder { feed, value } => {
                let update = self.engine.set_z_order(&feed, value)?;
                ControlReport::new(
                    ControlOutcome::ZOrder {
                        feed,
                        applied: update.applied,
                    },
                    update.write,
                )
            }
            ControlCommand::Zoom { feed, factor } => {
                let update = self.engine.set_zoom(&feed, factor)?;
                ControlReport::new(
                    ControlOutcome::Zoom {
                        feed,
                        applied: update.applied,
                    },
                    update.write,
                )
            }
            ControlCommand::Position { feed, x, y } => {
                let update = self.engine.set_position(&feed, x, y)?;
                ControlReport::new(
                    ControlOutcome::Position {
                        feed,
                        applied: update.applied,
                    },
                    update.write,
                )
            }
            ControlCommand::Policy(policy) => {
                let write = self.engine.set_policy(policy);
                ControlReport::new(
                    ControlOutcome::Layout {
                        policy,
                        canvas: self.engine.canvas(),
                    },
                    write,
                )
            }
            ControlCommand::ResetLayout => {
                let write = self.engine.reset_layout();
                ControlReport::new(
                    ControlOutcome::Layout {
                        policy: self.engine.policy(),
                        canvas: self.engine.canvas(),
                    },
                    write,
                )
            }
            ControlCommand::Rebuild => self.rebuild()?,
        };
        Ok(report)
    }

    /// Stop the graph, realize the session's description again, push the
    /// live feed state into it and start it.
    ///
    /// A window-handle sink replays the handshake with the surface the
    /// controller already holds.
    pub fn rebuild(&mut self) -> DuofeedResult<ControlReport> {
        tracing::info!(state = ?self.controller.state(), "Rebuilding pipeline");
        self.controller.stop();
        self.controller.build(&self.description)?;

        let write = self.engine.restore();
        if let Err(e) = &write {
            tracing::warn!(error = %e, "Feed state not fully restored");
        }

        let state = if self.standalone {
            self.controller.start_standalone()?
        } else {
            self.controller.start()?
        };
        Ok(ControlReport::new(ControlOutcome::Rebuilt { state }, write))
    }

    /// Serve events until shutdown, end of stream, or a fatal pipeline error.
    ///
    /// Pipeline notifications are drained before operator input. A closed
    /// `ui` channel counts as a shutdown request. `on_applied` sees every
    /// control report so the caller can mirror applied values.
    pub async fn run(
        &mut self,
        mut ui: mpsc::UnboundedReceiver<SessionEvent>,
        mut on_applied: impl FnMut(&ControlReport),
    ) -> DuofeedResult<()> {
        loop {
            let event = tokio::select! {
                biased;
                Some(event) = self.pipeline_events.recv() => SessionEvent::Pipeline(event),
                event = ui.recv() => event.unwrap_or(SessionEvent::ShutdownRequested),
            };

            match self.handle(event) {
                Ok(SessionStep::Continue) => {}
                Ok(SessionStep::Applied(report)) => {
                    if let Some(e) = &report.write_error {
                        tracing::warn!(outcome = ?report.outcome, error = %e, "Control applied but not written");
                    }
                    on_applied(&report);
                }
                Ok(SessionStep::Shutdown) => break,
                Err(e) if e.is_fatal() => {
                    self.controller.stop();
                    return Err(e);
                }
                Err(e) => tracing::warn!(error = %e, "Session event rejected"),
            }
        }

        tracing::info!("Session stopped");
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.controller.stop();
    }
}

//! Pipeline lifecycle state machine.
//!
//! ```text
//!   Stopped ──build──▶ Prepared ──start──▶ Playing        (native widget)
//!                         │
//!                         └──start──▶ Paused ──request + surface──▶ Playing
//!
//!   any state ──stop / fail──▶ Stopped
//! ```

use duofeed_common::error::{DuofeedError, DuofeedResult};
use serde::{Deserialize, Serialize};

use crate::backend::EmbeddingProtocol;
use crate::description::GraphDescription;
use crate::handle::{GraphState, HandleSlot, PipelineEventSender, PipelineRuntime, SurfaceHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Prepared,
    Paused,
    Playing,
}

/// Owns the realized pipeline and drives it through its states.
///
/// The handle is parked in a [`HandleSlot`]; hand [`slot`](Self::slot) to the
/// layout engine so it can write through the same lock.
pub struct PipelineLifecycleController {
    runtime: Box<dyn PipelineRuntime>,
    events: PipelineEventSender,
    slot: HandleSlot,
    state: LifecycleState,
    embedding: Option<EmbeddingProtocol>,
    handle_requested: bool,
    surface: Option<SurfaceHandle>,
}

impl PipelineLifecycleController {
    pub fn new(runtime: Box<dyn PipelineRuntime>, events: PipelineEventSender) -> Self {
        Self {
            runtime,
            events,
            slot: HandleSlot::new(),
            state: LifecycleState::Stopped,
            embedding: None,
            handle_requested: false,
            surface: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn slot(&self) -> HandleSlot {
        self.slot.clone()
    }

    pub fn embedding(&self) -> Option<EmbeddingProtocol> {
        self.embedding
    }

    /// Realize `description`. `Stopped -> Prepared`.
    pub fn build(&mut self, description: &GraphDescription) -> DuofeedResult<()> {
        self.expect_state(LifecycleState::Stopped, "build")?;

        let handle = self
            .runtime
            .realize(description, self.events.clone())
            .map_err(|e| match e {
                DuofeedError::GraphConstruction { .. } => e,
                other => DuofeedError::graph(other.to_string()),
            })?;
        self.slot.install(handle);

        self.embedding = Some(description.backend.embedding);
        self.handle_requested = false;
        self.transition(LifecycleState::Prepared);
        Ok(())
    }

    /// Start rendering.
    ///
    /// Native widget sinks go straight to `Playing`. Window-handle sinks pause
    /// until both the handle request and the surface have arrived.
    pub fn start(&mut self) -> DuofeedResult<LifecycleState> {
        self.expect_state(LifecycleState::Prepared, "start")?;

        match self.embedding {
            Some(EmbeddingProtocol::NativeWidget) => {
                self.slot.with(|h| h.set_state(GraphState::Playing))?;
                self.transition(LifecycleState::Playing);
            }
            Some(EmbeddingProtocol::HandleEmbedding) => {
                self.slot.with(|h| h.set_state(GraphState::Paused))?;
                self.transition(LifecycleState::Paused);
                self.try_complete_handshake()?;
            }
            None => return Err(DuofeedError::lifecycle("no embedding protocol negotiated")),
        }
        Ok(self.state)
    }

    /// Start without a host surface; a window sink opens its own window.
    pub fn start_standalone(&mut self) -> DuofeedResult<LifecycleState> {
        self.expect_state(LifecycleState::Prepared, "start")?;
        self.slot.with(|h| h.set_state(GraphState::Playing))?;
        self.transition(LifecycleState::Playing);
        Ok(self.state)
    }

    /// The render stage asked for a window handle.
    pub fn handle_requested(&mut self) -> DuofeedResult<LifecycleState> {
        match self.state {
            LifecycleState::Prepared | LifecycleState::Paused => {
                self.handle_requested = true;
                self.try_complete_handshake()?;
            }
            state => {
                tracing::debug!(?state, "Ignoring window handle request");
            }
        }
        Ok(self.state)
    }

    /// The windowing layer has a drawable surface.
    ///
    /// The surface outlives pipeline rebuilds, so it is remembered even while
    /// stopped.
    pub fn surface_prepared(&mut self, surface: SurfaceHandle) -> DuofeedResult<LifecycleState> {
        self.surface = Some(surface);
        tracing::debug!(handle = surface.0, state = ?self.state, "Surface prepared");
        self.try_complete_handshake()?;
        Ok(self.state)
    }

    /// Release the pipeline. Idempotent.
    pub fn stop(&mut self) {
        // Taking the handle waits for any write holding the lock; releasing
        // outside the lock keeps later writers from blocking on teardown.
        if let Some(mut handle) = self.slot.take() {
            handle.release();
        }
        self.handle_requested = false;
        if self.state != LifecycleState::Stopped {
            self.transition(LifecycleState::Stopped);
        }
    }

    /// Absorb an unrecoverable error into `Stopped`.
    pub fn fail(&mut self, reason: &DuofeedError) {
        tracing::error!(error = %reason, state = ?self.state, "Pipeline failed, stopping");
        self.stop();
    }

    fn try_complete_handshake(&mut self) -> DuofeedResult<()> {
        if self.state != LifecycleState::Paused || !self.handle_requested {
            return Ok(());
        }
        let Some(surface) = self.surface else {
            return Ok(());
        };
        self.slot.with(|h| {
            h.embed_surface(surface)?;
            h.set_state(GraphState::Playing)
        })?;
        self.transition(LifecycleState::Playing);
        Ok(())
    }

    fn expect_state(&self, expected: LifecycleState, operation: &str) -> DuofeedResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DuofeedError::lifecycle(format!(
                "cannot {operation} while {:?}",
                self.state
            )))
        }
    }

    fn transition(&mut self, to: LifecycleState) {
        tracing::info!(from = ?self.state, to = ?to, "Pipeline lifecycle");
        self.state = to;
    }
}

impl Drop for PipelineLifecycleController {
    fn drop(&mut self) {
        self.stop();
    }
}

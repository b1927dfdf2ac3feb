//! DuoFeed Compositor
//!
//! The live side of a session: the layout engine that owns per-feed
//! placement, crop, opacity and stacking, and the session loop that feeds it
//! operator input and pipeline notifications.
//!
//! # Event Flow
//!
//! ```text
//! operator / window ──┐
//!                     ├──▶ Session::run ──▶ CompositingLayoutEngine ──▶ HandleSlot
//! pipeline bus ───────┘          │                                        │
//!                                └──▶ PipelineLifecycleController ────────┘
//! ```

pub mod engine;
pub mod session;

pub use engine::{CompositingLayoutEngine, Update, ZoomRange};
pub use session::{
    ControlCommand, ControlOutcome, ControlReport, Session, SessionEvent, SessionOptions,
    SessionStep,
};

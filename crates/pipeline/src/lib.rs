//! DuoFeed Pipeline
//!
//! Everything between the configured capture devices and a running media
//! graph: device validation, rendering backend negotiation, the textual graph
//! description, and the lifecycle of the realized pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐   ┌────────────────┐
//! │ DeviceValidator│   │   negotiate()  │
//! └───────┬────────┘   └───────┬────────┘
//!         │ CaptureSource[]    │ SelectedBackend
//!         ▼                    ▼
//! ┌─────────────────────────────────────┐
//! │     PipelineDescriptionBuilder      │
//! └─────────────────┬───────────────────┘
//!                   │ GraphDescription
//!                   ▼
//! ┌─────────────────────────────────────┐      ┌──────────────────┐
//! │   PipelineLifecycleController       │─────▶│ PipelineRuntime  │
//! │   (owns HandleSlot)                 │      │ (GStreamer / mem)│
//! └─────────────────────────────────────┘      └──────────────────┘
//! ```

pub mod backend;
pub mod description;
pub mod device;
pub mod gst;
pub mod handle;
pub mod lifecycle;
pub mod memory;

pub use backend::{
    negotiate, BackendCapability, BackendKind, BackendProbe, EmbeddingProtocol, SelectedBackend,
};
pub use description::{FeedBranch, GraphDescription, PipelineDescriptionBuilder, Stage};
pub use device::DeviceValidator;
pub use gst::{element_available, GstProbe, GstRuntime};
pub use handle::{
    GraphState, HandleRequestOrigin, HandleSlot, PipelineEvent, PipelineEventReceiver, PipelineEventSender,
    PipelineHandle, PipelineRuntime, PropertyWrite, SurfaceHandle,
};
pub use lifecycle::{LifecycleState, PipelineLifecycleController};
pub use memory::{MemoryLog, MemoryRuntime};

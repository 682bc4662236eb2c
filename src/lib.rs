//! Keeps a remote conversational agent in sync with a live page.
//!
//! The scheduler surveys the page, assembles a context (fields,
//! destinations, custom actions) and sends it whenever it changes. The
//! dispatcher runs the agent's navigation, input and custom commands back
//! against the same page.

pub mod cli;
pub mod context;
pub mod dispatch;
pub mod dom;
pub mod error;
pub mod screen;
pub mod sync;
pub mod trace;

pub use context::assembler::{ContextOverride, assemble};
pub use context::commands::CustomCommand;
pub use context::context_model::{
    Assembled, BidirectionalContext, ContextEnvelope, PageState, SharedPageState,
};
pub use dispatch::dispatcher::{DispatchConfig, Detach, attach};
pub use dom::document::{Document, ElementHandle, ElementSpec};
pub use error::SyncError;
pub use sync::scheduler::{SchedulerConfig, SyncSession, start};
pub use sync::transport::{AgentTransport, COMMAND_EVENT, RecordingTransport, TransportError};

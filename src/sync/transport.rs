use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::context::context_model::ContextEnvelope;
use crate::trace::{logger::TraceLogger, trace::TraceEvent};

/// Event name inbound agent commands are delivered under.
pub const COMMAND_EVENT: &str = "agent:command";

pub type ListenerId = u64;
pub type CommandListener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("send rejected: {0}")]
    Rejected(String),
}

/// Session layer between the page and the agent.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn send_context(&self, envelope: ContextEnvelope) -> Result<(), TransportError>;

    fn subscribe(&self, event: &str, listener: CommandListener) -> ListenerId;

    fn unsubscribe(&self, event: &str, id: ListenerId);
}

// ============================================================================
// In-process transport
// ============================================================================

#[derive(Debug, Clone)]
pub struct SentContext {
    pub at: Instant,
    pub envelope: ContextEnvelope,
    pub delivered: bool,
}

/// In-process transport that records every send and lets the caller play
/// the agent by emitting events.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentContext>>,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, CommandListener)>>>,
    next_id: AtomicU64,
    steps: AtomicU64,
    reject_sends: AtomicBool,
    tracer: Option<TraceLogger>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        RecordingTransport::default()
    }

    pub fn with_tracer(tracer: TraceLogger) -> Self {
        RecordingTransport {
            tracer: Some(tracer),
            ..Default::default()
        }
    }

    /// Make subsequent sends fail with `TransportError::Rejected`.
    pub fn reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Every send attempt, oldest first.
    pub fn sent(&self) -> Vec<SentContext> {
        self.sent.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn last_envelope(&self) -> Option<ContextEnvelope> {
        self.sent.lock().last().map(|s| s.envelope.clone())
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }

    /// Deliver an event to every listener of `event`. Returns how many ran.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        self.trace(TraceEvent::now(self.next_step(), "command_received").with_detail(payload));

        let listeners: Vec<CommandListener> = self
            .listeners
            .lock()
            .get(event)
            .map(|ls| ls.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        for listener in &listeners {
            listener(payload);
        }
        listeners.len()
    }

    fn next_step(&self) -> u64 {
        self.steps.fetch_add(1, Ordering::SeqCst)
    }

    fn trace(&self, event: TraceEvent) {
        if let Some(tracer) = &self.tracer {
            tracer.log(&event);
        }
    }
}

#[async_trait]
impl AgentTransport for RecordingTransport {
    async fn send_context(&self, envelope: ContextEnvelope) -> Result<(), TransportError> {
        let delivered = !self.reject_sends.load(Ordering::SeqCst);
        let kind = if delivered {
            "context_sent"
        } else {
            "context_send_failed"
        };
        self.trace(TraceEvent::now(self.next_step(), kind).with_context(&envelope.context));

        self.sent.lock().push(SentContext {
            at: Instant::now(),
            envelope,
            delivered,
        });

        if delivered {
            Ok(())
        } else {
            Err(TransportError::Rejected("transport refused the context".into()))
        }
    }

    fn subscribe(&self, event: &str, listener: CommandListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    fn unsubscribe(&self, event: &str, id: ListenerId) {
        if let Some(listeners) = self.listeners.lock().get_mut(event) {
            listeners.retain(|(existing, _)| *existing != id);
        }
    }
}

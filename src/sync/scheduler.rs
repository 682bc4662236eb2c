use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, trace, warn};

use crate::context::assembler::{ContextOverride, assemble};
use crate::context::commands::CustomCommand;
use crate::context::context_model::{BidirectionalContext, ContextEnvelope, PageState};
use crate::dom::document::{Document, MutationObserver};
use crate::sync::transport::AgentTransport;

pub type StateChangeCallback = Arc<dyn Fn(Arc<PageState>) + Send + Sync>;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(50);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Quiet time after the last trigger before a pass runs
    pub quiet_period: Duration,
    /// Upper bound between the first trigger of a burst and its pass
    pub max_wait: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

enum Trigger {
    Refresh,
    Commands(Vec<CustomCommand>),
}

/// Handle to a running sync session. Dropping it tears the session down.
pub struct SyncSession {
    triggers: mpsc::UnboundedSender<Trigger>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncSession {
    /// Replace the active custom commands and schedule a pass.
    pub fn on_custom_commands_change(&self, commands: Vec<CustomCommand>) {
        if self.triggers.send(Trigger::Commands(commands)).is_err() {
            debug!("sync session is torn down; ignoring command update");
        }
    }

    /// Schedule a pass without any document change.
    pub fn refresh(&self) {
        let _ = self.triggers.send(Trigger::Refresh);
    }

    /// Stop observing and cancel any pending pass. Contexts already queued
    /// for delivery are still sent.
    pub fn teardown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Start syncing `document` to the agent behind `transport`.
///
/// Must be called inside a tokio runtime. An initial pass is scheduled
/// right away.
pub fn start(
    document: Document,
    transport: Arc<dyn AgentTransport>,
    commands: Vec<CustomCommand>,
    override_fn: Option<ContextOverride>,
    on_state_change: StateChangeCallback,
    config: SchedulerConfig,
) -> SyncSession {
    let observer = document.observe();
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();

    let _ = trigger_tx.send(Trigger::Refresh);

    tokio::spawn(deliver(transport, outbox_rx));
    let coalescer = Coalescer {
        document,
        outbox: outbox_tx,
        commands,
        override_fn,
        on_state_change,
        config,
        last_sent: None,
    };
    let task = tokio::spawn(coalescer.run(observer, trigger_rx, shutdown_rx));

    SyncSession {
        triggers: trigger_tx,
        shutdown: shutdown_tx,
        task,
    }
}

// ============================================================================
// Coalescing loop
// ============================================================================

/// Sends envelopes one at a time in the order passes produced them. Ends once
/// the coalescer is gone and the queue is drained.
async fn deliver(
    transport: Arc<dyn AgentTransport>,
    mut outbox: mpsc::UnboundedReceiver<ContextEnvelope>,
) {
    while let Some(envelope) = outbox.recv().await {
        if let Err(e) = transport.send_context(envelope).await {
            warn!(error = %e, "page context send failed");
        }
    }
}

struct Coalescer {
    document: Document,
    /// Queue to the delivery task; passes never wait on the transport
    outbox: mpsc::UnboundedSender<ContextEnvelope>,
    commands: Vec<CustomCommand>,
    override_fn: Option<ContextOverride>,
    on_state_change: StateChangeCallback,
    config: SchedulerConfig,
    last_sent: Option<BidirectionalContext>,
}

struct Burst {
    pending_since: Instant,
    quiet_deadline: Instant,
}

impl Burst {
    fn wake_at(&self, config: &SchedulerConfig) -> Instant {
        self.quiet_deadline
            .min(self.pending_since + config.max_wait)
    }
}

impl Coalescer {
    async fn run(
        mut self,
        mut observer: MutationObserver,
        mut triggers: mpsc::UnboundedReceiver<Trigger>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut burst: Option<Burst> = None;
        let mut observing = true;

        loop {
            let wake = burst
                .as_ref()
                .map(|b| b.wake_at(&self.config))
                .unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                _ = shutdown.changed() => break,

                record = observer.next(), if observing => match record {
                    Some(record) => {
                        trace!(?record, "document mutated");
                        self.mark_dirty(&mut burst);
                    }
                    None => observing = false,
                },

                trigger = triggers.recv() => match trigger {
                    Some(Trigger::Commands(commands)) => {
                        self.commands = commands;
                        self.mark_dirty(&mut burst);
                    }
                    Some(Trigger::Refresh) => self.mark_dirty(&mut burst),
                    None => break,
                },

                _ = sleep_until(wake), if burst.is_some() => {
                    burst = None;
                    self.execute();
                }
            }
        }

        observer.disconnect();
        debug!("sync session stopped");
    }

    fn mark_dirty(&self, burst: &mut Option<Burst>) {
        let now = Instant::now();
        let quiet_deadline = now + self.config.quiet_period;
        match burst {
            Some(b) => b.quiet_deadline = quiet_deadline,
            None => {
                *burst = Some(Burst {
                    pending_since: now,
                    quiet_deadline,
                })
            }
        }
    }

    /// Assemble and send when the context differs from the last one sent.
    fn execute(&mut self) {
        let assembled = catch_unwind(AssertUnwindSafe(|| {
            assemble(&self.document, &self.commands, self.override_fn.as_ref())
        }));
        let assembled = match assembled {
            Ok(assembled) => assembled,
            Err(_) => {
                error!("context assembly panicked; waiting for the next change");
                return;
            }
        };

        if self.last_sent.as_ref() == Some(&assembled.context) {
            debug!("page context unchanged; not sending");
            return;
        }

        let context = assembled.context;
        info!(
            uri = %context.uri,
            fields = context.fields.len(),
            fingerprint = %context.fingerprint(),
            "sending page context"
        );

        if self
            .outbox
            .send(ContextEnvelope::new(context.clone()))
            .is_err()
        {
            warn!("context delivery task is gone; page context not sent");
        }

        let on_state_change = Arc::clone(&self.on_state_change);
        let state = Arc::new(assembled.state);
        if catch_unwind(AssertUnwindSafe(|| on_state_change(state))).is_err() {
            error!("state change callback panicked");
        }

        self.last_sent = Some(context);
    }
}

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::context::context_model::SharedPageState;
use crate::dispatch::command_model::{AgentCommand, FieldUpdate, NavigationAction};
use crate::dom::document::{Document, ElementHandle, WeakElement};
use crate::error::SyncError;
use crate::screen::inspector::control_kind;
use crate::screen::screen_model::ControlKind;
use crate::sync::transport::{AgentTransport, COMMAND_EVENT, CommandListener, ListenerId};

/// Attribute set on fields the agent just wrote.
pub const UPDATED_ATTRIBUTE: &str = "data-agent-updated";
pub const DEFAULT_HIGHLIGHT: Duration = Duration::from_secs(2);

/// Highlight tokens are unique across dispatchers sharing a document.
static HIGHLIGHT_SEQ: AtomicU64 = AtomicU64::new(0);

pub type NavigationHandler =
    Arc<dyn Fn(NavigationAction, Option<&str>, &BTreeMap<String, String>) + Send + Sync>;
pub type InputHandler = Arc<dyn Fn(&[FieldUpdate], &HashMap<String, WeakElement>) + Send + Sync>;
/// Deprecated: register custom commands with the scheduler instead.
pub type LegacyCustomHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Clone)]
pub struct DispatchConfig {
    /// When false, nothing happens without an explicit override
    pub automatic_context: bool,
    pub navigation: Option<NavigationHandler>,
    pub input: Option<InputHandler>,
    pub custom: Option<LegacyCustomHandler>,
    pub highlight_duration: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            automatic_context: true,
            navigation: None,
            input: None,
            custom: None,
            highlight_duration: DEFAULT_HIGHLIGHT,
        }
    }
}

/// How one classification is handled, resolved once per event.
enum Strategy<H> {
    Override(H),
    Automatic,
    Disabled,
}

impl<H: Clone> Strategy<H> {
    fn resolve(handler: &Option<H>, automatic: bool) -> Self {
        match handler {
            Some(h) => Strategy::Override(h.clone()),
            None if automatic => Strategy::Automatic,
            None => Strategy::Disabled,
        }
    }
}

pub struct Dispatcher {
    document: Document,
    config: DispatchConfig,
    state: SharedPageState,
}

impl Dispatcher {
    pub fn new(document: Document, config: DispatchConfig, state: SharedPageState) -> Self {
        Dispatcher {
            document,
            config,
            state,
        }
    }

    /// Decode and run one raw agent event. Malformed events are logged.
    pub fn handle_event(&self, event: &Value) {
        match serde_json::from_value::<AgentCommand>(event.clone()).map_err(SyncError::from) {
            Ok(command) => self.handle(command),
            Err(e) => warn!(%event, error = %e, "ignoring agent event"),
        }
    }

    pub fn handle(&self, command: AgentCommand) {
        debug!(classification = ?command.classification(), "agent command received");
        match command {
            AgentCommand::Navigation {
                action,
                destination,
            } => self.navigation(action, destination.as_deref()),
            AgentCommand::Input { fields } => self.input(&fields),
            AgentCommand::Custom { action, payload } => self.custom(&action, payload),
        }
    }

    // ------------------------------------------------------------------------
    // navigation
    // ------------------------------------------------------------------------

    fn navigation(&self, action: NavigationAction, destination: Option<&str>) {
        let state = self.state.load();
        match Strategy::resolve(&self.config.navigation, self.config.automatic_context) {
            Strategy::Override(handler) => guarded("navigation", || {
                handler(action, destination, &state.links)
            }),
            Strategy::Automatic => self.default_navigation(action, destination, &state.links),
            Strategy::Disabled => debug!(?action, "automatic navigation disabled"),
        }
    }

    fn default_navigation(
        &self,
        action: NavigationAction,
        destination: Option<&str>,
        links: &BTreeMap<String, String>,
    ) {
        match action {
            NavigationAction::PageNext => {
                if !self.document.history_forward() {
                    debug!("no forward history entry");
                }
            }
            NavigationAction::PagePrevious => {
                if !self.document.history_back() {
                    debug!("no previous history entry");
                }
            }
            NavigationAction::PageCustom => {
                let Some(destination) = destination else {
                    warn!("custom navigation without a destination");
                    return;
                };
                if let Some(url) = links.get(destination) {
                    info!(destination, url = %url, "navigating to page link");
                    self.document.navigate(url);
                } else if Url::parse(destination).is_ok() {
                    info!(destination, "navigating to literal URL");
                    self.document.navigate(destination);
                } else {
                    warn!(destination, "navigation destination is neither a page link nor a URL");
                }
            }
            NavigationAction::PageUnknown => {
                info!(?destination, "agent requested an unknown navigation; ignoring")
            }
        }
    }

    // ------------------------------------------------------------------------
    // input
    // ------------------------------------------------------------------------

    fn input(&self, fields: &[FieldUpdate]) {
        let state = self.state.load();
        match Strategy::resolve(&self.config.input, self.config.automatic_context) {
            Strategy::Override(handler) => guarded("input", || handler(fields, &state.form_elements)),
            Strategy::Automatic => {
                for update in fields {
                    self.fill(update, &state.form_elements);
                }
            }
            Strategy::Disabled => debug!(count = fields.len(), "automatic input disabled"),
        }
    }

    fn fill(&self, update: &FieldUpdate, form_elements: &HashMap<String, WeakElement>) {
        let element = form_elements
            .get(&update.id)
            .and_then(|weak| weak.upgrade())
            .filter(|element| element.is_connected());
        let Some(element) = element else {
            debug!(id = %update.id, "field is no longer on the page; skipping");
            return;
        };

        match control_kind(&element) {
            Ok(ControlKind::Checkbox) => element.set_checked(update.flag()),
            _ => element.set_value(&update.text()),
        }

        self.highlight(&element);
        element.dispatch_event("input");
        element.dispatch_event("change");
    }

    /// Mark a field as agent-written, clearing the mark after the highlight
    /// duration unless a newer write replaced it.
    fn highlight(&self, element: &ElementHandle) {
        let token = HIGHLIGHT_SEQ.fetch_add(1, Ordering::SeqCst).to_string();
        element.set_attribute(UPDATED_ATTRIBUTE, &token);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let weak = Arc::downgrade(element);
        let duration = self.config.highlight_duration;
        runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(element) = weak.upgrade() {
                if element.attribute(UPDATED_ATTRIBUTE).as_deref() == Some(token.as_str()) {
                    element.remove_attribute(UPDATED_ATTRIBUTE);
                }
            }
        });
    }

    // ------------------------------------------------------------------------
    // custom
    // ------------------------------------------------------------------------

    fn custom(&self, action: &str, payload: Value) {
        let handler = self.state.load().custom_commands.get(action).cloned();
        let legacy = self.config.custom.clone();

        if legacy.is_some() && self.config.automatic_context {
            warn!("the `custom` dispatch callback is deprecated; register custom commands instead");
        }

        match handler {
            Some(handler) => guarded(action, || handler(payload.clone())),
            None => debug!(action, "no custom command registered under this name"),
        }

        if let Some(legacy) = legacy {
            guarded("custom", || legacy(action, &payload));
        }
    }
}

/// Run a consumer callback. A panic is logged and the event is dropped.
fn guarded(callback: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback, "agent command handler panicked; continuing");
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Subscription handle returned by `attach`. Dropping it detaches.
#[must_use = "dropping the handle detaches the dispatcher"]
pub struct Detach {
    transport: Arc<dyn AgentTransport>,
    id: Option<ListenerId>,
}

impl Detach {
    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.transport.unsubscribe(COMMAND_EVENT, id);
        }
    }
}

impl Drop for Detach {
    fn drop(&mut self) {
        self.release();
    }
}

/// Route agent commands from `transport` to the page.
pub fn attach(
    document: Document,
    transport: Arc<dyn AgentTransport>,
    config: DispatchConfig,
    state: SharedPageState,
) -> Detach {
    let dispatcher = Arc::new(Dispatcher::new(document, config, state));
    let listener: CommandListener = Arc::new(move |event: &Value| dispatcher.handle_event(event));
    let id = transport.subscribe(COMMAND_EVENT, listener);
    Detach {
        transport,
        id: Some(id),
    }
}

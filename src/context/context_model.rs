use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dom::document::WeakElement;
use crate::screen::screen_model::InteractiveElementDescriptor;

pub type CommandHandler = Arc<dyn Fn(Value) + Send + Sync>;

// ============================================================================
// Transmitted context
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// What the agent is told about the page.
///
/// Destinations and actions are kept sorted, so equal content compares
/// equal whatever order it was gathered in. Fields keep document order;
/// their ids already encode position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidirectionalContext {
    pub uri: String,
    pub fields: Vec<InteractiveElementDescriptor>,
    pub destinations: Vec<String>,
    pub actions: Vec<ActionDescriptor>,
}

impl BidirectionalContext {
    pub fn new(
        uri: &str,
        fields: Vec<InteractiveElementDescriptor>,
        destinations: impl IntoIterator<Item = String>,
        actions: impl IntoIterator<Item = ActionDescriptor>,
    ) -> Self {
        let mut destinations: Vec<String> = destinations.into_iter().collect();
        destinations.sort();
        destinations.dedup();

        // last descriptor per action wins
        let actions: BTreeMap<String, ActionDescriptor> = actions
            .into_iter()
            .map(|a| (a.action.clone(), a))
            .collect();

        BidirectionalContext {
            uri: uri.to_string(),
            fields,
            destinations,
            actions: actions.into_values().collect(),
        }
    }

    /// SHA-1 of the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        use sha1::{Digest, Sha1};

        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha1::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Wire payload for `send_context`: `{"agent:context": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEnvelope {
    #[serde(rename = "agent:context")]
    pub context: BidirectionalContext,
}

impl ContextEnvelope {
    pub fn new(context: BidirectionalContext) -> Self {
        ContextEnvelope { context }
    }
}

// ============================================================================
// Retained page state
// ============================================================================

/// Local companion to a context: resolves agent commands back to the page.
#[derive(Default, Clone)]
pub struct PageState {
    pub form_elements: HashMap<String, WeakElement>,
    pub links: BTreeMap<String, String>,
    pub custom_commands: HashMap<String, CommandHandler>,
}

impl fmt::Debug for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<&String> = self.custom_commands.keys().collect();
        commands.sort();
        f.debug_struct("PageState")
            .field("form_elements", &self.form_elements.len())
            .field("links", &self.links)
            .field("custom_commands", &commands)
            .finish()
    }
}

/// One assembly pass: what is sent plus what is kept.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub context: BidirectionalContext,
    pub state: PageState,
}

/// The current page state as seen by the dispatcher.
///
/// Always replaced wholesale, so readers get either the old or the new
/// snapshot.
#[derive(Clone, Default)]
pub struct SharedPageState {
    current: Arc<RwLock<Arc<PageState>>>,
}

impl SharedPageState {
    pub fn new() -> Self {
        SharedPageState::default()
    }

    pub fn load(&self) -> Arc<PageState> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, state: Arc<PageState>) {
        *self.current.write() = state;
    }

    /// Callback suitable for the scheduler's `on_state_change`.
    pub fn updater(&self) -> Arc<dyn Fn(Arc<PageState>) + Send + Sync> {
        let shared = self.clone();
        Arc::new(move |state| shared.replace(state))
    }
}

impl fmt::Debug for SharedPageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedPageState").field(&self.load()).finish()
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

pub type ElementHandle = Arc<Element>;
pub type WeakElement = Weak<Element>;
pub type EventListener = Arc<dyn Fn(&DomEvent) + Send + Sync>;

// ============================================================================
// Declarative element model (fixtures, scenarios)
// ============================================================================

/// Declarative description of an element, used to build or extend a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub options: Vec<SelectOption>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        ElementSpec {
            tag: tag.to_lowercase(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn option(mut self, value: &str, text: &str, selected: bool) -> Self {
        self.options.push(SelectOption {
            value: value.to_string(),
            text: text.to_string(),
            selected,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
    #[serde(default)]
    pub selected: bool,
}

// ============================================================================
// Observation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    ChildList,
    Attributes { name: String },
    CharacterData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub kind: String,
}

/// Receives mutation records from one document until disconnected or dropped.
pub struct MutationObserver {
    records: mpsc::UnboundedReceiver<MutationRecord>,
}

impl MutationObserver {
    pub async fn next(&mut self) -> Option<MutationRecord> {
        self.records.recv().await
    }

    /// Drain records already delivered without waiting.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        let mut taken = Vec::new();
        while let Ok(record) = self.records.try_recv() {
            taken.push(record);
        }
        taken
    }

    pub fn disconnect(&mut self) {
        self.records.close();
    }
}

// ============================================================================
// Element
// ============================================================================

struct ElementData {
    attributes: BTreeMap<String, String>,
    text: String,
    value: String,
    checked: bool,
    options: Vec<SelectOption>,
    dispatched: Vec<String>,
}

pub struct Element {
    tag: String,
    data: RwLock<ElementData>,
    listeners: Mutex<Vec<(String, EventListener)>>,
    connected: AtomicBool,
    document: Weak<DocumentShared>,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read();
        f.debug_struct("Element")
            .field("tag", &self.tag)
            .field("attributes", &data.attributes)
            .field("value", &data.value)
            .field("checked", &data.checked)
            .finish()
    }
}

impl Element {
    fn from_spec(spec: ElementSpec, document: Weak<DocumentShared>) -> Self {
        Element {
            tag: spec.tag.to_lowercase(),
            data: RwLock::new(ElementData {
                attributes: spec.attributes,
                text: spec.text.unwrap_or_default(),
                value: spec.value.unwrap_or_default(),
                checked: spec.checked,
                options: spec.options,
                dispatched: Vec::new(),
            }),
            listeners: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            document,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.data.read().attributes.get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.data.read().attributes.contains_key(name)
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.data
            .write()
            .attributes
            .insert(name.to_string(), value.to_string());
        self.notify(MutationRecord::Attributes {
            name: name.to_string(),
        });
    }

    pub fn remove_attribute(&self, name: &str) {
        let removed = self.data.write().attributes.remove(name).is_some();
        if removed {
            self.notify(MutationRecord::Attributes {
                name: name.to_string(),
            });
        }
    }

    pub fn text(&self) -> String {
        self.data.read().text.clone()
    }

    pub fn set_text(&self, text: &str) {
        self.data.write().text = text.to_string();
        self.notify(MutationRecord::CharacterData);
    }

    /// Lowercase `type` attribute of an input, `text` when absent.
    pub fn input_type(&self) -> String {
        self.attribute("type")
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text".to_string())
    }

    /// Current value. Selects report the value of their selected option.
    pub fn value(&self) -> String {
        if self.tag == "select" {
            return self
                .options()
                .into_iter()
                .find(|o| o.selected)
                .map(|o| o.value)
                .unwrap_or_default();
        }
        self.data.read().value.clone()
    }

    /// Property write: no mutation record is emitted.
    pub fn set_value(&self, value: &str) {
        if self.tag == "select" {
            self.select_value(value);
            return;
        }
        self.data.write().value = value.to_string();
    }

    /// Selects the first option whose value matches. With no match nothing is
    /// marked, so a single select falls back to its first option.
    pub fn select_value(&self, value: &str) {
        let mut data = self.data.write();
        let mut matched = false;
        for option in data.options.iter_mut() {
            option.selected = !matched && option.value == value;
            matched |= option.selected;
        }
    }

    pub fn checked(&self) -> bool {
        self.data.read().checked
    }

    pub fn set_checked(&self, checked: bool) {
        self.data.write().checked = checked;
    }

    /// Options with the effective selection: a single select with nothing
    /// marked reports its first option as selected.
    pub fn options(&self) -> Vec<SelectOption> {
        let mut options = self.data.read().options.clone();
        let multiple = self.has_attribute("multiple");
        if !multiple && !options.iter().any(|o| o.selected) {
            if let Some(first) = options.first_mut() {
                first.selected = true;
            }
        }
        options
    }

    pub fn add_event_listener(&self, kind: &str, listener: EventListener) {
        self.listeners.lock().push((kind.to_string(), listener));
    }

    pub fn dispatch_event(&self, kind: &str) {
        self.data.write().dispatched.push(kind.to_string());
        let listeners: Vec<EventListener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, l)| Arc::clone(l))
            .collect();
        let event = DomEvent {
            kind: kind.to_string(),
        };
        for listener in listeners {
            listener(&event);
        }
    }

    /// Event kinds dispatched on this element, oldest first.
    pub fn dispatched_events(&self) -> Vec<String> {
        self.data.read().dispatched.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// `href` resolved against the owning document's current URI. Falls back
    /// to the raw attribute when it cannot be resolved.
    pub fn resolved_href(&self) -> Option<String> {
        let href = self.attribute("href")?;
        let base = self
            .document
            .upgrade()
            .and_then(|document| Url::parse(&document.current_uri()).ok());
        let resolved = match &base {
            Some(base) => base.join(&href),
            None => Url::parse(&href),
        };
        Some(resolved.map(|url| url.to_string()).unwrap_or(href))
    }

    fn notify(&self, record: MutationRecord) {
        if !self.is_connected() {
            return;
        }
        if let Some(document) = self.document.upgrade() {
            document.notify(record);
        }
    }
}

// ============================================================================
// Document
// ============================================================================

struct History {
    entries: Vec<String>,
    cursor: usize,
}

struct DocumentShared {
    history: RwLock<History>,
    nodes: RwLock<Vec<ElementHandle>>,
    observers: Mutex<Vec<mpsc::UnboundedSender<MutationRecord>>>,
}

impl DocumentShared {
    fn current_uri(&self) -> String {
        let history = self.history.read();
        history.entries[history.cursor].clone()
    }

    fn notify(&self, record: MutationRecord) {
        self.observers
            .lock()
            .retain(|tx| tx.send(record.clone()).is_ok());
    }
}

/// Live, shareable page model. Clones are handles to the same document.
#[derive(Clone)]
pub struct Document {
    shared: Arc<DocumentShared>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("uri", &self.uri())
            .field("elements", &self.shared.nodes.read().len())
            .finish()
    }
}

impl Document {
    pub fn new(uri: &str) -> Self {
        Document {
            shared: Arc::new(DocumentShared {
                history: RwLock::new(History {
                    entries: vec![uri.to_string()],
                    cursor: 0,
                }),
                nodes: RwLock::new(Vec::new()),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn from_specs(uri: &str, specs: impl IntoIterator<Item = ElementSpec>) -> Self {
        let document = Document::new(uri);
        for spec in specs {
            document.append(spec);
        }
        document
    }

    pub fn append(&self, spec: ElementSpec) -> ElementHandle {
        let element = Arc::new(Element::from_spec(spec, Arc::downgrade(&self.shared)));
        self.shared.nodes.write().push(Arc::clone(&element));
        self.shared.notify(MutationRecord::ChildList);
        element
    }

    /// Detach an element. Returns false when it was not part of this document.
    pub fn remove(&self, element: &ElementHandle) -> bool {
        let removed = {
            let mut nodes = self.shared.nodes.write();
            let before = nodes.len();
            nodes.retain(|node| !Arc::ptr_eq(node, element));
            nodes.len() != before
        };
        if removed {
            element.connected.store(false, Ordering::Release);
            self.shared.notify(MutationRecord::ChildList);
        }
        removed
    }

    /// Snapshot of all elements in document order.
    pub fn elements(&self) -> Vec<ElementHandle> {
        self.shared.nodes.read().clone()
    }

    /// Elements whose tag is one of `tags`, in document order.
    pub fn query(&self, tags: &[&str]) -> Vec<ElementHandle> {
        self.shared
            .nodes
            .read()
            .iter()
            .filter(|node| tags.contains(&node.tag()))
            .cloned()
            .collect()
    }

    /// Lookup by the `id` attribute.
    pub fn element_by_id(&self, id: &str) -> Option<ElementHandle> {
        self.shared
            .nodes
            .read()
            .iter()
            .find(|node| node.attribute("id").as_deref() == Some(id))
            .cloned()
    }

    pub fn uri(&self) -> String {
        self.shared.current_uri()
    }

    pub fn navigate(&self, url: &str) {
        let mut history = self.shared.history.write();
        let keep = history.cursor + 1;
        history.entries.truncate(keep);
        history.entries.push(url.to_string());
        history.cursor = keep;
    }

    /// Returns false when there is no earlier entry.
    pub fn history_back(&self) -> bool {
        let mut history = self.shared.history.write();
        if history.cursor == 0 {
            return false;
        }
        history.cursor -= 1;
        true
    }

    /// Returns false when there is no later entry.
    pub fn history_forward(&self) -> bool {
        let mut history = self.shared.history.write();
        if history.cursor + 1 >= history.entries.len() {
            return false;
        }
        history.cursor += 1;
        true
    }

    pub fn observe(&self) -> MutationObserver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.observers.lock().push(tx);
        MutationObserver { records: rx }
    }
}

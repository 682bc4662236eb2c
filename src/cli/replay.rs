use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::config::SyncConfig;
use crate::context::commands::CustomCommand;
use crate::context::context_model::{ContextEnvelope, SharedPageState};
use crate::dispatch::dispatcher::attach;
use crate::dom::document::{Document, ElementSpec};
use crate::error::SyncError;
use crate::sync::scheduler::start;
use crate::sync::transport::{AgentTransport, COMMAND_EVENT, RecordingTransport};
use crate::trace::logger::TraceLogger;

// ============================================================================
// Scenario model (YAML)
// ============================================================================

/// A page, the custom commands it offers, and a script of host and agent
/// activity to play against it.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub uri: String,
    #[serde(default)]
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub commands: Vec<ScenarioCommand>,
    /// Steps are single-key maps (`- wait: { ms: 100 }`) rather than YAML tags
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioCommand {
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schema: Option<Value>,
}

/// Elements are addressed by their `id` attribute.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStep {
    Wait { ms: u64 },
    Append { element: ElementSpec },
    Remove { id: String },
    SetAttribute { id: String, name: String, value: String },
    SetText { id: String, text: String },
    /// User typing: a property write, invisible to mutation observers
    Type { id: String, value: String },
    Agent { event: Value },
}

#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub sent: Vec<ContextEnvelope>,
    pub invoked: Vec<(String, Value)>,
    pub final_uri: String,
}

pub fn load_scenario(path: &str) -> Result<Scenario, SyncError> {
    let content = std::fs::read_to_string(path).map_err(|e| SyncError::Io {
        path: path.to_string(),
        source: e,
    })?;
    parse_scenario(&content, path)
}

pub fn parse_scenario(content: &str, context: &str) -> Result<Scenario, SyncError> {
    serde_yaml::from_str(content).map_err(|e| SyncError::Yaml {
        context: context.to_string(),
        source: e,
    })
}

impl Scenario {
    pub fn document(&self) -> Document {
        Document::from_specs(&self.uri, self.elements.iter().cloned())
    }

    /// Custom commands whose handlers append to `invoked`.
    pub fn custom_commands(&self, invoked: &Arc<Mutex<Vec<(String, Value)>>>) -> Vec<CustomCommand> {
        self.commands
            .iter()
            .map(|spec| {
                let log = Arc::clone(invoked);
                let action = spec.action.clone();
                let mut command = CustomCommand::new(&spec.action, move |payload| {
                    info!(action = %action, %payload, "custom command invoked");
                    log.lock().push((action.clone(), payload));
                });
                command.description = spec.description.clone();
                command.schema = spec.schema.clone();
                command
            })
            .collect()
    }
}

// ============================================================================
// Replay
// ============================================================================

/// Play a scenario through a real sync session and dispatcher.
pub async fn replay(
    scenario: &Scenario,
    config: &SyncConfig,
    tracer: Option<TraceLogger>,
) -> ReplayOutcome {
    let document = scenario.document();
    let transport = Arc::new(match tracer {
        Some(tracer) => RecordingTransport::with_tracer(tracer),
        None => RecordingTransport::new(),
    });
    let agent_side: Arc<dyn AgentTransport> = transport.clone();
    let invoked = Arc::new(Mutex::new(Vec::new()));
    let shared = SharedPageState::new();

    let session = start(
        document.clone(),
        Arc::clone(&agent_side),
        scenario.custom_commands(&invoked),
        None,
        shared.updater(),
        config.scheduler_config(),
    );
    let detach = attach(
        document.clone(),
        agent_side,
        config.dispatch_config(),
        shared,
    );

    for step in &scenario.steps {
        play_step(&document, &transport, step).await;
    }

    // let the last burst settle before stopping
    let scheduler = config.scheduler_config();
    tokio::time::sleep(scheduler.max_wait + scheduler.quiet_period).await;
    session.teardown();
    detach.detach();
    tokio::time::sleep(Duration::from_millis(1)).await;

    let invoked = invoked.lock().clone();
    ReplayOutcome {
        sent: transport.sent().into_iter().map(|s| s.envelope).collect(),
        invoked,
        final_uri: document.uri(),
    }
}

async fn play_step(document: &Document, transport: &RecordingTransport, step: &ScenarioStep) {
    match step {
        ScenarioStep::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        ScenarioStep::Append { element } => {
            document.append(element.clone());
        }
        ScenarioStep::Remove { id } => match document.element_by_id(id) {
            Some(element) => {
                document.remove(&element);
            }
            None => warn!(id = %id, "remove: no element with this id"),
        },
        ScenarioStep::SetAttribute { id, name, value } => match document.element_by_id(id) {
            Some(element) => element.set_attribute(name, value),
            None => warn!(id = %id, "set_attribute: no element with this id"),
        },
        ScenarioStep::SetText { id, text } => match document.element_by_id(id) {
            Some(element) => element.set_text(text),
            None => warn!(id = %id, "set_text: no element with this id"),
        },
        ScenarioStep::Type { id, value } => match document.element_by_id(id) {
            Some(element) => element.set_value(value),
            None => warn!(id = %id, "type: no element with this id"),
        },
        ScenarioStep::Agent { event } => {
            if transport.emit(COMMAND_EVENT, event) == 0 {
                warn!("agent event had no listener");
            }
        }
    }
}

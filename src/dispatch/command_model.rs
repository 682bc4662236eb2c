use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command event sent by the agent, tagged by `classification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "classification", rename_all = "lowercase")]
pub enum AgentCommand {
    Navigation {
        action: NavigationAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
    },
    Input {
        fields: Vec<FieldUpdate>,
    },
    Custom {
        action: String,
        #[serde(default)]
        payload: Value,
    },
}

impl AgentCommand {
    pub fn classification(&self) -> Classification {
        match self {
            AgentCommand::Navigation { .. } => Classification::Navigation,
            AgentCommand::Input { .. } => Classification::Input,
            AgentCommand::Custom { .. } => Classification::Custom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Navigation,
    Input,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationAction {
    PageNext,
    PagePrevious,
    PageCustom,
    #[serde(other)]
    PageUnknown,
}

/// One field write requested by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub id: String,
    pub value: Value,
}

impl FieldUpdate {
    pub fn new(id: &str, value: impl Into<Value>) -> Self {
        FieldUpdate {
            id: id.to_string(),
            value: value.into(),
        }
    }

    /// Value as text: strings verbatim, other scalars in JSON form.
    pub fn text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Value as a checked flag. Strings count when they say `true` or
    /// `checked`, numbers when non-zero.
    pub fn flag(&self) -> bool {
        match &self.value {
            Value::Bool(b) => *b,
            Value::String(s) => {
                let s = s.trim();
                s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("checked")
            }
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        }
    }
}

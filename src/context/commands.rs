use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use serde_json::Value;
use tracing::warn;

use crate::context::context_model::{ActionDescriptor, CommandHandler};
use crate::error::SyncError;

/// A consumer-registered action the agent may invoke by name.
#[derive(Clone)]
pub struct CustomCommand {
    pub action: String,
    pub description: Option<String>,
    /// JSON Schema the payload must satisfy before `handler` runs
    pub schema: Option<Value>,
    pub handler: CommandHandler,
}

impl fmt::Debug for CustomCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCommand")
            .field("action", &self.action)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl CustomCommand {
    pub fn new(action: &str, handler: impl Fn(Value) + Send + Sync + 'static) -> Self {
        CustomCommand {
            action: action.to_string(),
            description: None,
            schema: None,
            handler: Arc::new(handler),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Split a command into its transmittable descriptor and the handler kept
/// locally. With a schema the handler is wrapped so invalid payloads never
/// reach it.
pub fn compile(command: &CustomCommand) -> Result<(ActionDescriptor, CommandHandler), SyncError> {
    let descriptor = ActionDescriptor {
        action: command.action.clone(),
        description: command.description.clone(),
        schema: command.schema.clone(),
    };

    let Some(schema) = &command.schema else {
        return Ok((descriptor, Arc::clone(&command.handler)));
    };

    let validator =
        Arc::new(
            jsonschema::validator_for(schema).map_err(|e| SyncError::SchemaCompile {
                action: command.action.clone(),
                message: e.to_string(),
            })?,
        );

    let action = command.action.clone();
    let handler = Arc::clone(&command.handler);
    let validating: CommandHandler = Arc::new(move |payload: Value| {
        match validate_payload(&action, &validator, &payload) {
            Ok(()) => handler(payload),
            Err(e) => warn!(%payload, error = %e, "custom command payload rejected"),
        }
    });

    Ok((descriptor, validating))
}

pub fn validate_payload(action: &str, validator: &Validator, payload: &Value) -> Result<(), SyncError> {
    match validator.iter_errors(payload).next() {
        None => Ok(()),
        Some(violation) => Err(SyncError::InvalidPayload {
            action: action.to_string(),
            message: violation.to_string(),
        }),
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Element is not one of input, textarea, select or a
    #[error("unsupported element <{tag}>: expected input, textarea, select or a")]
    UnsupportedElement { tag: String },

    /// Custom command payload failed its schema
    #[error("payload for `{action}` rejected: {message}")]
    InvalidPayload { action: String, message: String },

    /// Custom command schema could not be compiled
    #[error("schema for `{action}` does not compile: {message}")]
    SchemaCompile { action: String, message: String },

    /// Inbound agent event did not match any known command shape
    #[error("malformed agent command: {0}")]
    MalformedCommand(#[from] serde_json::Error),

    /// Scenario or config file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Scenario or config file is not valid YAML for its model
    #[error("YAML parse error ({context}): {source}")]
    Yaml {
        context: String,
        source: serde_yaml::Error,
    },
}

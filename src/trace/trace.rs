use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::context::context_model::BidirectionalContext;

#[derive(Debug, Serialize)]
pub struct TraceEvent {
    pub timestamp_ms: u128,
    pub step: u64,

    /// `context_sent`, `context_send_failed` or `command_received`
    pub kind: String,

    pub uri: Option<String>,
    pub fingerprint: Option<String>,
    pub fields: Option<usize>,

    pub detail: Option<String>,
}

impl TraceEvent {
    pub fn now(step: u64, kind: &str) -> Self {
        Self {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            step,
            kind: kind.to_string(),
            uri: None,
            fingerprint: None,
            fields: None,
            detail: None,
        }
    }

    pub fn with_context(mut self, context: &BidirectionalContext) -> Self {
        self.uri = Some(context.uri.clone());
        self.fingerprint = Some(context.fingerprint());
        self.fields = Some(context.fields.len());
        self
    }

    pub fn with_detail(mut self, detail: impl ToString) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

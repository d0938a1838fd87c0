use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::prompt::builder::PromptMode;
use crate::round::error::AutofillError;
use crate::round::round_model::RoundState;

/// One line of the JSONL round trace.
#[derive(Debug, Serialize)]
pub struct TraceEvent {
    pub timestamp_ms: u128,
    pub mode: PromptMode,
    pub attempt: u32,

    pub state: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_signature: Option<String>,

    pub decision: Option<String>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
}

impl TraceEvent {
    pub fn now(mode: PromptMode, attempt: u32, state: &RoundState) -> Self {
        Self {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            mode,
            attempt,
            state: format!("{:?}", state),
            form_signature: None,
            decision: None,
            error_kind: None,
            error: None,
        }
    }

    pub fn with_signature(mut self, signature: Option<&str>) -> Self {
        self.form_signature = signature.map(str::to_string);
        self
    }

    pub fn with_decision(mut self, decision: impl ToString) -> Self {
        self.decision = Some(decision.to_string());
        self
    }

    pub fn with_error(mut self, error: &AutofillError) -> Self {
        self.error_kind = Some(error.kind().to_string());
        self.error = Some(error.to_string());
        self
    }
}

use std::time::Duration;

use thiserror::Error;

/// Every way a fill, learn or ingest round can fail.
///
/// Display strings are shown to the user as-is, so they are written in plain
/// language.
#[derive(Debug, Error)]
pub enum AutofillError {
    /// No API key has been stored.
    #[error("No API key is configured. Run `form-autofill key set <KEY>` first.")]
    MissingCredential,

    /// Network failure or unreadable HTTP response.
    #[error("Could not reach the model service: {0}")]
    TransportFailure(String),

    /// Non-2xx status from the model service.
    #[error("The model service rejected the request (HTTP {status}): {message}")]
    UpstreamError { status: u16, message: String },

    /// No JSON object could be read from the model's answer.
    #[error("The model's answer did not contain a readable JSON object: {0}")]
    MalformedJson(String),

    /// The JSON object is missing what this round needs.
    #[error("The model's answer had an unexpected shape: {0}")]
    ShapeInvalid(String),

    #[error("No fillable form fields were found on this page.")]
    NoFieldsFound,

    #[error("None of the form fields have a value to learn from.")]
    NoObservedValues,

    #[error("No text could be extracted from {0}.")]
    NoExtractableText(String),

    #[error("{operation} timed out after {}s.", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    #[error("The request was cancelled.")]
    Cancelled,

    /// A handle pointed outside the page's controls.
    #[error("Form control #{handle} does not exist (page has {count} controls).")]
    ControlNotFound { handle: usize, count: usize },

    #[error("Could not access the profile store: {0}")]
    Store(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The retry ceiling was reached; carries the last rejection.
    #[error("Gave up after {attempts} attempts. Last problem: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<AutofillError>,
    },
}

impl AutofillError {
    /// Whether re-asking the model with an amended prompt may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutofillError::MalformedJson(_) | AutofillError::ShapeInvalid(_)
        )
    }

    /// Short stable tag used in traces.
    pub fn kind(&self) -> &'static str {
        match self {
            AutofillError::MissingCredential => "missing_credential",
            AutofillError::TransportFailure(_) => "transport_failure",
            AutofillError::UpstreamError { .. } => "upstream_error",
            AutofillError::MalformedJson(_) => "malformed_json",
            AutofillError::ShapeInvalid(_) => "shape_invalid",
            AutofillError::NoFieldsFound => "no_fields_found",
            AutofillError::NoObservedValues => "no_observed_values",
            AutofillError::NoExtractableText(_) => "no_extractable_text",
            AutofillError::Timeout { .. } => "timeout",
            AutofillError::Cancelled => "cancelled",
            AutofillError::ControlNotFound { .. } => "control_not_found",
            AutofillError::Store(_) => "store",
            AutofillError::Io { .. } => "io",
            AutofillError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AutofillError::Io {
            context: context.into(),
            source,
        }
    }
}
